use std::collections::BTreeMap;

use crate::common::{Point, TaskId};

/// A directed survey segment. Reversing swaps the endpoints and flips the
/// parity flag; length and reward are orientation-independent.
#[derive(Clone, Copy, PartialEq)]
pub struct Task {
    id: TaskId,
    start: Point,
    end: Point,
    length: f64,
    reward: f64,
    reversed: bool,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "T{}[{:?}->{:?} r={}]",
            self.id, self.start, self.end, self.reward
        ))
    }
}

impl Task {
    pub fn new(id: TaskId, start: Point, end: Point, reward: f64, length: Option<f64>) -> Self {
        Task {
            id,
            start,
            end,
            length: length.unwrap_or_else(|| start.dist(end)),
            reward,
            reversed: false,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn start(&self) -> Point {
        self.start
    }

    pub fn end(&self) -> Point {
        self.end
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn reward(&self) -> f64 {
        self.reward
    }

    #[allow(dead_code)]
    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    pub fn reverse(&mut self) {
        std::mem::swap(&mut self.start, &mut self.end);
        self.reversed = !self.reversed;
    }

    /// Endpoints for a speculative trial, without touching the task itself.
    pub fn trial_endpoints(&self, reversed: bool) -> (Point, Point) {
        if reversed {
            (self.end, self.start)
        } else {
            (self.start, self.end)
        }
    }
}

/// The immutable task set, keyed by id. Each robot works on its own clone
/// so that committing a reversal never races with another robot's scoring.
#[derive(Clone, Debug, Default)]
pub struct TaskCatalog {
    tasks: BTreeMap<TaskId, Task>,
}

impl TaskCatalog {
    pub fn new(tasks: impl IntoIterator<Item = Task>) -> Self {
        TaskCatalog {
            tasks: tasks.into_iter().map(|t| (t.id(), t)).collect(),
        }
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Commit-time reversal of a definitively selected task.
    pub fn reverse(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.reverse();
        }
    }

    /// Task ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.keys().copied()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
