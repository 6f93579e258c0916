use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::common::{AgentId, Point, TaskId};
use crate::cost::CostModel;
use crate::oracle::PathOracle;
use crate::task::TaskCatalog;

/// Per-robot tuning knobs. Defaults match the reference platform: a 3 m/s,
/// 1 m/s^2 robot with an effectively unlimited travel budget.
#[derive(Clone, Copy, Debug)]
pub struct RobotParams {
    pub v_max: f64,
    pub a_max: f64,
    /// Travel-time budget in seconds, return-to-base included.
    pub capacity: f64,
    pub lambda: f64,
    /// How often a task may be truncated out of the bundle before this
    /// robot stops bidding on it.
    pub removal_threshold: u32,
    /// Skip the reversed-orientation trial when scoring insertions.
    pub single_point_estimation: bool,
}

impl Default for RobotParams {
    fn default() -> Self {
        RobotParams {
            v_max: 3.0,
            a_max: 1.0,
            capacity: f64::INFINITY,
            lambda: 0.95,
            removal_threshold: 15,
            single_point_estimation: false,
        }
    }
}

/// The only mutable state a robot carries between rounds: its beliefs about
/// every task's winning bid/agent/timestamp, its own claims (`bundle` in
/// claim order, `path` in execution order) and the per-task demotion
/// counters.
#[derive(Clone, Debug, Default)]
pub struct LocalView {
    y: HashMap<TaskId, f64>,
    z: HashMap<TaskId, Option<AgentId>>,
    t: HashMap<TaskId, f64>,
    pub(crate) bundle: Vec<TaskId>,
    pub(crate) path: Vec<TaskId>,
    removal: HashMap<TaskId, u32>,
    dirty: bool,
    dropped_messages: u64,
}

impl LocalView {
    pub fn winning_bid(&self, task: TaskId) -> f64 {
        self.y.get(&task).copied().unwrap_or(0.0)
    }

    pub fn winner(&self, task: TaskId) -> Option<AgentId> {
        self.z.get(&task).copied().flatten()
    }

    pub fn stamp(&self, task: TaskId) -> f64 {
        self.t.get(&task).copied().unwrap_or(0.0)
    }

    pub fn removal_count(&self, task: TaskId) -> u32 {
        self.removal.get(&task).copied().unwrap_or(0)
    }

    pub fn dropped_messages(&self) -> u64 {
        self.dropped_messages
    }

    pub(crate) fn set_bid(&mut self, task: TaskId, y: f64, z: Option<AgentId>, t: f64) {
        self.y.insert(task, y);
        self.z.insert(task, z);
        self.t.insert(task, t);
        self.dirty = true;
    }

    pub(crate) fn set_stamp(&mut self, task: TaskId, t: f64) {
        self.t.insert(task, t);
        self.dirty = true;
    }

    pub(crate) fn count_dropped_message(&mut self) {
        self.dropped_messages += 1;
    }

    /// Clears and returns the mutation flag; the coordinator polls this
    /// once per round to detect convergence.
    pub(crate) fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvariantError {
    #[error("robot {robot}: task {task} appears twice in the bundle")]
    DuplicateBundleEntry { robot: AgentId, task: TaskId },
    #[error("robot {robot}: bundle and path disagree on task {task}")]
    BundlePathMismatch { robot: AgentId, task: TaskId },
    #[error("robot {robot}: task {task} is marked won locally but is not bundled")]
    WonTaskNotBundled { robot: AgentId, task: TaskId },
    #[error("robot {robot}: negative winning bid {bid} for task {task}")]
    NegativeBid {
        robot: AgentId,
        task: TaskId,
        bid: f64,
    },
    #[error("robot {robot}: task {task} has no winner but a bid of {bid}")]
    FreeWinnerWithBid {
        robot: AgentId,
        task: TaskId,
        bid: f64,
    },
    #[error("robot {robot}: bundled task {task} is past its removal threshold")]
    RemovalThresholdBreached { robot: AgentId, task: TaskId },
    #[error("robot {robot}: bundle costs {cost} against a capacity of {capacity}")]
    OverCapacity {
        robot: AgentId,
        cost: f64,
        capacity: f64,
    },
    #[error("robot {robot}: bundled path has an unreachable leg")]
    UnreachablePath { robot: AgentId },
}

/// One bidding robot: identity, pose, kinematics, its private view of the
/// task set and its local auction state.
#[derive(Clone, Debug)]
pub struct Robot {
    pub(crate) id: AgentId,
    pub(crate) state: Point,
    pub(crate) params: RobotParams,
    pub(crate) cost: CostModel,
    pub(crate) tasks: TaskCatalog,
    pub(crate) view: LocalView,
}

impl Robot {
    pub fn new(id: AgentId, state: Point, params: RobotParams, tasks: TaskCatalog) -> Self {
        Robot {
            id,
            state,
            cost: CostModel::new(params.v_max, params.a_max, params.lambda),
            params,
            tasks,
            view: LocalView::default(),
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    #[allow(dead_code)]
    pub fn state(&self) -> Point {
        self.state
    }

    pub fn bundle(&self) -> &[TaskId] {
        &self.view.bundle
    }

    pub fn path(&self) -> &[TaskId] {
        &self.view.path
    }

    pub fn view(&self) -> &LocalView {
        &self.view
    }

    pub fn tasks(&self) -> &TaskCatalog {
        &self.tasks
    }

    /// Clears and returns this round's mutation flag.
    pub(crate) fn take_dirty(&mut self) -> bool {
        self.view.take_dirty()
    }

    /// Drops `task` and every task claimed after it.
    ///
    /// Later bundle entries were scored against a prefix that no longer
    /// exists, so their claims are cleared outright; the truncation point
    /// itself keeps whatever the caller just wrote for it and gets its
    /// demotion counter bumped.
    pub(crate) fn repair_from(&mut self, task: TaskId, now: f64) {
        let Some(index) = self.view.bundle.iter().position(|&b| b == task) else {
            return;
        };

        let LocalView {
            y,
            z,
            t,
            bundle,
            path,
            removal,
            dirty,
            ..
        } = &mut self.view;

        for &later in &bundle[index + 1..] {
            y.insert(later, 0.0);
            z.insert(later, None);
            t.insert(later, now);
        }
        *removal.entry(task).or_insert(0) += 1;

        let dropped: HashSet<TaskId> = bundle[index..].iter().copied().collect();
        path.retain(|id| !dropped.contains(id));
        bundle.truncate(index);
        *dirty = true;
    }

    /// Clears the claim on `task` entirely, then repairs the bundle.
    pub(crate) fn reset_task(&mut self, task: TaskId, now: f64) {
        self.view.set_bid(task, 0.0, None, now);
        self.repair_from(task, now);
    }

    /// Externally ordered cancellation: walk away from every claim, as if
    /// a reset had been injected for each task this robot holds.
    #[allow(dead_code)]
    pub fn abandon_claims(&mut self, now: f64) {
        while let Some(&first) = self.view.bundle.first() {
            self.reset_task(first, now);
        }
    }

    /// After a repair the surviving path can still be over budget (oracle
    /// costs need not obey the triangle inequality). Shed claims from the
    /// tail until the budget holds again.
    pub(crate) fn enforce_capacity<O: PathOracle>(&mut self, oracle: &O, now: f64) {
        loop {
            if self.view.bundle.is_empty() {
                return;
            }
            match self.bundle_travel_cost(oracle) {
                Some(cost) if cost <= self.params.capacity => return,
                _ => {}
            }
            if let Some(last) = self.view.bundle.pop() {
                self.view.path.retain(|&id| id != last);
                self.view.set_bid(last, 0.0, None, now);
            }
        }
    }

    /// Verifies the view's structural guarantees: bundle and path hold the
    /// same duplicate-free task set, every locally-won task is bundled, bids
    /// are consistent, demotion counters are honoured and the travel budget
    /// holds. Any failure is a rule-table bug and aborts the round.
    pub fn check_invariants<O: PathOracle>(&self, oracle: &O) -> Result<(), InvariantError> {
        let robot = self.id;

        let mut bundled = HashSet::new();
        for &task in &self.view.bundle {
            if !bundled.insert(task) {
                return Err(InvariantError::DuplicateBundleEntry { robot, task });
            }
        }
        let pathed: HashSet<TaskId> = self.view.path.iter().copied().collect();
        if pathed.len() != self.view.path.len() || pathed != bundled {
            let task = pathed
                .symmetric_difference(&bundled)
                .next()
                .copied()
                .unwrap_or_default();
            return Err(InvariantError::BundlePathMismatch { robot, task });
        }

        for (&task, &winner) in &self.view.z {
            if winner == Some(self.id) && !bundled.contains(&task) {
                return Err(InvariantError::WonTaskNotBundled { robot, task });
            }
            if winner.is_none() {
                let bid = self.view.winning_bid(task);
                if bid != 0.0 {
                    return Err(InvariantError::FreeWinnerWithBid { robot, task, bid });
                }
            }
        }

        for (&task, &bid) in &self.view.y {
            if bid < 0.0 {
                return Err(InvariantError::NegativeBid { robot, task, bid });
            }
        }

        for &task in &self.view.bundle {
            if self.view.removal_count(task) > self.params.removal_threshold {
                return Err(InvariantError::RemovalThresholdBreached { robot, task });
            }
        }

        if !self.view.bundle.is_empty() {
            let cost = self
                .bundle_travel_cost(oracle)
                .ok_or(InvariantError::UnreachablePath { robot })?;
            if cost > self.params.capacity + 1e-9 {
                return Err(InvariantError::OverCapacity {
                    robot,
                    cost,
                    capacity: self.params.capacity,
                });
            }
        }

        Ok(())
    }
}
