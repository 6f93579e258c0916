use itertools::Itertools;

use crate::common::{BidInformation, Point, TaskId};
use crate::dbg_println;
use crate::oracle::PathOracle;
use crate::robot::Robot;

/// The winning speculative trial of one `best_insertion` sweep.
#[derive(Clone, Copy, Debug)]
struct Insertion {
    task: TaskId,
    index: usize,
    gain: f64,
    reversed: bool,
}

impl Robot {
    /// Greedily claims tasks until no admissible insertion remains.
    ///
    /// Every committed claim appends to the bundle, splices into the path
    /// at its best index, applies a winning reversal to this robot's
    /// catalog view and emits one outgoing bid stamped `now`.
    pub fn build_bundle<O: PathOracle>(&mut self, oracle: &O, now: f64) -> Vec<BidInformation> {
        let mut bids = Vec::new();
        while let Some(Insertion {
            task,
            index,
            gain,
            reversed,
        }) = self.best_insertion(oracle)
        {
            if reversed {
                self.tasks.reverse(task);
            }
            self.view.bundle.push(task);
            self.view.path.insert(index, task);
            self.view.set_bid(task, gain, Some(self.id), now);
            bids.push(BidInformation {
                y: gain,
                z: Some(self.id),
                t: now,
                j: task,
                k: self.id,
            });
            dbg_println!("robot {} claims task {} (gain {})", self.id, task, gain);
        }
        bids
    }

    /// Scores every candidate task at every insertion index, in both
    /// orientations unless single-point estimation is on.
    ///
    /// A trial is admissible when its marginal gain is positive, outbids
    /// the currently known winner, every leg is reachable and the
    /// post-insertion travel budget still holds. Strict comparisons keep
    /// ties on the lowest task id, then the lowest index, then the forward
    /// orientation.
    fn best_insertion<O: PathOracle>(&self, oracle: &O) -> Option<Insertion> {
        let base = self.path_reward(oracle, &self.view.path, None)?;
        let orientations: &[bool] = if self.params.single_point_estimation {
            &[false]
        } else {
            &[false, true]
        };

        let mut best: Option<Insertion> = None;
        let mut trial = Vec::with_capacity(self.view.path.len() + 1);
        for task in self.tasks.ids() {
            if self.view.bundle.contains(&task)
                || self.view.removal_count(task) > self.params.removal_threshold
            {
                continue;
            }
            for index in 0..=self.view.path.len() {
                trial.clear();
                trial.extend_from_slice(&self.view.path[..index]);
                trial.push(task);
                trial.extend_from_slice(&self.view.path[index..]);

                for &reversed in orientations {
                    let Some(score) = self.path_reward(oracle, &trial, Some((task, reversed)))
                    else {
                        continue;
                    };
                    let gain = score - base;
                    if gain <= 0.0 || gain <= self.view.winning_bid(task) {
                        continue;
                    }
                    if let Some(b) = &best {
                        if gain <= b.gain {
                            continue;
                        }
                    }
                    let Some(cost) = self.path_travel_cost(oracle, &trial, Some((task, reversed)))
                    else {
                        continue;
                    };
                    if cost > self.params.capacity {
                        continue;
                    }
                    best = Some(Insertion {
                        task,
                        index,
                        gain,
                        reversed,
                    });
                }
            }
        }
        best
    }

    /// Time-discounted reward of an ordered task sequence starting from the
    /// robot's position. Each task's reward is discounted by the cumulative
    /// travel time to its start point.
    fn path_reward<O: PathOracle>(
        &self,
        oracle: &O,
        path: &[TaskId],
        trial: Option<(TaskId, bool)>,
    ) -> Option<f64> {
        let Some(&first) = path.first() else {
            return Some(0.0);
        };
        let (first_start, _, first_reward) = self.leg_points(first, trial)?;
        let mut elapsed = self
            .cost
            .travel_time(oracle.path_cost(self.state, first_start)?);
        let mut total = self.cost.discounted(elapsed, first_reward);

        for (&prev, &next) in path.iter().tuple_windows() {
            let (_, prev_end, _) = self.leg_points(prev, trial)?;
            let (next_start, _, next_reward) = self.leg_points(next, trial)?;
            elapsed += self.cost.travel_time(oracle.path_cost(prev_end, next_start)?);
            total += self.cost.discounted(elapsed, next_reward);
        }
        Some(total)
    }

    /// Total travel-time budget consumed by an ordered task sequence:
    /// approach, inter-task transfers, on-task traversal and the return to
    /// base.
    pub(crate) fn path_travel_cost<O: PathOracle>(
        &self,
        oracle: &O,
        path: &[TaskId],
        trial: Option<(TaskId, bool)>,
    ) -> Option<f64> {
        let Some((&first, &last)) = path.first().zip(path.last()) else {
            return Some(0.0);
        };
        let (first_start, _, _) = self.leg_points(first, trial)?;
        let (_, last_end, _) = self.leg_points(last, trial)?;

        let mut total = self
            .cost
            .travel_time(oracle.path_cost(self.state, first_start)?);
        for (&prev, &next) in path.iter().tuple_windows() {
            let (_, prev_end, _) = self.leg_points(prev, trial)?;
            let (next_start, _, _) = self.leg_points(next, trial)?;
            total += self.cost.travel_time(oracle.path_cost(prev_end, next_start)?);
        }
        for &id in path {
            total += self.cost.travel_time(self.tasks.get(id)?.length());
        }
        total += self.cost.travel_time(oracle.path_cost(self.state, last_end)?);
        Some(total)
    }

    pub fn bundle_travel_cost<O: PathOracle>(&self, oracle: &O) -> Option<f64> {
        self.path_travel_cost(oracle, &self.view.path, None)
    }

    pub fn current_path_reward<O: PathOracle>(&self, oracle: &O) -> f64 {
        self.path_reward(oracle, &self.view.path, None).unwrap_or(0.0)
    }

    /// Straight-line evaluation of the committed path: total distance
    /// travelled (approach, transfers, on-task, return) and the on-task
    /// share. Reporting only; bids never see these numbers.
    pub fn evaluate_path_length(&self) -> (f64, f64) {
        let tasks: Vec<_> = self
            .view
            .path
            .iter()
            .filter_map(|&id| self.tasks.get(id))
            .collect();
        let (Some(first), Some(last)) = (tasks.first(), tasks.last()) else {
            return (0.0, 0.0);
        };

        let mut total = self.state.dist(first.start());
        for (prev, next) in tasks.iter().tuple_windows() {
            total += prev.end().dist(next.start());
        }
        let on_task: f64 = tasks.iter().map(|t| t.length()).sum();
        total += self.state.dist(last.end());
        total += on_task;
        (total, on_task)
    }

    /// Endpoints and reward for one leg, honouring the speculative
    /// orientation of the task under trial without touching the catalog.
    fn leg_points(&self, id: TaskId, trial: Option<(TaskId, bool)>) -> Option<(Point, Point, f64)> {
        let task = self.tasks.get(id)?;
        let reversed = matches!(trial, Some((tid, true)) if tid == id);
        let (start, end) = task.trial_endpoints(reversed);
        Some((start, end, task.reward()))
    }
}
