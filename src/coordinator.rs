use std::collections::HashSet;

use serde::Serialize;

use crate::common::{AgentId, BidInformation, TaskId};
use crate::dbg_println;
use crate::oracle::PathOracle;
use crate::robot::{InvariantError, Robot};

/// Undirected communication topology over the fleet.
#[derive(Clone, Debug)]
pub struct CommGraph {
    adj: Vec<Vec<bool>>,
}

impl CommGraph {
    pub fn fully_connected(n: usize) -> Self {
        let adj = (0..n)
            .map(|i| (0..n).map(|j| i != j).collect())
            .collect();
        CommGraph { adj }
    }

    #[allow(dead_code)]
    pub fn from_edges(n: usize, edges: &[(AgentId, AgentId)]) -> Self {
        let mut adj = vec![vec![false; n]; n];
        for &(a, b) in edges {
            if a != b {
                adj[a][b] = true;
                adj[b][a] = true;
            }
        }
        CommGraph { adj }
    }

    pub fn len(&self) -> usize {
        self.adj.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.adj.is_empty()
    }

    #[allow(dead_code)]
    pub fn connected(&self, a: AgentId, b: AgentId) -> bool {
        self.adj[a][b]
    }

    pub fn neighbors(&self, of: AgentId) -> impl Iterator<Item = AgentId> + '_ {
        self.adj[of]
            .iter()
            .enumerate()
            .filter_map(|(j, &linked)| linked.then_some(j))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AuctionParams {
    /// Timestamp tolerance for the rule table.
    pub eps: f64,
    /// Hard stop on the number of bid/consensus rounds.
    pub max_rounds: usize,
}

impl Default for AuctionParams {
    fn default() -> Self {
        AuctionParams {
            eps: 1e-3,
            max_rounds: 100,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RobotReport {
    pub id: AgentId,
    pub bundle: Vec<TaskId>,
    pub path: Vec<TaskId>,
    pub travel_cost: f64,
    pub path_reward: f64,
    pub total_distance: f64,
    pub on_task_distance: f64,
}

/// The outcome of an auction run. `converged: false` means the round cap
/// fired first; the assignment is still the fleet's current best view.
#[derive(Clone, Debug, Serialize)]
pub struct Allocation {
    pub converged: bool,
    pub rounds: usize,
    pub robots: Vec<RobotReport>,
    pub unassigned: Vec<TaskId>,
    pub dropped_messages: u64,
}

/// Drives the fleet through synchronous bid/consensus rounds until no
/// robot's view moves, routing every message over the communication graph.
pub struct Coordinator<O> {
    robots: Vec<Robot>,
    graph: CommGraph,
    params: AuctionParams,
    oracle: O,
}

impl<O: PathOracle> Coordinator<O> {
    pub fn new(robots: Vec<Robot>, graph: CommGraph, params: AuctionParams, oracle: O) -> Self {
        assert_eq!(robots.len(), graph.len());
        debug_assert!(robots.iter().enumerate().all(|(i, r)| r.id() == i));
        Coordinator {
            robots,
            graph,
            params,
            oracle,
        }
    }

    pub fn robots(&self) -> &[Robot] {
        &self.robots
    }

    /// One full auction: rounds of build, deliver, reduce.
    ///
    /// A round is convergent when no robot mutated its view and nothing is
    /// left in flight. Rounds also stamp the logical clock every view
    /// writes against.
    pub fn run(&mut self) -> Result<Allocation, InvariantError> {
        let n = self.robots.len();
        let mut queued: Vec<Vec<BidInformation>> = vec![Vec::new(); n];
        let mut converged = false;
        let mut rounds = 0;

        for round in 0..self.params.max_rounds {
            let now = round as f64;
            rounds = round + 1;

            // every robot extends its bundle and bids
            let mut outbound = Vec::with_capacity(n);
            for robot in &mut self.robots {
                outbound.push(robot.build_bundle(&self.oracle, now));
            }

            // neighbours get last round's rebroadcasts, then the fresh bids
            let mut inbox: Vec<Vec<BidInformation>> = vec![Vec::new(); n];
            for (sender, (held, fresh)) in queued.iter().zip(&outbound).enumerate() {
                for receiver in self.graph.neighbors(sender) {
                    inbox[receiver].extend_from_slice(held);
                    inbox[receiver].extend_from_slice(fresh);
                }
            }

            // reduce, re-enforce the travel budget, verify the view
            for (i, robot) in self.robots.iter_mut().enumerate() {
                queued[i] = robot.receive_bids(&inbox[i], self.params.eps, now);
                robot.enforce_capacity(&self.oracle, now);
                robot.check_invariants(&self.oracle)?;
            }

            let mutated: Vec<bool> = self.robots.iter_mut().map(Robot::take_dirty).collect();
            let in_flight = queued.iter().any(|q| !q.is_empty());
            dbg_println!(
                "round {round}: mutated={:?}, in_flight={in_flight}",
                mutated
            );
            if !mutated.iter().any(|&m| m) && !in_flight {
                converged = true;
                break;
            }
        }

        Ok(self.snapshot(converged, rounds))
    }

    fn snapshot(&self, converged: bool, rounds: usize) -> Allocation {
        let robots: Vec<RobotReport> = self
            .robots
            .iter()
            .map(|r| {
                let (total_distance, on_task_distance) = r.evaluate_path_length();
                RobotReport {
                    id: r.id(),
                    bundle: r.bundle().to_vec(),
                    path: r.path().to_vec(),
                    travel_cost: r.bundle_travel_cost(&self.oracle).unwrap_or_default(),
                    path_reward: r.current_path_reward(&self.oracle),
                    total_distance,
                    on_task_distance,
                }
            })
            .collect();

        let assigned: HashSet<TaskId> = robots
            .iter()
            .flat_map(|r| r.bundle.iter().copied())
            .collect();
        let unassigned = self
            .robots
            .first()
            .map(|r| {
                r.tasks()
                    .ids()
                    .filter(|id| !assigned.contains(id))
                    .collect()
            })
            .unwrap_or_default();

        Allocation {
            converged,
            rounds,
            robots,
            unassigned,
            dropped_messages: self.robots.iter().map(|r| r.view().dropped_messages()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Point;
    use crate::oracle::{Euclidean, Memo};
    use crate::robot::RobotParams;
    use crate::task::{Task, TaskCatalog};

    fn two_task_catalog() -> TaskCatalog {
        TaskCatalog::new([
            Task::new(0, Point::new(1.0, 0.0), Point::new(2.0, 0.0), 10.0, None),
            Task::new(1, Point::new(8.0, 0.0), Point::new(9.0, 0.0), 10.0, None),
        ])
    }

    fn fleet(positions: &[Point], catalog: &TaskCatalog) -> Vec<Robot> {
        positions
            .iter()
            .enumerate()
            .map(|(id, &p)| Robot::new(id, p, RobotParams::default(), catalog.clone()))
            .collect()
    }

    fn run_auction(robots: Vec<Robot>, graph: CommGraph) -> (Allocation, Vec<Robot>) {
        let mut coordinator =
            Coordinator::new(robots, graph, AuctionParams::default(), Memo::new(Euclidean));
        let allocation = coordinator.run().unwrap();
        (allocation, coordinator.robots.clone())
    }

    #[test]
    fn separated_robots_split_the_tasks() {
        let catalog = two_task_catalog();
        let robots = fleet(
            &[Point::new(0.0, 0.0), Point::new(10.0, 0.0)],
            &catalog,
        );
        let (allocation, robots) = run_auction(robots, CommGraph::fully_connected(2));

        assert!(allocation.converged);
        assert_eq!(robots[0].bundle(), &[0]);
        assert_eq!(robots[1].bundle(), &[1]);
        assert!(allocation.unassigned.is_empty());
        // both views agree on both winners
        for robot in &robots {
            assert_eq!(robot.view().winner(0), Some(0));
            assert_eq!(robot.view().winner(1), Some(1));
        }
    }

    #[test]
    fn colocated_robots_tie_break_to_the_lower_id() {
        let catalog = two_task_catalog();
        let robots = fleet(&[Point::new(0.0, 0.0), Point::new(0.0, 0.0)], &catalog);
        let (allocation, robots) = run_auction(robots, CommGraph::fully_connected(2));

        assert!(allocation.converged);
        // both robots opened with identical bids on task 0; the tie goes to
        // the lower id
        assert_eq!(robots[0].bundle(), &[0]);
        assert_eq!(robots[0].view().winner(0), Some(0));
        assert_eq!(robots[1].view().winner(0), Some(0));
        // the tail task's decayed marginal is beatable by a fresh bid, so
        // the loser picks it up and the fleet still covers everything
        assert_eq!(robots[1].bundle(), &[1]);
        assert!(allocation.unassigned.is_empty());
    }

    #[test]
    fn no_task_is_assigned_twice_after_convergence() {
        let catalog = TaskCatalog::new((0..5).map(|i| {
            let x = i as f64 * 2.0;
            Task::new(i, Point::new(x, 1.0), Point::new(x + 1.0, 1.0), 5.0, None)
        }));
        let robots = fleet(
            &[
                Point::new(0.0, 0.0),
                Point::new(5.0, 0.0),
                Point::new(9.0, 0.0),
            ],
            &catalog,
        );
        let (allocation, robots) = run_auction(robots, CommGraph::fully_connected(3));

        assert!(allocation.converged);
        let mut seen = HashSet::new();
        for robot in &robots {
            for &task in robot.bundle() {
                assert!(seen.insert(task), "task {task} assigned twice");
            }
            robot.check_invariants(&Euclidean).unwrap();
        }
        let claimed: usize = robots.iter().map(|r| r.bundle().len()).sum();
        assert_eq!(claimed + allocation.unassigned.len(), 5);
    }

    #[test]
    fn round_cap_reports_non_convergence() {
        let catalog = two_task_catalog();
        let robots = fleet(&[Point::new(0.0, 0.0), Point::new(0.0, 0.0)], &catalog);
        let mut coordinator = Coordinator::new(
            robots,
            CommGraph::fully_connected(2),
            AuctionParams {
                max_rounds: 1,
                ..AuctionParams::default()
            },
            Memo::new(Euclidean),
        );
        let allocation = coordinator.run().unwrap();
        assert!(!allocation.converged);
        assert_eq!(allocation.rounds, 1);
    }

    #[test]
    fn disconnected_robots_never_hear_each_other() {
        let catalog = two_task_catalog();
        let robots = fleet(&[Point::new(0.0, 0.0), Point::new(10.0, 0.0)], &catalog);
        let graph = CommGraph::from_edges(2, &[]);
        let (allocation, robots) = run_auction(robots, graph);

        assert!(allocation.converged);
        // with no channel there is no consensus: both keep both tasks
        assert_eq!(robots[0].bundle().len(), 2);
        assert_eq!(robots[1].bundle().len(), 2);
    }

    #[test]
    fn graph_edges_are_undirected() {
        let graph = CommGraph::from_edges(3, &[(0, 2)]);
        assert!(graph.connected(0, 2));
        assert!(graph.connected(2, 0));
        assert!(!graph.connected(0, 1));
        assert_eq!(graph.neighbors(2).collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn capacity_zero_fleet_assigns_nothing() {
        let catalog = two_task_catalog();
        let params = RobotParams {
            capacity: 0.0,
            ..RobotParams::default()
        };
        let robots: Vec<Robot> = [Point::new(0.0, 0.0), Point::new(10.0, 0.0)]
            .iter()
            .enumerate()
            .map(|(id, &p)| Robot::new(id, p, params, catalog.clone()))
            .collect();
        let (allocation, robots) = run_auction(robots, CommGraph::fully_connected(2));

        assert!(allocation.converged);
        for robot in &robots {
            assert!(robot.bundle().is_empty());
        }
        assert_eq!(allocation.unassigned, vec![0, 1]);
    }
}
