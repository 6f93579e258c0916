mod builder;
mod common;
mod consensus;
mod coordinator;
mod cost;
mod oracle;
mod problem;
mod robot;
mod task;

use std::path::Path;
use std::time::Instant;
use std::{env, process};

use serde_json::json;

use coordinator::{AuctionParams, CommGraph, Coordinator};
use oracle::{Euclidean, Memo};
use problem::CoverageProblem;
use robot::{Robot, RobotParams};

fn get_filename_from_path(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|filename| filename.to_str())
        .unwrap_or("")
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("usage: task_allocation <problem.json> [num_robots]");
        return;
    }

    let file_path = &args[1];
    let num_robots: usize = args
        .get(2)
        .map(|raw| {
            raw.parse().unwrap_or_else(|e| {
                eprintln!("Error parsing robot count: {e}");
                process::exit(1);
            })
        })
        .unwrap_or(2);

    let start = Instant::now();
    let problem = match CoverageProblem::from_file(file_path, num_robots) {
        Ok(problem) => problem,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let catalog = problem.catalog();
    let robots: Vec<Robot> = problem
        .robot_positions()
        .into_iter()
        .enumerate()
        .map(|(id, state)| Robot::new(id, state, RobotParams::default(), catalog.clone()))
        .collect();

    let mut coordinator = Coordinator::new(
        robots,
        CommGraph::fully_connected(num_robots),
        AuctionParams::default(),
        Memo::new(Euclidean),
    );

    let allocation = match coordinator.run() {
        Ok(allocation) => allocation,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let duration = start.elapsed();
    let output = json!({
        "Instance": get_filename_from_path(file_path),
        "Time": (duration.as_secs_f64() * 100.0).round() / 100.0,
        "Converged": allocation.converged,
        "Rounds": allocation.rounds,
        "Allocation": allocation,
    });
    println!("{}", serde_json::to_string(&output).unwrap());
}
