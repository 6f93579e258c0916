use std::fs;
use std::path::Path;

use rand::Rng;
use serde::Deserialize;
use thiserror::Error;

use crate::common::Point;
use crate::task::{Task, TaskCatalog};

#[derive(Debug, Error)]
pub enum ProblemError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid problem document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("problem has an empty outer polygon")]
    EmptyPolygon,
    #[error("problem has no survey lines")]
    NoTasks,
}

fn default_reward() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct LineEntry {
    start: Point,
    end: Point,
    #[serde(default = "default_reward")]
    reward: f64,
    #[serde(default)]
    length: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProblemFile {
    polygon: Vec<Point>,
    #[serde(default)]
    holes: Vec<Vec<Point>>,
    lines: Vec<LineEntry>,
}

/// A coverage instance: the work area, its obstacles, the survey tasks and
/// the number of robots that will bid on them. Ingested once up front.
#[derive(Debug)]
pub struct CoverageProblem {
    pub search_area: Vec<Point>,
    pub restricted_areas: Vec<Vec<Point>>,
    pub tasks: Vec<Task>,
    pub num_robots: usize,
}

impl CoverageProblem {
    /// Parses the dataset JSON shape `{"polygon", "holes", "lines"}`.
    ///
    /// Each line's direction is flipped with probability 1/2 so the greedy
    /// direction optimisation starts from an unbiased orientation.
    pub fn from_json<R: Rng>(
        data: &str,
        num_robots: usize,
        rng: &mut R,
    ) -> Result<Self, ProblemError> {
        let raw: ProblemFile = serde_json::from_str(data)?;
        if raw.polygon.is_empty() {
            return Err(ProblemError::EmptyPolygon);
        }
        if raw.lines.is_empty() {
            return Err(ProblemError::NoTasks);
        }

        let tasks = raw
            .lines
            .into_iter()
            .enumerate()
            .map(|(id, line)| {
                let (start, end) = if rng.random_bool(0.5) {
                    (line.end, line.start)
                } else {
                    (line.start, line.end)
                };
                Task::new(id, start, end, line.reward, line.length)
            })
            .collect();

        Ok(CoverageProblem {
            search_area: raw.polygon,
            restricted_areas: raw.holes,
            tasks,
            num_robots,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P, num_robots: usize) -> Result<Self, ProblemError> {
        let data = fs::read_to_string(&path).map_err(|source| ProblemError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::from_json(&data, num_robots, &mut rand::rng())
    }

    pub fn catalog(&self) -> TaskCatalog {
        TaskCatalog::new(self.tasks.iter().copied())
    }

    /// Start positions: outer-polygon vertices, evenly spaced around the
    /// ring so the fleet does not pile up at one corner.
    pub fn robot_positions(&self) -> Vec<Point> {
        let ring = &self.search_area;
        (0..self.num_robots)
            .map(|i| ring[(i * ring.len()) / self.num_robots.max(1) % ring.len()])
            .collect()
    }
}
