use serde::{Deserialize, Serialize};

#[macro_export]
macro_rules! dbg_println {
    ($($arg:tt)*) => (if false { println!($($arg)*); });
}

pub type TaskId = usize;
pub type AgentId = usize;

/// A 2D position, serialized as a `[x, y]` pair to match the dataset format.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[allow(dead_code)]
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn dist(&self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<[f64; 2]> for Point {
    fn from(p: [f64; 2]) -> Self {
        Point { x: p[0], y: p[1] }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

impl std::fmt::Debug for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("({}, {})", self.x, self.y))
    }
}

/// One bid record as exchanged between robots.
///
/// `y` is the winning bid, `z` the claimed winning agent (`None` = no
/// winner, `-1` on the wire), `t` the sender's timestamp for the claim,
/// `j` the task being bid on and `k` the sending agent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BidInformation {
    pub y: f64,
    #[serde(with = "winner_sentinel")]
    pub z: Option<AgentId>,
    pub t: f64,
    pub j: TaskId,
    pub k: AgentId,
}

/// Maps the in-memory `Option<AgentId>` winner onto the wire's signed
/// integer, where `-1` means "no winner". Anything below `-1` is malformed.
mod winner_sentinel {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::AgentId;

    pub fn serialize<S: Serializer>(z: &Option<AgentId>, ser: S) -> Result<S::Ok, S::Error> {
        match z {
            Some(id) => ser.serialize_i64(i64::try_from(*id).map_err(serde::ser::Error::custom)?),
            None => ser.serialize_i64(-1),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<AgentId>, D::Error> {
        let raw = i64::deserialize(de)?;
        match raw {
            -1 => Ok(None),
            id if id >= 0 => Ok(Some(usize::try_from(id).map_err(D::Error::custom)?)),
            _ => Err(D::Error::custom(format!("malformed winner sentinel {raw}"))),
        }
    }
}
