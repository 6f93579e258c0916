use std::cell::RefCell;
use std::collections::HashMap;

use ordered_float::OrderedFloat;

use crate::common::Point;

/// Shortest-path oracle over the free space.
///
/// `path_cost` returns the travel distance between two points, or `None`
/// when no path exists. Implementations must be symmetric and non-negative
/// for the auction's bounds to hold.
pub trait PathOracle {
    fn path_cost(&self, a: Point, b: Point) -> Option<f64>;
}

impl<O: PathOracle + ?Sized> PathOracle for &O {
    fn path_cost(&self, a: Point, b: Point) -> Option<f64> {
        (**self).path_cost(a, b)
    }
}

/// Straight-line distances, used when no environment is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct Euclidean;

impl PathOracle for Euclidean {
    fn path_cost(&self, a: Point, b: Point) -> Option<f64> {
        Some(a.dist(b))
    }
}

type PairKey = [OrderedFloat<f64>; 4];

/// Memoises an underlying oracle.
///
/// Bundle scoring asks for the same point pairs over and over; a
/// visibility-graph query is far too expensive to repeat. Keys are the
/// unordered endpoint pair, so the cache also enforces the symmetry the
/// trait requires.
#[derive(Debug, Default)]
pub struct Memo<O> {
    inner: O,
    cache: RefCell<HashMap<PairKey, Option<f64>>>,
}

impl<O: PathOracle> Memo<O> {
    pub fn new(inner: O) -> Self {
        Memo {
            inner,
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn key(a: Point, b: Point) -> PairKey {
        let p = [OrderedFloat(a.x), OrderedFloat(a.y)];
        let q = [OrderedFloat(b.x), OrderedFloat(b.y)];
        let (lo, hi) = if p <= q { (p, q) } else { (q, p) };
        [lo[0], lo[1], hi[0], hi[1]]
    }
}

impl<O: PathOracle> PathOracle for Memo<O> {
    fn path_cost(&self, a: Point, b: Point) -> Option<f64> {
        let key = Self::key(a, b);
        if let Some(hit) = self.cache.borrow().get(&key) {
            return *hit;
        }
        let cost = self.inner.path_cost(a, b);
        self.cache.borrow_mut().insert(key, cost);
        cost
    }
}
