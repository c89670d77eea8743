//! Range decomposition
//!
//! A rectangle is scattered along the curve. Sorting its pixels by position
//! turns the scatter into a handful of runs of consecutive positions, and each
//! run is served by sequential copies out of one or more nodes.

use crate::geometry::Rect;
use crate::index::SpatialIndex;
use crate::node::NodeCapacity;
use smallvec::SmallVec;
use std::ops::Range;

#[cfg(feature = "parallel")]
use rayon::slice::ParallelSliceMut;

/// One pixel of the rectangle: position relative to the top-left corner and
/// its row-major slot in the caller's buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Pair {
    pub relative: u64,
    pub slot: usize,
}

/// Pixels of a rectangle grouped into runs of consecutive positions
#[derive(Debug)]
pub(crate) struct RangePlan {
    /// Position of the top-left corner
    pub base: u64,
    /// Pairs sorted by relative position
    pub pairs: Vec<Pair>,
    /// Runs as index ranges into `pairs`
    pub runs: Vec<Range<usize>>,
}

/// A slice of a run that falls inside a single node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeSpan {
    pub node: u64,
    pub offset: usize,
    /// Index range into `RangePlan::pairs`
    pub start: usize,
    pub len: usize,
}

impl RangePlan {
    /// Decompose `rect` (already validated against the index extent)
    pub fn new<I: SpatialIndex>(index: &I, rect: Rect) -> Self {
        let base = index.position(rect.row, rect.col);
        let cols = rect.cols as usize;
        let mut pairs = Vec::with_capacity(rect.area() as usize);
        for i in 0..rect.rows {
            let partial = index.row_partial(rect.row + i);
            let row_slot = i as usize * cols;
            for j in 0..rect.cols {
                // positions grow with row and col, so nothing precedes the corner
                let position = index.position_from_partial(partial, rect.col + j);
                pairs.push(Pair {
                    relative: position - base,
                    slot: row_slot + j as usize,
                });
            }
        }

        sort_pairs(&mut pairs);
        let runs = split_runs(&pairs);
        Self { base, pairs, runs }
    }

    /// Split every run at node boundaries
    pub fn spans(&self, capacity: NodeCapacity) -> SmallVec<[NodeSpan; 8]> {
        let mut spans = SmallVec::new();
        for run in &self.runs {
            let mut position = self.base + self.pairs[run.start].relative;
            let mut start = run.start;
            let mut remaining = run.len() as u64;
            while remaining > 0 {
                let (node, offset) = capacity.locate(position);
                let len = remaining.min(capacity.size() - offset);
                spans.push(NodeSpan {
                    node,
                    offset: offset as usize,
                    start,
                    len: len as usize,
                });
                position += len;
                start += len as usize;
                remaining -= len;
            }
        }
        spans
    }
}

#[cfg(feature = "parallel")]
fn sort_pairs(pairs: &mut [Pair]) {
    pairs.par_sort_unstable_by_key(|p| p.relative);
}

#[cfg(not(feature = "parallel"))]
fn sort_pairs(pairs: &mut [Pair]) {
    pairs.sort_unstable_by_key(|p| p.relative);
}

fn split_runs(pairs: &[Pair]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut front = 0;
    while front < pairs.len() {
        let mut tail = front + 1;
        while tail < pairs.len() && pairs[tail].relative == pairs[tail - 1].relative + 1 {
            tail += 1;
        }
        runs.push(front..tail);
        front = tail;
    }
    runs
}
