//! Run counters shared by every node of a run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters, updated by node threads with relaxed atomics.
#[derive(Debug, Default)]
pub struct MeshMetrics {
    nodes: AtomicU64,
    evaluations: AtomicU64,
    refinements: AtomicU64,
    child_meshes: AtomicU64,
    search_hits: AtomicU64,
    search_misses: AtomicU64,
    released: AtomicU64,
}

impl MeshMetrics {
    pub(crate) fn node_launched(&self) {
        self.nodes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn evaluated(&self) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn refined(&self) {
        self.refinements.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn child_mesh(&self) {
        self.child_meshes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn search(&self, hit: bool) {
        let counter = if hit {
            &self.search_hits
        } else {
            &self.search_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn released(&self, cells: usize) {
        self.released
            .fetch_add(u64::try_from(cells).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    /// Copy the counters out, stamping the wall time.
    pub fn snapshot(&self, wall_time: Duration) -> RunMetrics {
        RunMetrics {
            nodes_launched: self.nodes.load(Ordering::Relaxed),
            evaluations: self.evaluations.load(Ordering::Relaxed),
            refinements: self.refinements.load(Ordering::Relaxed),
            child_meshes: self.child_meshes.load(Ordering::Relaxed),
            search_hits: self.search_hits.load(Ordering::Relaxed),
            search_misses: self.search_misses.load(Ordering::Relaxed),
            cells_released: self.released.load(Ordering::Relaxed),
            wall_time_us: u64::try_from(wall_time.as_micros()).unwrap_or(u64::MAX),
        }
    }
}

/// Counters for one completed run, child meshes included.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunMetrics {
    /// Node control loops started.
    pub nodes_launched: u64,
    /// Kernel evaluations.
    pub evaluations: u64,
    /// Cells replaced by a refined value.
    pub refinements: u64,
    /// Child meshes run.
    pub child_meshes: u64,
    /// Midpoints taken from an existing fine cell.
    pub search_hits: u64,
    /// Midpoints interpolated.
    pub search_misses: u64,
    /// Retained fine cells freed during the run, once no consumer could
    /// still reach them.
    pub cells_released: u64,
    /// Wall-clock time of the run, in microseconds.
    pub wall_time_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let m = MeshMetrics::default();
        m.node_launched();
        m.node_launched();
        m.evaluated();
        m.refined();
        m.child_mesh();
        m.search(true);
        m.search(false);
        m.search(false);
        m.released(4);
        let s = m.snapshot(Duration::from_millis(3));
        assert_eq!(
            s,
            RunMetrics {
                nodes_launched: 2,
                evaluations: 1,
                refinements: 1,
                child_meshes: 1,
                search_hits: 1,
                search_misses: 2,
                cells_released: 4,
                wall_time_us: 3000,
            }
        );
    }
}
