//! Strongly-typed identifiers for cells, nodes and grid positions.

use std::fmt;

/// Handle to a [`Cell`](crate::Cell) stored in a cell arena.
///
/// A handle is a `(slot, generation)` pair. Freeing a cell bumps the
/// slot's generation, so a handle that outlives its cell fails the
/// arena's exists-check instead of aliasing whatever reuses the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct CellId {
    slot: u32,
    generation: u32,
}

impl CellId {
    /// Build a handle from its raw parts.
    ///
    /// Only arenas mint handles that resolve; a hand-built handle is
    /// useful in tests and as a lookup key.
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// Index of the arena slot.
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Generation of the slot when this handle was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}.{}", self.slot, self.generation)
    }
}

/// Identifies a stencil node hosted by an object service.
///
/// Node IDs are allocated sequentially by the service and never reused
/// within one service instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Tag attached to every entry sent to a log sink.
///
/// Lets one sink tell apart the base mesh and the child meshes spawned
/// by refinement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoggingId(pub u32);

impl fmt::Display for LoggingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for LoggingId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Position of a stencil node in a mesh: `row` is the time lane,
/// `column` the spatial cell index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPos {
    /// Time lane (and integrator sub-stage for multi-stage schemes).
    pub row: usize,
    /// Spatial cell index within the row.
    pub column: usize,
}

impl GridPos {
    /// Shorthand constructor.
    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_id_parts() {
        let id = CellId::new(7, 3);
        assert_eq!(id.slot(), 7);
        assert_eq!(id.generation(), 3);
        assert_eq!(id.to_string(), "cell#7.3");
    }

    #[test]
    fn cell_ids_order_by_slot_then_generation() {
        assert!(CellId::new(1, 9) < CellId::new(2, 0));
        assert!(CellId::new(2, 0) < CellId::new(2, 1));
    }

    #[test]
    fn grid_pos_display() {
        assert_eq!(GridPos::new(2, 4).to_string(), "(2,4)");
        assert_eq!(NodeId::from(12).to_string(), "node#12");
    }
}
