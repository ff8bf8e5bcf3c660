//! Arena configuration parameters.

/// Configuration for a [`CellArena`](crate::CellArena).
///
/// Immutable after the arena is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Maximum number of live cells.
    ///
    /// Default: 1_048_576. Refinement keeps fine cells alive as
    /// cross-reference targets and runs child meshes inside the parent's
    /// arena, so deep refinement needs headroom.
    pub max_cells: usize,

    /// Slots reserved up front. Default: 256.
    pub initial_slots: usize,
}

impl ArenaConfig {
    /// Default live-cell limit.
    pub const DEFAULT_MAX_CELLS: usize = 1 << 20;

    /// Default number of pre-reserved slots.
    pub const DEFAULT_INITIAL_SLOTS: usize = 256;

    /// Config with the given live-cell limit and default reservation.
    pub fn with_max_cells(max_cells: usize) -> Self {
        Self {
            max_cells,
            initial_slots: Self::DEFAULT_INITIAL_SLOTS.min(max_cells),
        }
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::with_max_cells(Self::DEFAULT_MAX_CELLS)
    }
}
