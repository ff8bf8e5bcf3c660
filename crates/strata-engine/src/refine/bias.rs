//! Which side of the coarse stencil a child mesh leans towards.

/// Placement of the interpolated midpoints in a child mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Bias {
    /// A midpoint on both sides of every coarse point.
    Unbiased,
    /// Midpoints to the left of each coarse point; the right neighbour is
    /// not refined.
    LeftBiased,
    /// Midpoints to the right of each coarse point; the left neighbour is
    /// not refined.
    RightBiased,
}

impl Bias {
    /// Pick the bias for a node at `row` of a level-`level` mesh whose
    /// immediate coarse neighbours have the given refinement flags.
    ///
    /// Inside a refined mesh, the rows after a block start keep the
    /// centred layout of the block so the lineage of each fine point is
    /// preserved.
    pub fn choose(
        left_refined: bool,
        right_refined: bool,
        row: usize,
        level: u32,
        rows_per_level: usize,
    ) -> Self {
        if level >= 1 && rows_per_level > 0 && matches!(row % rows_per_level, 1 | 2) {
            return Self::Unbiased;
        }
        match (left_refined, right_refined) {
            (true, true) => Self::Unbiased,
            (false, _) => Self::RightBiased,
            (true, false) => Self::LeftBiased,
        }
    }

    /// Fine points produced from `coarse` coarse points.
    pub fn fine_points(self, coarse: usize) -> usize {
        match self {
            Self::Unbiased => 2 * coarse + 1,
            Self::LeftBiased | Self::RightBiased => 2 * coarse,
        }
    }
}
