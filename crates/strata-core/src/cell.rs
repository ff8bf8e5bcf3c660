//! The [`Cell`] value record and its cross-reference set.
//!
//! A cell holds the state of one or more contiguous grid points at one
//! logical instant. The engine treats the payload as opaque; only the
//! kernel interprets it. Cells are frozen once published: nodes hand
//! them to consumers as `Arc<Cell>` snapshots and never mutate a
//! published value in place.

use smallvec::SmallVec;

use crate::id::CellId;

/// Absolute tolerance used when matching grid coordinates.
pub const COORD_TOLERANCE: f64 = 1e-8;

/// Non-owning references from a cell to finer cells that replace or
/// border it.
///
/// Links are weak: holding a [`CellId`] keeps nothing alive, and readers
/// must check that the target still exists in the arena before use.
/// Every link is written by the node that owns the cell, before the cell
/// is published, and is read-only afterwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CrossLinks {
    /// The fine cell whose value replaced this one (restriction target).
    pub overwrite: Option<CellId>,
    /// Fine cell immediately to the left of this cell's coordinate.
    pub left: Option<CellId>,
    /// Fine cell immediately to the right of this cell's coordinate.
    pub right: Option<CellId>,
}

impl CrossLinks {
    /// Whether no link is set.
    pub fn is_empty(&self) -> bool {
        self.overwrite.is_none() && self.left.is_none() && self.right.is_none()
    }

    /// All set links, in `overwrite`, `left`, `right` order.
    pub fn iter(&self) -> impl Iterator<Item = CellId> + '_ {
        [self.overwrite, self.left, self.right].into_iter().flatten()
    }
}

/// State of a batch of grid points at one logical time.
///
/// `payload` is laid out point-major: point `p` owns
/// `payload[p * num_eqns .. (p + 1) * num_eqns]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    /// Column index of the cell within its mesh.
    pub column: usize,
    /// Number of columns in the mesh the cell belongs to.
    pub columns: usize,
    /// Refinement depth; 0 is the base mesh.
    pub level: u32,
    /// Completed time steps. Drives termination.
    pub cycle: u32,
    /// Integrator stage within the current step (0 between full steps).
    pub iter: u32,
    /// Physical time of the state.
    pub time: f64,
    /// Coordinates of the points held by this cell, ascending.
    pub coords: SmallVec<[f64; 4]>,
    /// Evolved state, `coords.len() * num_eqns` values.
    pub payload: Vec<f64>,
    /// Set after a full sub-cycle when the state asks for refinement.
    pub refine: bool,
    /// Cross-references into finer meshes.
    pub links: CrossLinks,
}

impl Cell {
    /// An empty cell at the given column and level.
    pub fn new(column: usize, columns: usize, level: u32) -> Self {
        Self {
            column,
            columns,
            level,
            cycle: 0,
            iter: 0,
            time: 0.0,
            coords: SmallVec::new(),
            payload: Vec::new(),
            refine: false,
            links: CrossLinks::default(),
        }
    }

    /// Replace the points of this cell, zeroing the payload.
    pub fn with_points(mut self, coords: impl IntoIterator<Item = f64>, num_eqns: usize) -> Self {
        self.coords = coords.into_iter().collect();
        self.payload = vec![0.0; self.coords.len() * num_eqns];
        self
    }

    /// Number of grid points held.
    pub fn num_points(&self) -> usize {
        self.coords.len()
    }

    /// Values per point, or 0 for a cell without points.
    pub fn num_eqns(&self) -> usize {
        if self.coords.is_empty() {
            0
        } else {
            self.payload.len() / self.coords.len()
        }
    }

    /// Whether the payload length is a whole multiple of the point count.
    pub fn is_consistent(&self) -> bool {
        if self.coords.is_empty() {
            self.payload.is_empty()
        } else {
            self.payload.len() % self.coords.len() == 0
        }
    }

    /// State of point `p`.
    ///
    /// # Panics
    ///
    /// Panics if `p >= num_points()`.
    pub fn point(&self, p: usize) -> &[f64] {
        let n = self.num_eqns();
        &self.payload[p * n..(p + 1) * n]
    }

    /// Mutable state of point `p`.
    ///
    /// # Panics
    ///
    /// Panics if `p >= num_points()`.
    pub fn point_mut(&mut self, p: usize) -> &mut [f64] {
        let n = self.num_eqns();
        &mut self.payload[p * n..(p + 1) * n]
    }

    /// Index of the point at coordinate `x`, within [`COORD_TOLERANCE`].
    pub fn find_coord(&self, x: f64) -> Option<usize> {
        self.coords
            .iter()
            .position(|c| (c - x).abs() < COORD_TOLERANCE)
    }

    /// Coordinate of the first point.
    pub fn first_coord(&self) -> Option<f64> {
        self.coords.first().copied()
    }

    /// Coordinate of the last point.
    pub fn last_coord(&self) -> Option<f64> {
        self.coords.last().copied()
    }

    /// Distance from `x` to the nearest point of this cell.
    pub fn distance_to(&self, x: f64) -> f64 {
        self.coords
            .iter()
            .map(|c| (c - x).abs())
            .fold(f64::INFINITY, f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_point_cell() -> Cell {
        let mut cell = Cell::new(1, 4, 0).with_points([0.5, 1.0], 3);
        cell.point_mut(1).copy_from_slice(&[7.0, 8.0, 9.0]);
        cell
    }

    #[test]
    fn point_slices_follow_layout() {
        let cell = two_point_cell();
        assert_eq!(cell.num_points(), 2);
        assert_eq!(cell.num_eqns(), 3);
        assert_eq!(cell.point(0), &[0.0, 0.0, 0.0]);
        assert_eq!(cell.point(1), &[7.0, 8.0, 9.0]);
        assert!(cell.is_consistent());
    }

    #[test]
    fn find_coord_uses_tolerance() {
        let cell = two_point_cell();
        assert_eq!(cell.find_coord(1.0 + 1e-9), Some(1));
        assert_eq!(cell.find_coord(1.0 + 1e-6), None);
        assert_eq!(cell.first_coord(), Some(0.5));
        assert_eq!(cell.last_coord(), Some(1.0));
    }

    #[test]
    fn empty_cell_has_no_eqns() {
        let cell = Cell::new(0, 1, 0);
        assert_eq!(cell.num_eqns(), 0);
        assert!(cell.is_consistent());
        assert_eq!(cell.distance_to(3.0), f64::INFINITY);
    }

    #[test]
    fn links_iterate_in_fixed_order() {
        let links = CrossLinks {
            overwrite: Some(CellId::new(1, 0)),
            left: None,
            right: Some(CellId::new(3, 0)),
        };
        let ids: Vec<_> = links.iter().collect();
        assert_eq!(ids, vec![CellId::new(1, 0), CellId::new(3, 0)]);
        assert!(!links.is_empty());
        assert!(CrossLinks::default().is_empty());
    }

    // ── Property tests ──────────────────────────────────────────

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn every_coord_is_found(xs in prop::collection::vec(-100.0f64..100.0, 1..8)) {
                let mut sorted = xs.clone();
                sorted.sort_by(f64::total_cmp);
                sorted.dedup_by(|a, b| (*a - *b).abs() < 1e-6);
                let cell = Cell::new(0, 1, 0).with_points(sorted.iter().copied(), 2);
                for (i, x) in sorted.iter().enumerate() {
                    prop_assert_eq!(cell.find_coord(*x), Some(i));
                    prop_assert!(cell.distance_to(*x) < COORD_TOLERANCE);
                }
            }
        }
    }
}
