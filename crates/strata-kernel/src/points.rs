//! Point-level views over a set of cells.

use std::sync::Arc;

use smallvec::SmallVec;
use strata_core::{Cell, COORD_TOLERANCE};

/// The points of a cell sequence, flattened in order.
///
/// Cells may carry several points each; kernels that difference across
/// neighbours and the refinement engine both work on the flattened view.
#[derive(Debug)]
pub struct PointSet<'a> {
    coords: Vec<f64>,
    values: Vec<&'a [f64]>,
    owners: Vec<(usize, usize)>,
}

impl<'a> PointSet<'a> {
    /// Flatten `cells`, preserving cell order and point order within
    /// each cell.
    pub fn gather(cells: &'a [Arc<Cell>]) -> Self {
        let total = cells.iter().map(|c| c.num_points()).sum();
        let mut coords = Vec::with_capacity(total);
        let mut values = Vec::with_capacity(total);
        let mut owners = Vec::with_capacity(total);
        for (ci, cell) in cells.iter().enumerate() {
            for p in 0..cell.num_points() {
                coords.push(cell.coords[p]);
                values.push(cell.point(p));
                owners.push((ci, p));
            }
        }
        Self {
            coords,
            values,
            owners,
        }
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Whether no cell held any points.
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Coordinate of point `i`.
    pub fn coord(&self, i: usize) -> f64 {
        self.coords[i]
    }

    /// State of point `i`.
    pub fn value(&self, i: usize) -> &'a [f64] {
        self.values[i]
    }

    /// `(cell index, point index within cell)` of point `i`.
    pub fn owner(&self, i: usize) -> (usize, usize) {
        self.owners[i]
    }

    /// Flattened indices of the points of cell `cell`.
    pub fn points_of(&self, cell: usize) -> SmallVec<[usize; 4]> {
        self.owners
            .iter()
            .enumerate()
            .filter(|(_, (c, _))| *c == cell)
            .map(|(i, _)| i)
            .collect()
    }

    /// Index of the point at coordinate `x`, within [`COORD_TOLERANCE`].
    pub fn position(&self, x: f64) -> Option<usize> {
        self.coords
            .iter()
            .position(|c| (c - x).abs() < COORD_TOLERANCE)
    }
}

/// Write the average of `a` and `b` into `out`.
///
/// # Panics
///
/// Panics if the slices differ in length.
pub fn midpoint(a: &[f64], b: &[f64], out: &mut [f64]) {
    assert_eq!(a.len(), b.len(), "midpoint of unequal states");
    assert_eq!(a.len(), out.len(), "midpoint into wrong-sized state");
    for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
        *o = 0.5 * (x + y);
    }
}
