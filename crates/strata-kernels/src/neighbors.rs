//! Locating spatial neighbours in a flattened predecessor set.

use strata_kernel::PointSet;

/// Flattened indices of the closest points strictly left and right of
/// point `i`.
///
/// Predecessors arrive in wiring order, which is not always coordinate
/// order once several rows feed a node, so this scans instead of
/// stepping by one.
pub(crate) fn around(points: &PointSet<'_>, i: usize) -> (Option<usize>, Option<usize>) {
    let x = points.coord(i);
    let mut left: Option<usize> = None;
    let mut right: Option<usize> = None;
    for j in 0..points.len() {
        let c = points.coord(j);
        if c < x && left.is_none_or(|l| c > points.coord(l)) {
            left = Some(j);
        }
        if c > x && right.is_none_or(|r| c < points.coord(r)) {
            right = Some(j);
        }
    }
    (left, right)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use strata_core::Cell;

    use super::*;

    #[test]
    fn finds_nearest_on_each_side() {
        let cells: Vec<Arc<Cell>> = [2.0, 0.0, 1.0, 3.0]
            .iter()
            .map(|&x| Arc::new(Cell::new(0, 1, 0).with_points([x], 1)))
            .collect();
        let points = PointSet::gather(&cells);
        assert_eq!(around(&points, 2), (Some(1), Some(0)));
        assert_eq!(around(&points, 1), (None, Some(2)));
        assert_eq!(around(&points, 3), (Some(0), None));
    }
}
