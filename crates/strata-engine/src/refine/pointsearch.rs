//! Point search across refinement boundaries.
//!
//! Before a child mesh interpolates a midpoint it asks whether a sibling
//! refinement already computed a fine value at that coordinate. The
//! search starts at the `overwrite` link of each bracketing coarse cell
//! and walks `left`/`right` links of the fine cells it reaches, nearest
//! side first:
//!
//! ```text
//! coarse:   [x4] ──overwrite──▶ fine [x4] ──right──▶ fine [x4.5]  ✓
//! ```

use indexmap::IndexSet;
use smallvec::SmallVec;
use strata_arena::CellArena;
use strata_core::{Cell, CellId, CrossLinks};

/// Upper bound on cells visited by one search.
pub const MAX_HOPS: usize = 64;

/// A fine value located by [`findpoint`].
#[derive(Clone, Debug, PartialEq)]
pub struct Found {
    /// Cell holding the point.
    pub cell: CellId,
    /// Index of the point within the cell.
    pub point: usize,
    /// The point's state.
    pub values: SmallVec<[f64; 8]>,
    /// Cross-references of the holding cell, so a copy of the point
    /// stays connected to its neighbours.
    pub links: CrossLinks,
}

/// Look for an already-computed level-`level` point at `x`, starting from
/// the cells that replaced `left` and `right`.
///
/// Returns `None` once the link chains are exhausted; links to freed
/// cells end their chain.
pub fn findpoint(
    arena: &CellArena,
    left: &Cell,
    right: &Cell,
    x: f64,
    level: u32,
) -> Option<Found> {
    let mut visited: IndexSet<CellId> = IndexSet::new();
    [left.links.overwrite, right.links.overwrite]
        .into_iter()
        .flatten()
        .find_map(|start| hop(arena, start, x, level, &mut visited))
}

fn hop(
    arena: &CellArena,
    id: CellId,
    x: f64,
    level: u32,
    visited: &mut IndexSet<CellId>,
) -> Option<Found> {
    if visited.len() >= MAX_HOPS || !visited.insert(id) {
        return None;
    }
    let cell = arena.resolve(id)?;
    tracing::trace!(cell = %id, level = cell.level, x, "point search hop");
    if cell.level == level {
        if let Some(point) = cell.find_coord(x) {
            return Some(Found {
                cell: id,
                point,
                values: cell.point(point).iter().copied().collect(),
                links: cell.links,
            });
        }
    }

    let mut sides: SmallVec<[(f64, CellId); 2]> = [cell.links.left, cell.links.right]
        .into_iter()
        .flatten()
        .filter_map(|side| arena.resolve(side).map(|c| (c.distance_to(x), side)))
        .collect();
    sides.sort_by(|a, b| a.0.total_cmp(&b.0));

    cell.links
        .overwrite
        .into_iter()
        .chain(sides.into_iter().map(|(_, side)| side))
        .find_map(|next| hop(arena, next, x, level, visited))
}

#[cfg(test)]
mod tests {
    use strata_arena::ArenaConfig;

    use super::*;

    fn fine(arena: &CellArena, x: f64, v: f64) -> CellId {
        let mut cell = Cell::new(0, 1, 1).with_points([x], 2);
        cell.payload = vec![v, -v];
        arena.insert(cell).unwrap()
    }

    fn link(arena: &CellArena, id: CellId, links: CrossLinks) {
        arena.update(id, |c| c.links = links).unwrap();
    }

    fn coarse(x: f64, overwrite: Option<CellId>) -> Cell {
        let mut cell = Cell::new(0, 1, 0).with_points([x], 2);
        cell.links.overwrite = overwrite;
        cell
    }

    #[test]
    fn follows_overwrite_then_right_link() {
        let arena = CellArena::new(ArenaConfig::with_max_cells(16));
        let left = fine(&arena, 3.5, 1.0);
        let centre = fine(&arena, 4.0, 2.0);
        let right = fine(&arena, 4.5, 3.0);
        link(
            &arena,
            centre,
            CrossLinks {
                overwrite: None,
                left: Some(left),
                right: Some(right),
            },
        );

        let a = coarse(4.0, Some(centre));
        let b = coarse(5.0, None);
        let found = findpoint(&arena, &a, &b, 4.5, 1).unwrap();
        assert_eq!(found.cell, right);
        assert_eq!(found.point, 0);
        assert_eq!(found.values.as_slice(), &[3.0, -3.0]);
        assert!(found.links.is_empty());
    }

    #[test]
    fn hit_carries_the_holding_cells_links() {
        let arena = CellArena::new(ArenaConfig::with_max_cells(16));
        let centre = fine(&arena, 4.0, 2.0);
        let right = fine(&arena, 4.5, 3.0);
        let beyond = fine(&arena, 5.0, 4.0);
        link(
            &arena,
            centre,
            CrossLinks {
                overwrite: None,
                left: None,
                right: Some(right),
            },
        );
        let held = CrossLinks {
            overwrite: None,
            left: Some(centre),
            right: Some(beyond),
        };
        link(&arena, right, held);

        let found = findpoint(&arena, &coarse(4.0, Some(centre)), &coarse(5.0, None), 4.5, 1)
            .unwrap();
        assert_eq!(found.cell, right);
        assert_eq!(found.links, held);
    }

    #[test]
    fn searches_from_right_anchor_too() {
        let arena = CellArena::new(ArenaConfig::with_max_cells(16));
        let centre = fine(&arena, 5.0, 2.0);
        let left = fine(&arena, 4.5, 7.0);
        link(
            &arena,
            centre,
            CrossLinks {
                overwrite: None,
                left: Some(left),
                right: None,
            },
        );
        let found = findpoint(&arena, &coarse(4.0, None), &coarse(5.0, Some(centre)), 4.5, 1);
        assert_eq!(found.map(|f| f.cell), Some(left));
    }

    #[test]
    fn wrong_level_is_not_a_match() {
        let arena = CellArena::new(ArenaConfig::with_max_cells(16));
        let centre = fine(&arena, 4.0, 2.0);
        let found = findpoint(&arena, &coarse(4.0, Some(centre)), &coarse(5.0, None), 4.0, 2);
        assert!(found.is_none());
    }

    #[test]
    fn freed_targets_end_the_search() {
        let arena = CellArena::new(ArenaConfig::with_max_cells(16));
        let centre = fine(&arena, 4.0, 2.0);
        let right = fine(&arena, 4.5, 3.0);
        link(
            &arena,
            centre,
            CrossLinks {
                overwrite: None,
                left: None,
                right: Some(right),
            },
        );
        arena.free(right).unwrap();
        let found = findpoint(&arena, &coarse(4.0, Some(centre)), &coarse(5.0, None), 4.5, 1);
        assert!(found.is_none());
    }

    #[test]
    fn cyclic_links_terminate() {
        let arena = CellArena::new(ArenaConfig::with_max_cells(16));
        let a = fine(&arena, 4.0, 1.0);
        let b = fine(&arena, 4.25, 1.0);
        link(
            &arena,
            a,
            CrossLinks {
                overwrite: None,
                left: None,
                right: Some(b),
            },
        );
        link(
            &arena,
            b,
            CrossLinks {
                overwrite: None,
                left: Some(a),
                right: None,
            },
        );
        let found = findpoint(&arena, &coarse(4.0, Some(a)), &coarse(5.0, None), 4.75, 1);
        assert!(found.is_none());
    }

    #[test]
    fn no_links_means_not_found() {
        let arena = CellArena::new(ArenaConfig::with_max_cells(4));
        assert!(findpoint(&arena, &coarse(0.0, None), &coarse(1.0, None), 0.5, 1).is_none());
    }
}
