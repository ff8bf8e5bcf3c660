//! Walking the cross-reference graph stored in the arena.
//!
//! Cross-references form a forest rooted at coarse cells. These helpers
//! compute what a set of roots keeps alive and check that no reference
//! chain loops back on itself.

use indexmap::IndexSet;
use strata_core::CellId;

use crate::arena::CellArena;

impl CellArena {
    /// Every live cell reachable from `roots` through `overwrite`, `left`
    /// and `right` links, roots included, in discovery order.
    ///
    /// Links to freed cells are skipped.
    pub fn closure(&self, roots: impl IntoIterator<Item = CellId>) -> IndexSet<CellId> {
        let mut seen: IndexSet<CellId> = IndexSet::new();
        let mut stack: Vec<CellId> = roots.into_iter().collect();
        while let Some(id) = stack.pop() {
            if seen.contains(&id) {
                continue;
            }
            let Some(cell) = self.resolve(id) else {
                continue;
            };
            seen.insert(id);
            stack.extend(cell.links.iter().filter(|l| !seen.contains(l)));
        }
        seen
    }

    /// A reference chain starting at `root` that revisits a cell, if any.
    ///
    /// The returned path starts at `root` and ends with the repeated cell.
    pub fn find_cycle(&self, root: CellId) -> Option<Vec<CellId>> {
        let mut done: IndexSet<CellId> = IndexSet::new();
        let mut path: Vec<CellId> = Vec::new();
        self.cycle_from(root, &mut path, &mut done)
    }

    fn cycle_from(
        &self,
        id: CellId,
        path: &mut Vec<CellId>,
        done: &mut IndexSet<CellId>,
    ) -> Option<Vec<CellId>> {
        if path.contains(&id) {
            let mut cycle = path.clone();
            cycle.push(id);
            return Some(cycle);
        }
        if done.contains(&id) {
            return None;
        }
        let cell = self.resolve(id)?;
        path.push(id);
        for next in cell.links.iter() {
            if let Some(cycle) = self.cycle_from(next, path, done) {
                return Some(cycle);
            }
        }
        path.pop();
        done.insert(id);
        None
    }

    /// Whether every set link reachable from `root` resolves to a live cell.
    pub fn links_resolve(&self, root: CellId) -> bool {
        self.closure([root]).iter().all(|id| {
            self.resolve(*id)
                .is_some_and(|cell| cell.links.iter().all(|l| self.contains(l)))
        })
    }
}
