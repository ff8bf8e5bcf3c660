//! The [`CellArena`] slab.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use strata_core::{Cell, CellId};

use crate::config::ArenaConfig;
use crate::error::ArenaError;

/// One arena slot. `cell` is `None` while the slot sits on the free list.
struct Slot {
    generation: u32,
    cell: Option<Arc<Cell>>,
}

struct Slab {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    live: usize,
}

impl Slab {
    fn slot(&self, id: CellId) -> Result<&Slot, ArenaError> {
        let slot = self
            .slots
            .get(id.slot() as usize)
            .ok_or(ArenaError::InvalidHandle { id })?;
        if slot.generation != id.generation() || slot.cell.is_none() {
            return Err(ArenaError::StaleHandle {
                id,
                current: slot.generation,
            });
        }
        Ok(slot)
    }

    fn slot_mut(&mut self, id: CellId) -> Result<&mut Slot, ArenaError> {
        let slot = self
            .slots
            .get_mut(id.slot() as usize)
            .ok_or(ArenaError::InvalidHandle { id })?;
        if slot.generation != id.generation() || slot.cell.is_none() {
            return Err(ArenaError::StaleHandle {
                id,
                current: slot.generation,
            });
        }
        Ok(slot)
    }
}

/// Shared, thread-safe cell storage addressed by generational handles.
///
/// One arena backs a whole run, including every child mesh spawned by
/// refinement. All methods take `&self`; the arena is shared as
/// `Arc<CellArena>`.
pub struct CellArena {
    config: ArenaConfig,
    slab: RwLock<Slab>,
}

impl CellArena {
    /// Create an empty arena.
    pub fn new(config: ArenaConfig) -> Self {
        let slab = Slab {
            slots: Vec::with_capacity(config.initial_slots),
            free_list: Vec::new(),
            live: 0,
        };
        Self {
            config,
            slab: RwLock::new(slab),
        }
    }

    // Slab operations never leave it half-updated, so a panic on another
    // thread does not invalidate the data behind a poisoned lock.
    fn read(&self) -> RwLockReadGuard<'_, Slab> {
        self.slab.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slab> {
        self.slab.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// The arena's configuration.
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Store a new cell and return its handle.
    pub fn insert(&self, cell: Cell) -> Result<CellId, ArenaError> {
        let mut slab = self.write();
        if slab.live >= self.config.max_cells {
            return Err(ArenaError::CapacityExceeded {
                capacity: self.config.max_cells,
            });
        }
        let cell = Some(Arc::new(cell));
        let id = if let Some(index) = slab.free_list.pop() {
            let slot = &mut slab.slots[index as usize];
            slot.cell = cell;
            CellId::new(index, slot.generation)
        } else {
            let index = u32::try_from(slab.slots.len()).map_err(|_| {
                ArenaError::CapacityExceeded {
                    capacity: u32::MAX as usize,
                }
            })?;
            slab.slots.push(Slot {
                generation: 0,
                cell,
            });
            CellId::new(index, 0)
        };
        slab.live += 1;
        Ok(id)
    }

    /// Snapshot of the cell behind `id`.
    pub fn get(&self, id: CellId) -> Result<Arc<Cell>, ArenaError> {
        let slab = self.read();
        let slot = slab.slot(id)?;
        slot.cell.clone().ok_or(ArenaError::StaleHandle {
            id,
            current: slot.generation,
        })
    }

    /// Snapshot of the cell behind a weak reference, or `None` if the
    /// target no longer exists.
    pub fn resolve(&self, id: CellId) -> Option<Arc<Cell>> {
        self.get(id).ok()
    }

    /// Exists-check for weak references.
    pub fn contains(&self, id: CellId) -> bool {
        self.read().slot(id).is_ok()
    }

    /// Replace the cell behind `id`. Readers holding earlier snapshots
    /// are unaffected.
    pub fn store(&self, id: CellId, cell: Cell) -> Result<(), ArenaError> {
        let mut slab = self.write();
        let slot = slab.slot_mut(id)?;
        slot.cell = Some(Arc::new(cell));
        Ok(())
    }

    /// Store `cell` and return the snapshot that was written.
    pub fn publish(&self, id: CellId, cell: Cell) -> Result<Arc<Cell>, ArenaError> {
        let snapshot = Arc::new(cell);
        let mut slab = self.write();
        let slot = slab.slot_mut(id)?;
        slot.cell = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Modify the cell behind `id` in place, cloning it first if a reader
    /// still holds the current snapshot.
    pub fn update<R>(&self, id: CellId, f: impl FnOnce(&mut Cell) -> R) -> Result<R, ArenaError> {
        let mut slab = self.write();
        let slot = slab.slot_mut(id)?;
        let generation = slot.generation;
        let cell = slot.cell.as_mut().ok_or(ArenaError::StaleHandle {
            id,
            current: generation,
        })?;
        Ok(f(Arc::make_mut(cell)))
    }

    /// Free the cell behind `id`, returning its last snapshot.
    pub fn free(&self, id: CellId) -> Result<Arc<Cell>, ArenaError> {
        let mut slab = self.write();
        let slot = slab.slot_mut(id)?;
        let generation = slot.generation;
        let cell = slot.cell.take().ok_or(ArenaError::StaleHandle {
            id,
            current: generation,
        })?;
        slot.generation = slot.generation.wrapping_add(1);
        slab.free_list.push(id.slot());
        slab.live -= 1;
        Ok(cell)
    }

    /// Free every live handle in `ids`; stale handles are skipped.
    /// Returns how many cells were freed.
    pub fn free_all(&self, ids: impl IntoIterator<Item = CellId>) -> usize {
        ids.into_iter().filter(|id| self.free(*id).is_ok()).count()
    }

    /// Number of live cells.
    pub fn live(&self) -> usize {
        self.read().live
    }
}

impl std::fmt::Debug for CellArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slab = self.read();
        f.debug_struct("CellArena")
            .field("live", &slab.live)
            .field("slots", &slab.slots.len())
            .field("free", &slab.free_list.len())
            .field("max_cells", &self.config.max_cells)
            .finish()
    }
}

// Compile-time assertion: the arena is shared across node threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<CellArena>();
};

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> CellArena {
        CellArena::new(ArenaConfig::with_max_cells(8))
    }

    fn cell_at(x: f64) -> Cell {
        Cell::new(0, 1, 0).with_points([x], 1)
    }

    #[test]
    fn insert_then_get() {
        let arena = arena();
        let id = arena.insert(cell_at(1.5)).unwrap();
        assert_eq!(arena.get(id).unwrap().coords[0], 1.5);
        assert_eq!(arena.live(), 1);
        assert!(arena.contains(id));
    }

    #[test]
    fn freed_handle_goes_stale_and_slot_is_reused() {
        let arena = arena();
        let id = arena.insert(cell_at(1.0)).unwrap();
        arena.free(id).unwrap();
        assert!(!arena.contains(id));
        match arena.get(id) {
            Err(ArenaError::StaleHandle { current, .. }) => assert_eq!(current, 1),
            other => panic!("expected StaleHandle, got {other:?}"),
        }

        let reused = arena.insert(cell_at(2.0)).unwrap();
        assert_eq!(reused.slot(), id.slot());
        assert_eq!(reused.generation(), 1);
        assert!(arena.resolve(id).is_none());
        assert_eq!(arena.resolve(reused).unwrap().coords[0], 2.0);
    }

    #[test]
    fn double_free_is_rejected() {
        let arena = arena();
        let id = arena.insert(cell_at(1.0)).unwrap();
        arena.free(id).unwrap();
        assert!(arena.free(id).is_err());
        assert_eq!(arena.live(), 0);
    }

    #[test]
    fn unknown_slot_is_invalid() {
        let arena = arena();
        match arena.get(CellId::new(99, 0)) {
            Err(ArenaError::InvalidHandle { .. }) => {}
            other => panic!("expected InvalidHandle, got {other:?}"),
        }
    }

    #[test]
    fn capacity_limit_enforced() {
        let arena = CellArena::new(ArenaConfig::with_max_cells(2));
        let _a = arena.insert(cell_at(0.0)).unwrap();
        let _b = arena.insert(cell_at(1.0)).unwrap();
        match arena.insert(cell_at(2.0)) {
            Err(ArenaError::CapacityExceeded { capacity: 2 }) => {}
            other => panic!("expected CapacityExceeded, got {other:?}"),
        }
    }

    #[test]
    fn store_leaves_old_snapshots_untouched() {
        let arena = arena();
        let id = arena.insert(cell_at(1.0)).unwrap();
        let before = arena.get(id).unwrap();
        arena.store(id, cell_at(5.0)).unwrap();
        assert_eq!(before.coords[0], 1.0);
        assert_eq!(arena.get(id).unwrap().coords[0], 5.0);
    }

    #[test]
    fn update_clones_when_shared() {
        let arena = arena();
        let id = arena.insert(cell_at(1.0)).unwrap();
        let held = arena.get(id).unwrap();
        arena.update(id, |c| c.refine = true).unwrap();
        assert!(!held.refine);
        assert!(arena.get(id).unwrap().refine);
    }

    #[test]
    fn publish_returns_stored_snapshot() {
        let arena = arena();
        let id = arena.insert(cell_at(1.0)).unwrap();
        let snap = arena.publish(id, cell_at(3.0)).unwrap();
        assert!(Arc::ptr_eq(&snap, &arena.get(id).unwrap()));
    }

    #[test]
    fn free_all_skips_stale() {
        let arena = arena();
        let a = arena.insert(cell_at(0.0)).unwrap();
        let b = arena.insert(cell_at(1.0)).unwrap();
        arena.free(a).unwrap();
        assert_eq!(arena.free_all([a, b]), 1);
        assert_eq!(arena.live(), 0);
    }

    // ── Property tests ──────────────────────────────────────────

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn live_count_matches_model(ops in prop::collection::vec(any::<bool>(), 1..64)) {
                let arena = CellArena::new(ArenaConfig::with_max_cells(128));
                let mut held: Vec<CellId> = Vec::new();
                let mut freed: Vec<CellId> = Vec::new();
                for (i, insert) in ops.into_iter().enumerate() {
                    if insert || held.is_empty() {
                        held.push(arena.insert(cell_at(i as f64)).unwrap());
                    } else {
                        let id = held.remove(i % held.len());
                        arena.free(id).unwrap();
                        freed.push(id);
                    }
                    prop_assert_eq!(arena.live(), held.len());
                }
                for id in &held {
                    prop_assert!(arena.contains(*id));
                }
                for id in &freed {
                    prop_assert!(!arena.contains(*id));
                }
            }
        }
    }
}
