//! Test utilities for Strata development.
//!
//! Deterministic kernels for driving meshes in tests (see [`fixtures`])
//! and [`CaptureLog`], a log sink that records every entry it receives.
//!
//! Only use these from integration tests: the engine's own unit tests
//! would see a second copy of its types.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::{Arc, Mutex, PoisonError};

use strata_arena::CellArena;
use strata_core::{Cell, CellId, CrossLinks, GridPos, LoggingId};
use strata_engine::{LogEntry, LogPhase, LogSink};

pub use fixtures::{FailingKernel, RefineAt, SlowKernel, StepCounter};

/// One recorded log entry.
#[derive(Clone, Debug)]
pub struct Captured {
    pub logging_id: Option<LoggingId>,
    pub id: CellId,
    pub pos: GridPos,
    pub phase: LogPhase,
    pub column: usize,
    pub level: u32,
    pub cycle: u32,
    pub coords: Vec<f64>,
    pub payload: Vec<f64>,
    pub links: CrossLinks,
    /// Whether every link reachable from the cell resolved when logged.
    /// `None` without an arena.
    pub links_resolve: Option<bool>,
    /// Whether the link graph from the cell was acyclic when logged.
    /// `None` without an arena.
    pub acyclic: Option<bool>,
    /// Snapshot of the `overwrite` target when logged.
    pub overwrite: Option<Cell>,
    /// Snapshots of the `overwrite` target's left and right neighbours
    /// when logged.
    pub overwrite_sides: [Option<Cell>; 2],
    /// Live cells in the arena when logged. `None` without an arena.
    pub live: Option<usize>,
}

/// A [`LogSink`] that keeps every entry.
///
/// Built [`with_arena`](CaptureLog::with_arena), it also inspects the
/// cell's cross-references at the moment the entry is logged, while the
/// referenced cells are guaranteed to still be alive.
#[derive(Default)]
pub struct CaptureLog {
    entries: Mutex<Vec<Captured>>,
    arena: Option<Arc<CellArena>>,
}

impl CaptureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arena(arena: Arc<CellArena>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            arena: Some(arena),
        }
    }

    /// Everything logged so far.
    pub fn entries(&self) -> Vec<Captured> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Entries of one phase.
    pub fn phase(&self, phase: LogPhase) -> Vec<Captured> {
        self.entries()
            .into_iter()
            .filter(|e| e.phase == phase)
            .collect()
    }
}

impl LogSink for CaptureLog {
    fn log_entry(&self, entry: &LogEntry<'_>) {
        let cell = entry.cell;
        let snapshot = |id: Option<CellId>| -> Option<Cell> {
            let arena = self.arena.as_ref()?;
            arena.resolve(id?).map(|c| Cell::clone(&c))
        };
        let overwrite = snapshot(cell.links.overwrite);
        let overwrite_sides = match &overwrite {
            Some(fine) => [snapshot(fine.links.left), snapshot(fine.links.right)],
            None => [None, None],
        };
        let (links_resolve, acyclic, live) = match &self.arena {
            Some(arena) => (
                Some(arena.links_resolve(entry.id)),
                Some(arena.find_cycle(entry.id).is_none()),
                Some(arena.live()),
            ),
            None => (None, None, None),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Captured {
                logging_id: entry.logging_id,
                id: entry.id,
                pos: entry.pos,
                phase: entry.phase,
                column: cell.column,
                level: cell.level,
                cycle: cell.cycle,
                coords: cell.coords.to_vec(),
                payload: cell.payload.clone(),
                links: cell.links,
                links_resolve,
                acyclic,
                overwrite,
                overwrite_sides,
                live,
            });
    }
}
