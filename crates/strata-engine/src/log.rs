//! The optional logging collaborator.
//!
//! Nodes and the orchestrator report cells to a [`LogSink`] at fixed
//! points of a run. Logging is fire-and-forget: a sink cannot fail a run,
//! and running without one is normal.

use strata_core::{Cell, CellId, GridPos, LoggingId};
use strata_kernel::GridParams;

/// Where in a run an entry was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogPhase {
    /// Initial data of a mesh (base or child), before any node starts.
    Initial,
    /// A node published a new value.
    Step,
    /// A node replaced its value with a refined one.
    Refined,
    /// The orchestrator collected a result.
    Harvest,
}

/// One log record.
#[derive(Clone, Copy, Debug)]
pub struct LogEntry<'a> {
    /// Caller-supplied logging id, if any.
    pub logging_id: Option<LoggingId>,
    /// Arena handle of the cell.
    pub id: CellId,
    /// The cell's state.
    pub cell: &'a Cell,
    /// Node that produced the cell.
    pub pos: GridPos,
    /// Where in the run the entry was produced.
    pub phase: LogPhase,
    /// Grid parameters of the run.
    pub grid: &'a GridParams,
}

/// Receiver of log entries.
pub trait LogSink: Send + Sync {
    /// Record one entry. Must not block for long; nodes call this from
    /// their control loop.
    fn log_entry(&self, entry: &LogEntry<'_>);
}

/// A sink that forwards entries as `tracing` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log_entry(&self, entry: &LogEntry<'_>) {
        let cell = entry.cell;
        tracing::info!(
            target: "strata::log",
            logging_id = entry.logging_id.map(|l| l.0),
            cell = %entry.id,
            row = entry.pos.row,
            column = entry.pos.column,
            phase = ?entry.phase,
            level = cell.level,
            cycle = cell.cycle,
            time = cell.time,
            x = cell.first_coord(),
            refined = cell.links.overwrite.is_some(),
            "cell"
        );
    }
}

/// Whether a `Step` entry for `cycle` passes the stride filter.
pub(crate) fn on_stride(cycle: u32, stride: u32) -> bool {
    stride <= 1 || cycle % stride == 0
}
