//! State shared by every node of one run, child meshes included.

use std::sync::Arc;

use strata_arena::CellArena;
use strata_core::{Cell, CellId, EngineError, GridPos, KernelError, LoggingId};
use strata_kernel::{GridParams, Kernel};

use crate::config::MeshConfig;
use crate::log::{on_stride, LogEntry, LogPhase, LogSink};
use crate::metrics::MeshMetrics;
use crate::service::ObjectService;
use crate::signal::MeshSignal;

/// Collaborators and shared state of one run.
///
/// Cloning is cheap; every field is reference counted. A child mesh
/// spawned by refinement runs with a clone of its parent's environment,
/// so one abort signal and one set of counters span the whole run.
#[derive(Clone)]
pub struct RunEnv {
    pub(crate) kernel: Arc<dyn Kernel>,
    pub(crate) service: Arc<dyn ObjectService>,
    pub(crate) config: Arc<MeshConfig>,
    pub(crate) grid: Arc<GridParams>,
    pub(crate) signal: Arc<MeshSignal>,
    pub(crate) log: Option<Arc<dyn LogSink>>,
    pub(crate) logging_id: Option<LoggingId>,
    pub(crate) metrics: Arc<MeshMetrics>,
}

impl RunEnv {
    /// The arena behind the object service.
    pub fn arena(&self) -> &Arc<CellArena> {
        self.service.arena()
    }

    /// The run's abort signal.
    pub fn signal(&self) -> &Arc<MeshSignal> {
        &self.signal
    }

    /// Grid parameters of the run.
    pub fn grid(&self) -> &GridParams {
        &self.grid
    }

    /// Wrap a kernel error with the kernel's name.
    pub(crate) fn kernel_failure(&self, reason: KernelError) -> EngineError {
        EngineError::KernelFailure {
            kernel: self.kernel.name().to_string(),
            reason,
        }
    }

    /// Send `cell` to the log sink, if there is one.
    pub(crate) fn log(&self, id: CellId, cell: &Cell, pos: GridPos, phase: LogPhase) {
        let Some(sink) = &self.log else {
            return;
        };
        if phase == LogPhase::Step && !on_stride(cell.cycle, self.config.log_stride) {
            return;
        }
        sink.log_entry(&LogEntry {
            logging_id: self.logging_id,
            id,
            cell,
            pos,
            phase,
            grid: &self.grid,
        });
    }
}

impl std::fmt::Debug for RunEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunEnv")
            .field("kernel", &self.kernel.name())
            .field("signal", &self.signal)
            .field("logging", &self.log.is_some())
            .finish()
    }
}

#[cfg(test)]
impl RunEnv {
    /// A fresh environment over a private [`LocalService`](crate::LocalService),
    /// for unit tests that drive nodes or the refinement engine directly.
    pub(crate) fn local(kernel: Arc<dyn Kernel>, config: MeshConfig, num_points: usize) -> Self {
        let service = Arc::new(crate::service::LocalService::new(config.arena.clone()));
        Self {
            kernel,
            service,
            grid: Arc::new(config.grid.clone().with_points(num_points)),
            config: Arc::new(config),
            signal: Arc::new(MeshSignal::new()),
            log: None,
            logging_id: None,
            metrics: Arc::new(MeshMetrics::default()),
        }
    }
}
