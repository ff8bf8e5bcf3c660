//! The mesh orchestrator.
//!
//! [`Mesh`] is the entry point: it builds the wiring plan for a run,
//! creates one node per (row, column) through the object service, wires
//! them, seeds row 0 with the initial cells and harvests one result per
//! column. [`MeshRun`] is the reusable core; the refinement engine runs
//! child meshes through it with the parent's environment.
//!
//! # Run sequence
//!
//! ```text
//! create_nodes ─▶ Configure ─▶ OutputPorts ─▶ Connect
//!      ─▶ Start (rows ≥ 1) ─▶ Call (row 0) ─▶ harvest ─▶ Finish ─▶ destroy
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexSet;
use strata_arena::CellArena;
use strata_core::{CellId, EngineError, GridPos, LoggingId, NodeId};
use strata_kernel::{AllocRequest, GridParams, Kernel};
use strata_topology::{MeshShape, WiringPlan};

use crate::config::{ConfigError, MeshConfig};
use crate::env::RunEnv;
use crate::log::{LogPhase, LogSink};
use crate::metrics::{MeshMetrics, RunMetrics};
use crate::node::{NodeExit, NodeSetup};
use crate::port::OutPort;
use crate::service::{NodeOp, NodeReply, ObjectService, Pending, PendingSet};
use crate::signal::MeshSignal;

// ── MeshRun ────────────────────────────────────────────────────────

/// What a finished mesh hands back.
#[derive(Debug, Default)]
pub(crate) struct Harvest {
    /// One terminal cell per column of row 0.
    pub(crate) results: Vec<CellId>,
    /// Fine cells nodes kept as cross-reference targets.
    pub(crate) retained: Vec<CellId>,
}

/// One execution of a wiring plan.
pub(crate) struct MeshRun {
    pub(crate) env: RunEnv,
    pub(crate) plan: Arc<WiringPlan>,
    pub(crate) num_steps: u32,
    pub(crate) level: u32,
    pub(crate) timeout: Option<Duration>,
}

/// Destroys the nodes of a run however the run ends.
struct NodeGuard<'a> {
    service: &'a dyn ObjectService,
    ids: Vec<NodeId>,
}

impl Drop for NodeGuard<'_> {
    fn drop(&mut self) {
        for &id in &self.ids {
            let _ = self.service.destroy(id);
        }
    }
}

impl MeshRun {
    /// Run the plan from `initial` (one cell per column of row 0).
    ///
    /// The caller keeps ownership of `initial`. On failure every cell the
    /// run produced has been freed and the error is the run's root cause.
    pub(crate) fn run(&self, initial: &[CellId]) -> Result<Harvest, EngineError> {
        let plan = &self.plan;
        let columns = plan.row_size(0);
        if initial.len() != columns {
            return Err(ConfigError::InitialCountMismatch {
                expected: columns,
                found: initial.len(),
            }
            .into());
        }
        for (column, &id) in initial.iter().enumerate() {
            if let Some(cell) = self.env.arena().resolve(id) {
                self.env.log(id, &cell, GridPos::new(0, column), LogPhase::Initial);
            }
        }

        let service = self.env.service.as_ref();
        let guard = NodeGuard {
            service,
            ids: service.create_nodes(plan.node_count())?,
        };
        let mut offsets = Vec::with_capacity(plan.rows());
        let mut total = 0;
        for row in 0..plan.rows() {
            offsets.push(total);
            total += plan.row_size(row);
        }
        let index = |row: usize, column: usize| offsets[row] + column;

        let outcome = self
            .launch(&guard.ids, &index, initial)
            .and_then(|pending| self.harvest(pending));
        let outcome = match outcome {
            Ok(results) => Ok(results),
            Err(e) => {
                self.env.signal.trip(e.clone());
                Err(e)
            }
        };

        let mut retained = Vec::new();
        let mut finish_error = None;
        for &id in &guard.ids {
            match service.invoke(id, NodeOp::Finish).get().and_then(NodeReply::into_exit) {
                Ok(NodeExit { retained: kept, .. }) => retained.extend(kept),
                Err(e) => {
                    finish_error.get_or_insert(e);
                }
            }
        }
        drop(guard);

        let arena = self.env.arena();
        match (outcome, finish_error) {
            (Ok(results), None) => Ok(Harvest { results, retained }),
            (Ok(results), Some(e)) => {
                arena.free_all(results.into_iter().chain(retained));
                Err(self.env.signal.root_cause(e))
            }
            (Err(e), _) => {
                arena.free_all(retained);
                let cause = self.env.signal.root_cause(e);
                tracing::warn!(level = self.level, error = %cause, "mesh aborted");
                Err(cause)
            }
        }
    }

    fn launch(
        &self,
        ids: &[NodeId],
        index: &dyn Fn(usize, usize) -> usize,
        initial: &[CellId],
    ) -> Result<Vec<Pending<NodeReply>>, EngineError> {
        let service = self.env.service.as_ref();
        let plan = &self.plan;

        for (pos, wiring) in plan.iter() {
            let setup = NodeSetup {
                env: self.env.clone(),
                pos,
                wiring: wiring.clone(),
                num_steps: self.num_steps,
                level: self.level,
                columns: plan.row_size(pos.row),
            };
            let id = ids[index(pos.row, pos.column)];
            service.invoke(id, NodeOp::Configure(Box::new(setup))).get()?;
        }

        let mut ports: Vec<Vec<OutPort>> = Vec::with_capacity(ids.len());
        for &id in ids {
            ports.push(service.invoke(id, NodeOp::OutputPorts).get()?.into_ports()?);
        }

        for (pos, wiring) in plan.iter() {
            let bindings = wiring
                .inputs
                .iter()
                .enumerate()
                .map(|(k, src)| {
                    ports[index(src.row, src.column)]
                        .get(src.port)
                        .cloned()
                        .map(|port| (k, port))
                        .ok_or_else(|| {
                            EngineError::invalid(format!(
                                "output port {} of ({},{})",
                                src.port, src.row, src.column
                            ))
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let id = ids[index(pos.row, pos.column)];
            service.invoke(id, NodeOp::Connect(bindings)).get()?;
        }

        for row in 1..plan.rows() {
            for column in 0..plan.row_size(row) {
                service.invoke(ids[index(row, column)], NodeOp::Start).get()?;
            }
        }

        let mut pending = Vec::with_capacity(initial.len());
        for (column, &cell) in initial.iter().enumerate() {
            pending.push(service.invoke(ids[index(0, column)], NodeOp::Call(cell)));
        }
        Ok(pending)
    }

    fn harvest(&self, pending: Vec<Pending<NodeReply>>) -> Result<Vec<CellId>, EngineError> {
        let arena = self.env.arena();
        let deadline = self.timeout.map(|budget| (Instant::now() + budget, budget));
        let mut results: Vec<Option<CellId>> = vec![None; pending.len()];
        let mut set = PendingSet::new(pending);

        let mut failure = None;
        while let Some(next) = set.next_ready(deadline) {
            match next.and_then(|(column, reply)| reply.into_cell().map(|id| (column, id))) {
                Ok((column, id)) => results[column] = Some(id),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failure {
            self.env.signal.trip(e.clone());
            // Every driving node now replies promptly; free what arrives.
            while let Some(next) = set.next_ready(None) {
                if let Ok((_, NodeReply::Cell(id))) = next {
                    let _ = arena.free(id);
                }
            }
            arena.free_all(results.into_iter().flatten());
            return Err(e);
        }
        Ok(results.into_iter().flatten().collect())
    }
}

// ── Mesh ───────────────────────────────────────────────────────────

/// Result of [`Mesh::init_execute`] or [`Mesh::execute`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshOutcome {
    /// One result cell per column, left to right. Owned by the caller;
    /// release with [`Mesh::release`].
    pub results: Vec<CellId>,
    /// Counters for the run, child meshes included.
    pub metrics: RunMetrics,
}

/// Builds, runs and tears down stencil meshes for one kernel.
///
/// # Examples
///
/// ```ignore
/// let service = Arc::new(LocalService::new(ArenaConfig::default()));
/// let mesh = Mesh::new(service, Arc::new(WaveKernel::default()), MeshConfig::default())?;
/// let outcome = mesh.init_execute(16, 4)?;
/// assert_eq!(outcome.results.len(), 16);
/// mesh.release(&outcome.results);
/// ```
pub struct Mesh {
    service: Arc<dyn ObjectService>,
    kernel: Arc<dyn Kernel>,
    config: Arc<MeshConfig>,
    log: Option<Arc<dyn LogSink>>,
    logging_id: Option<LoggingId>,
}

impl Mesh {
    /// A mesh driver over `service` for `kernel`.
    pub fn new(
        service: Arc<dyn ObjectService>,
        kernel: Arc<dyn Kernel>,
        config: MeshConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            service,
            kernel,
            config: Arc::new(config),
            log: None,
            logging_id: None,
        })
    }

    /// Report cells to `sink`, tagged with `logging_id`.
    pub fn with_log(mut self, sink: Arc<dyn LogSink>, logging_id: Option<LoggingId>) -> Self {
        self.log = Some(sink);
        self.logging_id = logging_id;
        self
    }

    /// The validated configuration.
    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// The arena holding every cell of every run.
    pub fn arena(&self) -> &Arc<CellArena> {
        self.service.arena()
    }

    /// Seed `num_points` points from the kernel's initial data and run
    /// `num_steps` steps.
    pub fn init_execute(
        &self,
        num_points: usize,
        num_steps: u32,
    ) -> Result<MeshOutcome, EngineError> {
        let cells = self.config.cells_for(num_points)?;
        let grid = self.config.grid.clone().with_points(num_points);
        let g = self.config.granularity;
        let arena = self.arena();

        let mut initial = Vec::with_capacity(cells);
        for column in 0..cells {
            let coords: Vec<f64> = (column * g..(column + 1) * g)
                .map(|i| grid.coordinate(i))
                .collect();
            let request = AllocRequest {
                column,
                columns: cells,
                row: 0,
                level: 0,
                coords: &coords,
                grid: &grid,
                seed: true,
            };
            match self.kernel.alloc(arena, &request) {
                Ok(id) => initial.push(id),
                Err(reason) => {
                    arena.free_all(initial);
                    return Err(EngineError::KernelFailure {
                        kernel: self.kernel.name().to_string(),
                        reason,
                    });
                }
            }
        }

        let outcome = self.run(&initial, grid, num_points, num_steps);
        arena.free_all(initial);
        outcome
    }

    /// Run `num_steps` steps from caller-supplied initial cells, one per
    /// column. The caller keeps ownership of `initial`.
    pub fn execute(
        &self,
        initial: &[CellId],
        num_points: usize,
        num_steps: u32,
    ) -> Result<MeshOutcome, EngineError> {
        let cells = self.config.cells_for(num_points)?;
        if initial.len() != cells {
            return Err(ConfigError::InitialCountMismatch {
                expected: cells,
                found: initial.len(),
            }
            .into());
        }
        let grid = self.config.grid.clone().with_points(num_points);
        self.run(initial, grid, num_points, num_steps)
    }

    /// Free `results` and every cell they reference. Returns the number
    /// of cells freed.
    pub fn release(&self, results: &[CellId]) -> usize {
        let arena = self.arena();
        let closure = arena.closure(results.iter().copied());
        arena.free_all(closure)
    }

    fn run(
        &self,
        initial: &[CellId],
        grid: GridParams,
        num_points: usize,
        num_steps: u32,
    ) -> Result<MeshOutcome, EngineError> {
        let span = tracing::info_span!("mesh", points = num_points, steps = num_steps, level = 0);
        let _enter = span.enter();
        let started = Instant::now();

        let kernel_failure = |reason| EngineError::KernelFailure {
            kernel: self.kernel.name().to_string(),
            reason,
        };
        self.kernel
            .init(num_steps, self.logging_id)
            .map_err(kernel_failure)?;

        let arena = self.arena();
        for &id in initial {
            let cell = arena
                .get(id)
                .map_err(|_| EngineError::invalid(format!("initial cell {id}")))?;
            if !cell.is_consistent() || cell.num_eqns() != grid.num_eqns {
                return Err(EngineError::invalid(format!(
                    "initial cell {id}: {} values over {} points, expected {} per point",
                    cell.payload.len(),
                    cell.num_points(),
                    grid.num_eqns
                )));
            }
        }

        let width = self.config.width()?;
        let shape = MeshShape::uniform(self.config.rows_per_level, initial.len(), width)
            .map_err(ConfigError::from)?;
        let plan = Arc::new(WiringPlan::build(&shape).map_err(ConfigError::from)?);

        let env = RunEnv {
            kernel: Arc::clone(&self.kernel),
            service: Arc::clone(&self.service),
            config: Arc::clone(&self.config),
            grid: Arc::new(grid),
            signal: Arc::new(MeshSignal::new()),
            log: self.log.clone(),
            logging_id: self.logging_id,
            metrics: Arc::new(MeshMetrics::default()),
        };

        let harvest = MeshRun {
            env: env.clone(),
            plan,
            num_steps,
            level: 0,
            timeout: self.config.harvest_timeout,
        }
        .run(initial)?;

        let keep: IndexSet<CellId> = arena.closure(harvest.results.iter().copied());
        let freed = arena.free_all(
            harvest
                .retained
                .into_iter()
                .filter(|id| !keep.contains(id)),
        );
        self.log_cells(&env, &harvest.results, LogPhase::Harvest);

        let metrics = env.metrics.snapshot(started.elapsed());
        tracing::info!(
            evaluations = metrics.evaluations,
            refinements = metrics.refinements,
            retained = keep.len().saturating_sub(harvest.results.len()),
            freed,
            "mesh finished"
        );
        Ok(MeshOutcome {
            results: harvest.results,
            metrics,
        })
    }

    fn log_cells(&self, env: &RunEnv, cells: &[CellId], phase: LogPhase) {
        if self.log.is_none() {
            return;
        }
        for (column, &id) in cells.iter().enumerate() {
            if let Some(cell) = env.arena().resolve(id) {
                env.log(id, &cell, GridPos::new(0, column), phase);
            }
        }
    }
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mesh")
            .field("kernel", &self.kernel.name())
            .field("config", &self.config)
            .field("logging", &self.log.is_some())
            .finish()
    }
}

const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Mesh>();
    assert::<RunEnv>();
};

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use strata_core::{Cell, KernelError};
    use strata_kernel::EvalContext;
    use strata_topology::StencilWidth;

    use super::*;
    use crate::log::LogEntry;

    struct Carry;

    impl Kernel for Carry {
        fn name(&self) -> &str {
            "carry"
        }

        fn eval(
            &self,
            result: &mut Cell,
            preds: &[Arc<Cell>],
            ctx: &EvalContext<'_>,
        ) -> Result<i32, KernelError> {
            let anchor = ctx.anchor_cell(preds)?;
            if ctx.is_overdone(anchor) {
                return Ok(ctx.hold(result, anchor));
            }
            ctx.seed_from(result, anchor);
            Ok(ctx.advance(result, anchor))
        }

        fn initial_state(&self, x: f64, _level: u32, _grid: &GridParams, out: &mut [f64]) {
            out.fill(x);
        }
    }

    #[derive(Default)]
    struct Phases(Mutex<Vec<(LogPhase, u32)>>);

    impl LogSink for Phases {
        fn log_entry(&self, entry: &LogEntry<'_>) {
            self.0
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((entry.phase, entry.cell.level));
        }
    }

    fn child_run(env: &RunEnv, columns: usize) -> MeshRun {
        let shape = MeshShape::uniform(3, columns, StencilWidth::new(3).unwrap()).unwrap();
        MeshRun {
            env: env.clone(),
            plan: Arc::new(WiringPlan::build(&shape).unwrap()),
            num_steps: 2,
            level: 1,
            timeout: None,
        }
    }

    fn fine_cells(env: &RunEnv, columns: usize) -> Vec<CellId> {
        (0..columns)
            .map(|c| {
                let cell = Cell::new(c, columns, 1).with_points([c as f64], env.grid().num_eqns);
                env.arena().insert(cell).unwrap()
            })
            .collect()
    }

    #[test]
    fn run_rejects_wrong_initial_count() {
        let env = RunEnv::local(Arc::new(Carry), MeshConfig::default(), 4);
        let initial = fine_cells(&env, 3);
        match child_run(&env, 4).run(&initial) {
            Err(EngineError::Configuration { .. }) => {}
            other => panic!("expected Configuration, got {other:?}"),
        }
        assert_eq!(env.arena().live(), 3);
    }

    #[test]
    fn run_harvests_one_cell_per_column() {
        let env = RunEnv::local(Arc::new(Carry), MeshConfig::default(), 4);
        let initial = fine_cells(&env, 4);
        let harvest = child_run(&env, 4).run(&initial).unwrap();

        assert_eq!(harvest.results.len(), 4);
        assert!(harvest.retained.is_empty());
        for (c, &id) in harvest.results.iter().enumerate() {
            let cell = env.arena().get(id).unwrap();
            assert_eq!((cell.column, cell.level, cell.cycle), (c, 1, 2));
        }
        // Initial cells stay with the caller.
        assert_eq!(env.arena().live(), 8);
        env.arena().free_all(harvest.results.into_iter().chain(initial));
        assert_eq!(env.arena().live(), 0);
    }

    #[test]
    fn child_runs_log_their_initial_cells() {
        let mut env = RunEnv::local(Arc::new(Carry), MeshConfig::default(), 4);
        let phases = Arc::new(Phases::default());
        env.log = Some(phases.clone() as Arc<dyn LogSink>);
        let initial = fine_cells(&env, 4);
        let harvest = child_run(&env, 4).run(&initial).unwrap();

        let seen = phases.0.lock().unwrap().clone();
        let seeds = seen.iter().filter(|&&(p, _)| p == LogPhase::Initial).count();
        assert_eq!(seeds, 4);
        assert!(seen.iter().all(|&(_, level)| level == 1));
        env.arena().free_all(harvest.results.into_iter().chain(initial));
    }
}
