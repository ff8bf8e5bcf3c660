//! Stencil nodes and their control loop.
//!
//! A node owns one grid position of one mesh. It is configured with its
//! wiring, has its input ports bound by `connect`, and runs its control
//! loop on a dedicated thread once it has been started (or called) and
//! every input is bound:
//!
//! ```text
//! Created ──configure/connect──▶ PortsBound ──start/call──▶ Running
//!                                                            │
//!                               Terminated ◀── Draining ◀────┘
//! ```
//!
//! Each iteration pulls every predecessor, evaluates the kernel into a
//! private working cell, refines if asked to, waits for the previous
//! value to be consumed and then publishes. The kernel's step-remaining
//! signal ends the loop.
//!
//! Fine cells spliced in at one publish stay alive until two publishes
//! later. By then every consumer has taken the value published in
//! between, so none is still searching through the older one.

use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use indexmap::IndexMap;
use strata_core::{Cell, CellId, EngineError, GridPos, KernelError, NodeId};
use strata_kernel::{AllocRequest, EvalContext};
use strata_topology::{NodeWiring, WiringPlan};

use crate::env::RunEnv;
use crate::log::LogPhase;
use crate::port::{InPort, OutPort, Published, Publisher};
use crate::refine;
use crate::service::{NodeReply, Pending};

/// Lifecycle of a [`StencilNode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Created, not yet fully connected.
    Created,
    /// Every input port is bound.
    PortsBound,
    /// The control loop is running.
    Running,
    /// The control loop has stopped and is releasing cells.
    Draining,
    /// The control loop has exited.
    Terminated,
}

/// Everything a node needs to run, supplied by the orchestrator.
#[derive(Clone, Debug)]
pub struct NodeSetup {
    /// Shared run environment.
    pub env: RunEnv,
    /// Position of the node in its mesh.
    pub pos: GridPos,
    /// Input and output wiring.
    pub wiring: NodeWiring,
    /// Evaluations before the mesh stops.
    pub num_steps: u32,
    /// Refinement level of the mesh.
    pub level: u32,
    /// Columns in the node's row.
    pub columns: usize,
}

/// What a node's control loop leaves behind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeExit {
    /// Fine cells still kept alive as cross-reference targets of the
    /// node's last two values.
    pub retained: Vec<CellId>,
    /// Values published by the control loop.
    pub steps: u32,
}

type Reply = Sender<Result<NodeReply, EngineError>>;

struct NodeInner {
    setup: Option<NodeSetup>,
    publisher: Option<Arc<Publisher>>,
    inputs: Vec<InPort>,
    start_requested: bool,
    driving: Option<(Reply, CellId)>,
    handle: Option<JoinHandle<Result<NodeExit, EngineError>>>,
}

/// One (row, column) computation unit.
pub struct StencilNode {
    id: NodeId,
    state: Arc<Mutex<NodeState>>,
    inner: Mutex<NodeInner>,
}

fn set_state(state: &Mutex<NodeState>, to: NodeState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = to;
}

impl StencilNode {
    /// An unconfigured node.
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            state: Arc::new(Mutex::new(NodeState::Created)),
            inner: Mutex::new(NodeInner {
                setup: None,
                publisher: None,
                inputs: Vec::new(),
                start_requested: false,
                driving: None,
                handle: None,
            }),
        }
    }

    /// The node's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> NodeState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NodeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install the node's setup and size its ports.
    pub fn configure(&self, setup: NodeSetup) -> Result<(), EngineError> {
        let mut inner = self.lock();
        if inner.setup.is_some() {
            return Err(EngineError::config(format!("{} configured twice", self.id)));
        }
        if setup.wiring.anchor.is_none() {
            return Err(EngineError::config(format!(
                "node {} has no input from its own column",
                setup.pos
            )));
        }
        let signal = Arc::clone(setup.env.signal());
        inner.publisher = Some(Arc::new(Publisher::new(
            setup.pos,
            setup.wiring.out_degree(),
            signal,
        )));
        inner.inputs = (0..setup.wiring.in_degree()).map(InPort::new).collect();
        inner.setup = Some(setup);
        Ok(())
    }

    /// Handles to the node's output ports.
    pub fn output_ports(&self) -> Result<Vec<OutPort>, EngineError> {
        self.lock()
            .publisher
            .as_ref()
            .map(Publisher::ports)
            .ok_or_else(|| EngineError::config(format!("{} is not configured", self.id)))
    }

    /// Bind input ports and launch the loop if that completes the wiring
    /// of a started node.
    pub fn connect(&self, ports: Vec<(usize, OutPort)>) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let setup = inner
            .setup
            .as_ref()
            .ok_or_else(|| EngineError::config(format!("{} is not configured", self.id)))?;
        let pos = setup.pos;
        let expected = setup.wiring.inputs.clone();
        for (index, port) in ports {
            let Some(src) = expected.get(index) else {
                return Err(EngineError::config(format!(
                    "{pos} has no input port {index}"
                )));
            };
            let found = port.source();
            if (found.row, found.column, port.index()) != (src.row, src.column, src.port) {
                return Err(EngineError::config(format!(
                    "{pos} input {index} expects ({},{}) port {}, got {found} port {}",
                    src.row,
                    src.column,
                    src.port,
                    port.index()
                )));
            }
            let input = inner
                .inputs
                .get_mut(index)
                .ok_or_else(|| EngineError::config(format!("{pos} has no input port {index}")))?;
            input.bind(port)?;
        }
        if inner.inputs.iter().all(InPort::is_bound) && self.state() == NodeState::Created {
            set_state(&self.state, NodeState::PortsBound);
        }
        self.try_launch(&mut inner)
    }

    /// Request the control loop. Starting twice is a no-op.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.start_requested = true;
        self.try_launch(&mut inner)
    }

    /// Make this node the driving node for its column: publish a copy of
    /// `initial` as its first value, start the loop and return a handle
    /// to the terminal cell.
    ///
    /// The caller keeps ownership of `initial`.
    pub fn call(&self, initial: CellId) -> Result<Pending<NodeReply>, EngineError> {
        let mut inner = self.lock();
        let setup = inner
            .setup
            .as_ref()
            .ok_or_else(|| EngineError::config(format!("{} is not configured", self.id)))?;
        if let Some(index) = inner.inputs.iter().position(|p| !p.is_bound()) {
            return Err(EngineError::config(format!(
                "{} called with input port {index} unbound",
                setup.pos
            )));
        }
        if self.state() != NodeState::PortsBound {
            return Err(EngineError::config(format!(
                "{} called while {:?}",
                setup.pos,
                self.state()
            )));
        }
        let publisher = inner
            .publisher
            .clone()
            .ok_or_else(|| EngineError::config(format!("{} is not configured", self.id)))?;

        let env = &setup.env;
        let arena = env.arena();
        let seed = arena
            .get(initial)
            .map_err(|_| EngineError::invalid(format!("initial {initial} for {}", setup.pos)))?;
        let request = AllocRequest {
            column: setup.pos.column,
            columns: setup.columns,
            row: setup.pos.row,
            level: setup.level,
            coords: &seed.coords,
            grid: env.grid(),
            seed: false,
        };
        let own = env.kernel.alloc(arena, &request).map_err(|e| env.kernel_failure(e))?;
        let snapshot = match arena
            .publish(own, Cell::clone(&seed))
            .map_err(EngineError::from)
            .and_then(|snapshot| publisher.wait_drained().map(|()| snapshot))
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let _ = arena.free(own);
                return Err(e);
            }
        };
        publisher.publish(Published {
            id: own,
            cell: snapshot,
        });

        let (reply, pending) = Pending::channel();
        inner.driving = Some((reply, own));
        inner.start_requested = true;
        self.try_launch(&mut inner)?;
        Ok(pending)
    }

    /// Wait for the control loop to exit.
    ///
    /// A node that never launched exits immediately with nothing retained.
    pub fn finish(&self) -> Result<NodeExit, EngineError> {
        let (handle, kernel) = {
            let mut inner = self.lock();
            let kernel = inner
                .setup
                .as_ref()
                .map(|s| s.env.kernel.name().to_string())
                .unwrap_or_default();
            (inner.handle.take(), kernel)
        };
        match handle {
            None => Ok(NodeExit::default()),
            Some(handle) => handle.join().unwrap_or_else(|_| {
                Err(EngineError::KernelFailure {
                    kernel,
                    reason: KernelError::ExecutionFailed {
                        reason: format!("{} panicked", self.id),
                    },
                })
            }),
        }
    }

    fn try_launch(&self, inner: &mut NodeInner) -> Result<(), EngineError> {
        if !inner.start_requested || self.state() != NodeState::PortsBound {
            return Ok(());
        }
        let (Some(setup), Some(publisher)) = (inner.setup.clone(), inner.publisher.clone()) else {
            return Ok(());
        };
        let (reply, current) = match inner.driving.take() {
            Some((reply, id)) => (Some(reply), Some(id)),
            None => (None, None),
        };
        let pos = setup.pos;
        let level = setup.level;
        let metrics = Arc::clone(&setup.env.metrics);
        let task = NodeTask {
            inputs: mem::take(&mut inner.inputs),
            publisher,
            reply,
            state: Arc::clone(&self.state),
            current,
            working: None,
            held: VecDeque::new(),
            plans: IndexMap::new(),
            steps: 0,
            setup,
        };
        let handle = thread::Builder::new()
            .name(format!("strata-node-{}-{}-L{level}", pos.row, pos.column))
            .spawn(move || task.run())
            .map_err(|e| EngineError::config(format!("thread spawn failed for {pos}: {e}")))?;
        set_state(&self.state, NodeState::Running);
        metrics.node_launched();
        tracing::debug!(node = %self.id, %pos, level, "node launched");
        inner.handle = Some(handle);
        Ok(())
    }
}

impl std::fmt::Debug for StencilNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StencilNode")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

// ── Control loop ───────────────────────────────────────────────────

/// Trips the run's signal if a node thread unwinds, so its neighbours
/// do not wait on it forever.
struct TripOnPanic {
    env: RunEnv,
    pos: GridPos,
}

impl Drop for TripOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            let e = self.env.kernel_failure(KernelError::ExecutionFailed {
                reason: format!("node {} panicked", self.pos),
            });
            self.env.signal.trip(e);
        }
    }
}

struct NodeTask {
    setup: NodeSetup,
    inputs: Vec<InPort>,
    publisher: Arc<Publisher>,
    reply: Option<Reply>,
    state: Arc<Mutex<NodeState>>,
    current: Option<CellId>,
    working: Option<CellId>,
    /// Fine cells spliced in at each of the latest publishes, oldest first.
    held: VecDeque<Vec<CellId>>,
    plans: IndexMap<usize, Arc<WiringPlan>>,
    steps: u32,
}

impl NodeTask {
    fn run(mut self) -> Result<NodeExit, EngineError> {
        let env = self.setup.env.clone();
        let _guard = TripOnPanic {
            env: env.clone(),
            pos: self.setup.pos,
        };
        let outcome = self.step_until_done(&env);
        set_state(&self.state, NodeState::Draining);

        let arena = env.arena();
        if let Some(id) = self.working.take() {
            let _ = arena.free(id);
        }
        let result = match outcome {
            Ok(()) => {
                match (self.reply.take(), self.current.take()) {
                    (Some(reply), Some(id)) => {
                        if reply.send(Ok(NodeReply::Cell(id))).is_err() {
                            let _ = arena.free(id);
                        }
                    }
                    (None, Some(id)) => {
                        let _ = arena.free(id);
                    }
                    (_, None) => {}
                }
                tracing::debug!(pos = %self.setup.pos, steps = self.steps, "node finished");
                Ok(NodeExit {
                    retained: self.held.drain(..).flatten().collect(),
                    steps: self.steps,
                })
            }
            Err(e) => {
                env.signal.trip(e.clone());
                if !e.is_secondary() {
                    tracing::warn!(pos = %self.setup.pos, error = %e, "node failed");
                }
                if let Some(reply) = self.reply.take() {
                    let _ = reply.send(Err(e.clone()));
                }
                if let Some(id) = self.current.take() {
                    let _ = arena.free(id);
                }
                arena.free_all(self.held.drain(..).flatten());
                Err(e)
            }
        };
        set_state(&self.state, NodeState::Terminated);
        result
    }

    fn step_until_done(&mut self, env: &RunEnv) -> Result<(), EngineError> {
        let arena = env.arena();
        let ctx = EvalContext {
            pos: self.setup.pos,
            anchor: self.setup.wiring.anchor,
            num_steps: self.setup.num_steps,
            level: self.setup.level,
            width: env.config.stencil_width,
            stages: env.kernel.stages(),
            grid: env.grid(),
        };
        loop {
            let working = match self.working {
                Some(id) => id,
                None => {
                    let id = self.alloc_working(env)?;
                    self.working = Some(id);
                    id
                }
            };

            let pending = self
                .inputs
                .iter()
                .map(InPort::acquire)
                .collect::<Result<Vec<_>, _>>()?;
            let preds = pending
                .into_iter()
                .map(|a| a.resolve().map(|p| p.cell))
                .collect::<Result<Vec<_>, _>>()?;

            let mut next = Cell::clone(&*arena.get(working)?);
            let remaining = env
                .kernel
                .eval(&mut next, &preds, &ctx)
                .map_err(|e| env.kernel_failure(e))?;
            env.metrics.evaluated();

            let anchor = ctx.anchor_cell(&preds).map_err(|e| env.kernel_failure(e))?;
            next.refine =
                next.cycle > anchor.cycle && next.iter == 0 && env.kernel.refine(&next, &ctx);
            let mut phase = LogPhase::Step;
            let mut spliced = Vec::new();
            if next.refine
                && ctx.level < env.config.max_level
                && ctx.is_full_stencil(&preds)
            {
                refine::refine(env, &mut self.plans, &mut spliced, &mut next, &preds, &ctx)?;
                phase = LogPhase::Refined;
            }
            self.held.push_back(spliced);

            self.publisher.wait_drained()?;
            let snapshot = arena.publish(working, next)?;
            env.log(working, &snapshot, self.setup.pos, phase);
            self.publisher.publish(Published {
                id: working,
                cell: snapshot,
            });
            self.working = self.current.replace(working);
            self.steps += 1;
            self.release_stale(env);

            if remaining <= 0 {
                return Ok(());
            }
        }
    }

    /// Free the fine cells spliced in before the previous publish. Every
    /// consumer drained the value published since, so no point search
    /// can still start from the cell that referenced them.
    fn release_stale(&mut self, env: &RunEnv) {
        while self.held.len() > 2 {
            let Some(stale) = self.held.pop_front() else {
                break;
            };
            if stale.is_empty() {
                continue;
            }
            let freed = env.arena().free_all(stale);
            env.metrics.released(freed);
            tracing::trace!(pos = %self.setup.pos, freed, "released fine cells");
        }
    }

    fn alloc_working(&self, env: &RunEnv) -> Result<CellId, EngineError> {
        let request = AllocRequest {
            column: self.setup.pos.column,
            columns: self.setup.columns,
            row: self.setup.pos.row,
            level: self.setup.level,
            coords: &[],
            grid: env.grid(),
            seed: false,
        };
        env.kernel
            .alloc(env.arena(), &request)
            .map_err(|e| env.kernel_failure(e))
    }
}
