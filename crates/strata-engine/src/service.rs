//! The addressable-object service and its in-process implementation.
//!
//! The orchestrator and the refinement engine never touch nodes
//! directly. They create nodes through an [`ObjectService`], drive them
//! with [`NodeOp`]s and wait on [`Pending`] replies. [`LocalService`]
//! runs every node as a thread in this process; a remote implementation
//! would forward the same operations over its own transport.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Select, Sender};
use indexmap::IndexMap;
use strata_arena::{ArenaConfig, CellArena};
use strata_core::{CellId, EngineError, NodeId};

use crate::node::{NodeExit, NodeSetup, StencilNode};
use crate::port::OutPort;

// ── Pending ────────────────────────────────────────────────────────

/// Handle to the eventual result of an invoked operation.
#[derive(Debug)]
pub struct Pending<T> {
    rx: Receiver<Result<T, EngineError>>,
}

impl<T> Pending<T> {
    /// A pending result and the sender that completes it.
    pub fn channel() -> (Sender<Result<T, EngineError>>, Self) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (tx, Self { rx })
    }

    /// An already-completed result.
    pub fn ready(value: Result<T, EngineError>) -> Self {
        let (tx, pending) = Self::channel();
        // Cannot fail: the receiver is alive and the channel is empty.
        let _ = tx.send(value);
        pending
    }

    /// Block until the result arrives.
    ///
    /// A sender dropped without replying (its thread unwound) reads as
    /// [`EngineError::Aborted`].
    pub fn get(self) -> Result<T, EngineError> {
        self.rx.recv().unwrap_or(Err(EngineError::Aborted))
    }

    /// Block until the result arrives or `deadline` passes. `budget` is
    /// the total wait reported on timeout.
    pub fn get_until(self, deadline: Instant, budget: Duration) -> Result<T, EngineError> {
        let left = deadline.saturating_duration_since(Instant::now());
        match self.rx.recv_timeout(left) {
            Ok(value) => value,
            Err(RecvTimeoutError::Timeout) => Err(EngineError::Timeout { waited: budget }),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::Aborted),
        }
    }
}

/// A batch of pending results, taken in completion order.
#[derive(Debug)]
pub struct PendingSet<T> {
    slots: Vec<Option<Receiver<Result<T, EngineError>>>>,
}

impl<T> PendingSet<T> {
    /// Collect `pending` into a set; indices follow iteration order.
    pub fn new(pending: impl IntoIterator<Item = Pending<T>>) -> Self {
        Self {
            slots: pending.into_iter().map(|p| Some(p.rx)).collect(),
        }
    }

    /// Results not yet taken.
    pub fn remaining(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Block until any result arrives and return it with its index.
    ///
    /// Returns `None` once every result has been taken. With a deadline,
    /// returns [`EngineError::Timeout`] (taking nothing) once it passes.
    pub fn next_ready(
        &mut self,
        deadline: Option<(Instant, Duration)>,
    ) -> Option<Result<(usize, T), EngineError>> {
        let live: Vec<usize> = (0..self.slots.len())
            .filter(|&i| self.slots[i].is_some())
            .collect();
        if live.is_empty() {
            return None;
        }
        let (slot, result) = {
            let mut select = Select::new();
            for rx in self.slots.iter().flatten() {
                select.recv(rx);
            }
            let op = match deadline {
                None => select.select(),
                Some((at, budget)) => match select.select_deadline(at) {
                    Ok(op) => op,
                    Err(_) => return Some(Err(EngineError::Timeout { waited: budget })),
                },
            };
            let slot = live[op.index()];
            let result = match &self.slots[slot] {
                Some(rx) => op.recv(rx).unwrap_or(Err(EngineError::Aborted)),
                None => Err(EngineError::Aborted),
            };
            (slot, result)
        };
        self.slots[slot] = None;
        Some(result.map(|value| (slot, value)))
    }
}

// ── Operations ─────────────────────────────────────────────────────

/// An operation on a remote stencil node.
pub enum NodeOp {
    /// Give the node its position, wiring and run environment.
    Configure(Box<NodeSetup>),
    /// Ask for handles to the node's output ports.
    OutputPorts,
    /// Bind input ports: `(input index, producer port)`.
    Connect(Vec<(usize, OutPort)>),
    /// Start the control loop once every input is bound.
    Start,
    /// Seed the node with an initial cell and make it the driving node
    /// for its column; replies with the terminal cell.
    Call(CellId),
    /// Join the node's control loop.
    Finish,
}

impl std::fmt::Debug for NodeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configure(setup) => f.debug_tuple("Configure").field(&setup.pos).finish(),
            Self::OutputPorts => f.write_str("OutputPorts"),
            Self::Connect(ports) => f.debug_tuple("Connect").field(&ports.len()).finish(),
            Self::Start => f.write_str("Start"),
            Self::Call(id) => f.debug_tuple("Call").field(id).finish(),
            Self::Finish => f.write_str("Finish"),
        }
    }
}

/// Reply to a [`NodeOp`].
#[derive(Debug)]
pub enum NodeReply {
    /// The operation completed.
    Done,
    /// Output port handles, in port order.
    Ports(Vec<OutPort>),
    /// The driving node's terminal cell.
    Cell(CellId),
    /// The node's control loop has exited.
    Exit(NodeExit),
}

impl NodeReply {
    fn unexpected(self, wanted: &str) -> EngineError {
        EngineError::invalid(format!("expected {wanted} reply, got {self:?}"))
    }

    /// The ports of a [`NodeReply::Ports`].
    pub fn into_ports(self) -> Result<Vec<OutPort>, EngineError> {
        match self {
            Self::Ports(ports) => Ok(ports),
            other => Err(other.unexpected("ports")),
        }
    }

    /// The cell of a [`NodeReply::Cell`].
    pub fn into_cell(self) -> Result<CellId, EngineError> {
        match self {
            Self::Cell(id) => Ok(id),
            other => Err(other.unexpected("cell")),
        }
    }

    /// The exit record of a [`NodeReply::Exit`].
    pub fn into_exit(self) -> Result<NodeExit, EngineError> {
        match self {
            Self::Exit(exit) => Ok(exit),
            other => Err(other.unexpected("exit")),
        }
    }
}

// ── ObjectService ──────────────────────────────────────────────────

/// Creates, addresses and destroys stencil nodes.
///
/// Cells live in the service's [`CellArena`]; nodes are created in
/// batches and driven through [`invoke`](ObjectService::invoke).
pub trait ObjectService: Send + Sync {
    /// Storage for every cell of the run.
    fn arena(&self) -> &Arc<CellArena>;

    /// Create `count` unconfigured nodes.
    fn create_nodes(&self, count: usize) -> Result<Vec<NodeId>, EngineError>;

    /// Forget a node. Unknown ids are an [`EngineError::InvalidReference`].
    fn destroy(&self, id: NodeId) -> Result<(), EngineError>;

    /// Run `op` on node `id`.
    fn invoke(&self, id: NodeId, op: NodeOp) -> Pending<NodeReply>;
}

/// An [`ObjectService`] running every node as a thread of this process.
pub struct LocalService {
    arena: Arc<CellArena>,
    nodes: Mutex<IndexMap<NodeId, Arc<StencilNode>>>,
    next_id: AtomicU64,
}

impl LocalService {
    /// A service with a fresh arena.
    pub fn new(arena: ArenaConfig) -> Self {
        Self::with_arena(Arc::new(CellArena::new(arena)))
    }

    /// A service over an existing arena.
    pub fn with_arena(arena: Arc<CellArena>) -> Self {
        Self {
            arena,
            nodes: Mutex::new(IndexMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Nodes created and not yet destroyed.
    pub fn live_nodes(&self) -> usize {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn node(&self, id: NodeId) -> Result<Arc<StencilNode>, EngineError> {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::invalid(format!("{id}")))
    }
}

impl ObjectService for LocalService {
    fn arena(&self) -> &Arc<CellArena> {
        &self.arena
    }

    fn create_nodes(&self, count: usize) -> Result<Vec<NodeId>, EngineError> {
        let first = self.next_id.fetch_add(count as u64, Ordering::Relaxed);
        let ids: Vec<NodeId> = (first..first + count as u64).map(NodeId).collect();
        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        for &id in &ids {
            nodes.insert(id, Arc::new(StencilNode::new(id)));
        }
        Ok(ids)
    }

    fn destroy(&self, id: NodeId) -> Result<(), EngineError> {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .swap_remove(&id)
            .map(|_| ())
            .ok_or_else(|| EngineError::invalid(format!("{id}")))
    }

    fn invoke(&self, id: NodeId, op: NodeOp) -> Pending<NodeReply> {
        let node = match self.node(id) {
            Ok(node) => node,
            Err(e) => return Pending::ready(Err(e)),
        };
        match op {
            NodeOp::Configure(setup) => {
                Pending::ready(node.configure(*setup).map(|()| NodeReply::Done))
            }
            NodeOp::OutputPorts => Pending::ready(node.output_ports().map(NodeReply::Ports)),
            NodeOp::Connect(ports) => Pending::ready(node.connect(ports).map(|()| NodeReply::Done)),
            NodeOp::Start => Pending::ready(node.start().map(|()| NodeReply::Done)),
            NodeOp::Call(initial) => match node.call(initial) {
                Ok(pending) => pending,
                Err(e) => Pending::ready(Err(e)),
            },
            NodeOp::Finish => Pending::ready(node.finish().map(NodeReply::Exit)),
        }
    }
}

impl std::fmt::Debug for LocalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalService")
            .field("arena", &self.arena)
            .field("live_nodes", &self.live_nodes())
            .finish()
    }
}

const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<LocalService>();
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_pending_resolves() {
        assert_eq!(Pending::ready(Ok(5)).get(), Ok(5));
    }

    #[test]
    fn dropped_sender_reads_as_aborted() {
        let (tx, pending) = Pending::<u32>::channel();
        drop(tx);
        assert_eq!(pending.get(), Err(EngineError::Aborted));
    }

    #[test]
    fn get_until_times_out() {
        let (_tx, pending) = Pending::<u32>::channel();
        let budget = Duration::from_millis(10);
        let out = pending.get_until(Instant::now() + budget, budget);
        assert_eq!(out, Err(EngineError::Timeout { waited: budget }));
    }

    #[test]
    fn pending_set_yields_in_completion_order() {
        let (tx0, p0) = Pending::<u32>::channel();
        let (tx1, p1) = Pending::<u32>::channel();
        let mut set = PendingSet::new([p0, p1]);
        tx1.send(Ok(11)).unwrap();
        assert_eq!(set.next_ready(None), Some(Ok((1, 11))));
        tx0.send(Err(EngineError::Aborted)).unwrap();
        assert_eq!(set.next_ready(None), Some(Err(EngineError::Aborted)));
        assert_eq!(set.remaining(), 0);
        assert_eq!(set.next_ready(None), None);
    }

    #[test]
    fn pending_set_times_out_without_taking() {
        let (_tx, p) = Pending::<u32>::channel();
        let mut set = PendingSet::new([p]);
        let budget = Duration::from_millis(5);
        let out = set.next_ready(Some((Instant::now() + budget, budget)));
        assert_eq!(out, Some(Err(EngineError::Timeout { waited: budget })));
        assert_eq!(set.remaining(), 1);
    }

    #[test]
    fn create_and_destroy_nodes() {
        let service = LocalService::new(ArenaConfig::with_max_cells(8));
        let ids = service.create_nodes(3).unwrap();
        assert_eq!(ids, vec![NodeId(0), NodeId(1), NodeId(2)]);
        assert_eq!(service.live_nodes(), 3);
        service.destroy(NodeId(1)).unwrap();
        assert_eq!(service.live_nodes(), 2);
        match service.destroy(NodeId(1)) {
            Err(EngineError::InvalidReference { .. }) => {}
            other => panic!("expected InvalidReference, got {other:?}"),
        }
        let more = service.create_nodes(1).unwrap();
        assert_eq!(more, vec![NodeId(3)]);
    }

    #[test]
    fn invoking_unknown_node_fails() {
        let service = LocalService::new(ArenaConfig::with_max_cells(8));
        match service.invoke(NodeId(42), NodeOp::Start).get() {
            Err(EngineError::InvalidReference { .. }) => {}
            other => panic!("expected InvalidReference, got {other:?}"),
        }
    }

    #[test]
    fn unconfigured_node_rejects_ports_request() {
        let service = LocalService::new(ArenaConfig::with_max_cells(8));
        let id = service.create_nodes(1).unwrap()[0];
        match service.invoke(id, NodeOp::OutputPorts).get() {
            Err(EngineError::Configuration { .. }) => {}
            other => panic!("expected Configuration, got {other:?}"),
        }
    }
}
