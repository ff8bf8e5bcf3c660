//! Port adapters between adjacent stencil nodes.
//!
//! A producer owns one [`Publisher`] with a pair of semaphores per output
//! port:
//!
//! ```text
//! producer                                   consumer
//!   ready_in[i].wait()   (preset to 1)
//!   slot <- new value
//!   ready_out[i].signal() ───────────────▶  ready_out[i].wait()
//!                                            read slot
//!   ready_in[i].wait()  ◀─────────────────  ready_in[i].signal()
//! ```
//!
//! so a producer is never more than one published step ahead of any of
//! its consumers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use strata_core::{Cell, CellId, EngineError, GridPos};

use crate::signal::{MeshSignal, Semaphore};

/// A value a node has made available to its consumers.
#[derive(Clone, Debug)]
pub struct Published {
    /// Arena handle of the producer's cell.
    pub id: CellId,
    /// Snapshot of the cell as published.
    pub cell: Arc<Cell>,
}

/// The output side of a node.
pub struct Publisher {
    pos: GridPos,
    signal: Arc<MeshSignal>,
    slot: Mutex<Option<Published>>,
    ready_in: Vec<Semaphore>,
    ready_out: Vec<Semaphore>,
    published: AtomicU64,
    consumed: Vec<AtomicU64>,
}

impl Publisher {
    /// A publisher for a node at `pos` with `outputs` output ports.
    pub fn new(pos: GridPos, outputs: usize, signal: Arc<MeshSignal>) -> Self {
        Self {
            pos,
            signal,
            slot: Mutex::new(None),
            ready_in: (0..outputs).map(|_| Semaphore::new(1)).collect(),
            ready_out: (0..outputs).map(|_| Semaphore::new(0)).collect(),
            published: AtomicU64::new(0),
            consumed: (0..outputs).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Position of the producing node.
    pub fn pos(&self) -> GridPos {
        self.pos
    }

    /// Number of output ports.
    pub fn out_degree(&self) -> usize {
        self.ready_out.len()
    }

    /// Handle to output port `index`.
    pub fn port(self: &Arc<Self>, index: usize) -> OutPort {
        OutPort {
            publisher: Arc::clone(self),
            index,
        }
    }

    /// Handles to every output port, in port order.
    pub fn ports(self: &Arc<Self>) -> Vec<OutPort> {
        (0..self.out_degree()).map(|i| self.port(i)).collect()
    }

    /// Block until every consumer has read the previous value.
    pub fn wait_drained(&self) -> Result<(), EngineError> {
        for ready in &self.ready_in {
            ready.wait(&self.signal)?;
        }
        Ok(())
    }

    /// Make `value` current and wake every consumer.
    ///
    /// Must follow a successful [`wait_drained`](Self::wait_drained).
    pub fn publish(&self, value: Published) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
        let steps = self.published.fetch_add(1, Ordering::SeqCst) + 1;
        debug_assert!(
            self.consumed
                .iter()
                .all(|c| steps <= c.load(Ordering::SeqCst) + 1),
            "{} published past an unread value",
            self.pos
        );
        for ready in &self.ready_out {
            ready.signal();
        }
    }

    /// Consumer side of port `index`: wait for a fresh value, take it and
    /// let the producer advance.
    pub fn get(&self, index: usize) -> Result<Published, EngineError> {
        let ready = self.ready_out.get(index).ok_or_else(|| {
            EngineError::invalid(format!("output port {index} of {}", self.pos))
        })?;
        ready.wait(&self.signal)?;
        let value = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| EngineError::invalid(format!("empty slot on {}", self.pos)))?;
        self.consumed[index].fetch_add(1, Ordering::SeqCst);
        self.ready_in[index].signal();
        Ok(value)
    }

    /// Steps published so far.
    pub fn published_steps(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    /// Steps consumed through port `index`.
    pub fn consumed_steps(&self, index: usize) -> u64 {
        self.consumed
            .get(index)
            .map_or(0, |c| c.load(Ordering::SeqCst))
    }

    /// Largest gap between published and consumed steps over all ports.
    pub fn max_lag(&self) -> u64 {
        let published = self.published_steps();
        self.consumed
            .iter()
            .map(|c| published.saturating_sub(c.load(Ordering::SeqCst)))
            .max()
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("pos", &self.pos)
            .field("out_degree", &self.out_degree())
            .field("published", &self.published_steps())
            .finish()
    }
}

/// One output port of a producer, as handed to a consumer.
#[derive(Clone, Debug)]
pub struct OutPort {
    publisher: Arc<Publisher>,
    index: usize,
}

impl OutPort {
    /// Position of the producing node.
    pub fn source(&self) -> GridPos {
        self.publisher.pos()
    }

    /// Port index on the producer.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Blocking pull of the producer's current value.
    pub fn get(&self) -> Result<Published, EngineError> {
        self.publisher.get(self.index)
    }

    /// The producer behind this port.
    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }
}

/// The input side of one port of a node.
#[derive(Debug)]
pub struct InPort {
    index: usize,
    source: Option<OutPort>,
}

impl InPort {
    /// An unbound input port.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            source: None,
        }
    }

    /// Associate this port with a producer's output.
    pub fn bind(&mut self, source: OutPort) -> Result<(), EngineError> {
        if self.source.is_some() {
            return Err(EngineError::AlreadyBound { port: self.index });
        }
        self.source = Some(source);
        Ok(())
    }

    /// Whether [`bind`](Self::bind) has succeeded.
    pub fn is_bound(&self) -> bool {
        self.source.is_some()
    }

    /// Record intent to read. Does not block; the wait happens in
    /// [`Acquired::resolve`].
    pub fn acquire(&self) -> Result<Acquired<'_>, EngineError> {
        self.source
            .as_ref()
            .map(|port| Acquired { port })
            .ok_or_else(|| EngineError::config(format!("input port {} is unbound", self.index)))
    }

    /// The bound producer port.
    pub fn source(&self) -> Option<&OutPort> {
        self.source.as_ref()
    }
}

/// A pending read from an input port.
#[derive(Debug)]
pub struct Acquired<'a> {
    port: &'a OutPort,
}

impl Acquired<'_> {
    /// Block until the producer's value is available and take it.
    pub fn resolve(self) -> Result<Published, EngineError> {
        self.port.get()
    }
}
