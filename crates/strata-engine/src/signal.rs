//! Counting semaphores and the mesh-wide abort signal.
//!
//! Every blocking wait in the engine races a semaphore against the abort
//! channel, so one failing node unwinds every thread of the run,
//! including nodes of child meshes spawned by refinement.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use strata_core::EngineError;

/// Shared abort state for one run.
///
/// Tripping drops the only sender of the abort channel, which wakes
/// every waiter at once. The first error recorded is kept as the root
/// cause; later trips (usually [`EngineError::Aborted`] from threads
/// that were woken) do not replace it.
pub struct MeshSignal {
    abort_rx: Receiver<()>,
    abort_tx: Mutex<Option<Sender<()>>>,
    tripped: AtomicBool,
    first_error: Mutex<Option<EngineError>>,
}

impl MeshSignal {
    /// A signal that has not been tripped.
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            abort_rx: rx,
            abort_tx: Mutex::new(Some(tx)),
            tripped: AtomicBool::new(false),
            first_error: Mutex::new(None),
        }
    }

    /// Record `err` and wake every waiter.
    pub fn trip(&self, err: EngineError) {
        {
            let mut first = self
                .first_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let replace = match &*first {
                None => true,
                Some(existing) => existing.is_secondary() && !err.is_secondary(),
            };
            if replace {
                *first = Some(err);
            }
        }
        self.tripped.store(true, Ordering::SeqCst);
        self.abort_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Whether the run has been aborted.
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// The root-cause error, if the signal was tripped.
    pub fn first_error(&self) -> Option<EngineError> {
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `err`, unless an earlier root cause is on record.
    pub fn root_cause(&self, err: EngineError) -> EngineError {
        match self.first_error() {
            Some(first) if !first.is_secondary() => first,
            _ => err,
        }
    }

    pub(crate) fn abort_rx(&self) -> &Receiver<()> {
        &self.abort_rx
    }
}

impl Default for MeshSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MeshSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshSignal")
            .field("tripped", &self.is_tripped())
            .field("first_error", &self.first_error())
            .finish()
    }
}

/// A counting semaphore built on an unbounded channel of permits.
pub(crate) struct Semaphore {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Semaphore {
    /// A semaphore holding `permits` permits.
    pub(crate) fn new(permits: usize) -> Self {
        let (tx, rx) = unbounded();
        for _ in 0..permits {
            let _ = tx.send(());
        }
        Self { tx, rx }
    }

    /// Release one permit.
    pub(crate) fn signal(&self) {
        // Cannot fail: `self` holds the receiver.
        let _ = self.tx.send(());
    }

    /// Take one permit, blocking until one is available or the run is
    /// aborted.
    pub(crate) fn wait(&self, signal: &MeshSignal) -> Result<(), EngineError> {
        if signal.is_tripped() {
            return Err(EngineError::Aborted);
        }
        select! {
            recv(self.rx) -> permit => permit.map_err(|_| EngineError::Aborted),
            recv(signal.abort_rx()) -> _ => Err(EngineError::Aborted),
        }
    }

    /// Permits currently available.
    pub(crate) fn available(&self) -> usize {
        self.rx.len()
    }
}

const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<MeshSignal>();
    assert::<Semaphore>();
};
