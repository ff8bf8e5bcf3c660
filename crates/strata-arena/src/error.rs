//! Arena-specific error types.

use std::error::Error;
use std::fmt;

use strata_core::{CellId, EngineError};

/// Errors that can occur during arena operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The live-cell limit was reached.
    CapacityExceeded {
        /// The configured limit.
        capacity: usize,
    },
    /// The handle's cell was freed (its slot generation moved on).
    StaleHandle {
        /// The offending handle.
        id: CellId,
        /// Current generation of the slot.
        current: u32,
    },
    /// The handle names a slot this arena never issued.
    InvalidHandle {
        /// The offending handle.
        id: CellId,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded { capacity } => {
                write!(f, "arena capacity exceeded: limit is {capacity} live cells")
            }
            Self::StaleHandle { id, current } => {
                write!(f, "stale handle {id}: slot is at generation {current}")
            }
            Self::InvalidHandle { id } => write!(f, "handle {id} was never issued"),
        }
    }
}

impl Error for ArenaError {}

impl From<ArenaError> for EngineError {
    fn from(e: ArenaError) -> Self {
        match e {
            ArenaError::CapacityExceeded { .. } => EngineError::Arena {
                reason: e.to_string(),
            },
            ArenaError::StaleHandle { .. } | ArenaError::InvalidHandle { .. } => {
                EngineError::InvalidReference {
                    what: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handles_become_invalid_references() {
        let err: EngineError = ArenaError::StaleHandle {
            id: CellId::new(4, 1),
            current: 2,
        }
        .into();
        match err {
            EngineError::InvalidReference { what } => assert!(what.contains("cell#4.1")),
            other => panic!("expected InvalidReference, got {other:?}"),
        }
    }

    #[test]
    fn capacity_is_an_arena_error() {
        let err: EngineError = ArenaError::CapacityExceeded { capacity: 8 }.into();
        match err {
            EngineError::Arena { .. } => {}
            other => panic!("expected Arena, got {other:?}"),
        }
    }
}
