//! Error types for the Strata engine.
//!
//! [`EngineError`] is the taxonomy surfaced by mesh construction and
//! execution. Configuration errors and invalid references are fatal and
//! never retried; kernel failures are carried verbatim.

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Errors reported by a numeric kernel.
///
/// The engine does not interpret these; they are wrapped in
/// [`EngineError::KernelFailure`] and handed to the caller unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KernelError {
    /// The kernel's evaluation failed.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// A predecessor or result cell does not have the shape the kernel
    /// expects.
    ShapeMismatch {
        /// Description of the expected shape.
        expected: String,
        /// Description of what was found.
        found: String,
    },
    /// The kernel produced a non-finite value.
    NonFinite {
        /// Column of the offending cell.
        column: usize,
        /// Point index within the cell.
        point: usize,
    },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
            Self::ShapeMismatch { expected, found } => {
                write!(f, "shape mismatch: expected {expected}, found {found}")
            }
            Self::NonFinite { column, point } => {
                write!(f, "non-finite value at column {column}, point {point}")
            }
        }
    }
}

impl Error for KernelError {}

/// Errors from mesh construction, node execution and refinement.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineError {
    /// Invalid stencil width, unbound port, size or granularity mismatch.
    Configuration {
        /// What was misconfigured.
        reason: String,
    },
    /// An identifier expected to be live was stale or never issued.
    InvalidReference {
        /// Description of the identifier.
        what: String,
    },
    /// The kernel reported a failure.
    KernelFailure {
        /// Name of the kernel.
        kernel: String,
        /// The kernel's error, unchanged.
        reason: KernelError,
    },
    /// An input port was bound a second time.
    AlreadyBound {
        /// Index of the input port.
        port: usize,
    },
    /// Another node failed and the mesh was torn down.
    Aborted,
    /// The harvest did not complete within the configured timeout.
    Timeout {
        /// How long the orchestrator waited.
        waited: Duration,
    },
    /// A cell arena operation failed.
    Arena {
        /// Description of the arena failure.
        reason: String,
    },
}

impl EngineError {
    /// Shorthand for [`EngineError::Configuration`].
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`EngineError::InvalidReference`].
    pub fn invalid(what: impl Into<String>) -> Self {
        Self::InvalidReference { what: what.into() }
    }

    /// Whether this error is a consequence of another node's failure
    /// rather than a root cause.
    pub fn is_secondary(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { reason } => write!(f, "configuration error: {reason}"),
            Self::InvalidReference { what } => write!(f, "invalid reference: {what}"),
            Self::KernelFailure { kernel, reason } => {
                write!(f, "kernel '{kernel}' failed: {reason}")
            }
            Self::AlreadyBound { port } => write!(f, "input port {port} is already bound"),
            Self::Aborted => write!(f, "mesh aborted after a node failure"),
            Self::Timeout { waited } => {
                write!(f, "harvest timed out after {} ms", waited.as_millis())
            }
            Self::Arena { reason } => write!(f, "arena: {reason}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::KernelFailure { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_failure_chains_source() {
        let err = EngineError::KernelFailure {
            kernel: "wave".into(),
            reason: KernelError::NonFinite {
                column: 3,
                point: 0,
            },
        };
        assert_eq!(
            err.to_string(),
            "kernel 'wave' failed: non-finite value at column 3, point 0"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn only_abort_is_secondary() {
        assert!(EngineError::Aborted.is_secondary());
        assert!(!EngineError::config("bad width").is_secondary());
        assert!(!EngineError::invalid("cell#1.0").is_secondary());
    }

    #[test]
    fn timeout_reports_millis() {
        let err = EngineError::Timeout {
            waited: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "harvest timed out after 250 ms");
    }
}
