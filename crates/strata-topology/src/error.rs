//! Error types for topology construction.

use std::error::Error;
use std::fmt;

use strata_core::EngineError;

/// Errors arising while describing or wiring a mesh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopologyError {
    /// Stencil width is not one of 3, 5, 7 or 9.
    InvalidStencilWidth {
        /// The rejected width.
        width: usize,
    },
    /// A mesh needs at least one row and one column.
    EmptyMesh,
    /// A row has no columns.
    EmptyRow {
        /// Index of the empty row.
        row: usize,
    },
    /// A mesh needs at least two rows so values can circulate.
    TooFewRows {
        /// The rejected row count.
        rows: usize,
    },
    /// Per-level point counts do not describe a nested hierarchy.
    LevelTableMismatch {
        /// What is wrong with the table.
        reason: String,
    },
    /// A node would receive no inputs.
    Unreachable {
        /// Row of the node.
        row: usize,
        /// Column of the node.
        column: usize,
    },
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidStencilWidth { width } => {
                write!(f, "stencil width {width} is not one of 3, 5, 7, 9")
            }
            Self::EmptyMesh => write!(f, "mesh must have at least one row and one column"),
            Self::EmptyRow { row } => write!(f, "row {row} has no columns"),
            Self::TooFewRows { rows } => write!(f, "mesh needs at least 2 rows, got {rows}"),
            Self::LevelTableMismatch { reason } => write!(f, "level table mismatch: {reason}"),
            Self::Unreachable { row, column } => {
                write!(f, "node ({row},{column}) has no inputs")
            }
        }
    }
}

impl Error for TopologyError {}

impl From<TopologyError> for EngineError {
    fn from(e: TopologyError) -> Self {
        EngineError::Configuration {
            reason: e.to_string(),
        }
    }
}
