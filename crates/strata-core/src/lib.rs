//! Core types for the Strata stencil dataflow engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! value record exchanged between stencil nodes ([`Cell`]), the handles
//! used to address cells and nodes, and the engine-wide error taxonomy.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cell;
pub mod error;
pub mod id;

pub use cell::{Cell, CrossLinks, COORD_TOLERANCE};
pub use error::{EngineError, KernelError};
pub use id::{CellId, GridPos, LoggingId, NodeId};
