//! Graph topology builder for Strata stencil meshes.
//!
//! Given a mesh shape (rows are time lanes, columns are spatial cells,
//! plus the stencil width and optional refinement-level metadata) this
//! crate computes the exact port-wiring plan: which output port of which
//! node feeds which input port of which other node.
//!
//! Everything here is pure and deterministic. The engine consumes a
//! [`WiringPlan`] to create and connect nodes; nothing in this crate
//! spawns threads or touches cells.
//!
//! # Neighbor rule
//!
//! A node at `(row, i)` feeds row `row + 1` (wrapping to 0), at the
//! columns within `width / 2` of `i`. Columns are clipped at the physical
//! edges. With a [`LevelLayout`], rows inside a row block only talk to
//! columns of the same refinement level, and a column absent from the
//! next row skips ahead to the next row that has it.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod levels;
pub mod plan;
pub mod shape;
pub mod width;

pub use error::TopologyError;
pub use levels::LevelLayout;
pub use plan::{NodeWiring, PortSource, PortTarget, WiringPlan};
pub use shape::MeshShape;
pub use width::StencilWidth;
