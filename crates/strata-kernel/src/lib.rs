//! The numeric kernel contract for Strata.
//!
//! The engine owns scheduling, ports and refinement; everything that
//! knows about the PDE lives behind the [`Kernel`] trait. A kernel
//! allocates cells, advances one cell from its predecessor set, decides
//! whether a cell needs refinement and supplies initial data.
//!
//! [`GridParams`] carries the grid and time-step parameters every kernel
//! needs. [`PointSet`] flattens a predecessor set into points for kernels
//! (and the refinement engine) that work at point rather than cell
//! granularity.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod context;
pub mod grid;
pub mod kernel;
pub mod points;

pub use context::{AllocRequest, EvalContext};
pub use grid::{GridError, GridParams};
pub use kernel::Kernel;
pub use points::{midpoint, PointSet};
