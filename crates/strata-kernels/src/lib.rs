//! Reference kernels for the Strata stencil engine.
//!
//! - [`WaveKernel`]: the 1-D wave equation in first-order form
//!   (`chi`, `Phi`, `Pi`) with a Gaussian pulse and a field-magnitude
//!   refinement criterion.
//! - [`SmoothingKernel`]: explicit three-point smoothing of seeded random
//!   data, useful for exercising the engine without a physical model.
//!
//! Both kernels difference across the flattened predecessor points, so
//! they work unchanged on coarse meshes, child meshes and cells holding
//! several points.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod neighbors;
pub mod smoothing;
pub mod wave;

pub use smoothing::SmoothingKernel;
pub use wave::WaveKernel;
