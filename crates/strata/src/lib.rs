//! Strata: a dataflow stencil engine with adaptive mesh refinement.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Strata sub-crates. For most users, adding `strata` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use strata::prelude::*;
//! use strata::kernels::SmoothingKernel;
//!
//! let config = MeshConfig {
//!     stencil_width: 5,
//!     ..MeshConfig::default()
//! };
//! let service = Arc::new(LocalService::new(config.arena.clone()));
//! let mesh = Mesh::new(service, Arc::new(SmoothingKernel::new(42)), config).unwrap();
//!
//! let out = mesh.init_execute(9, 4).unwrap();
//! assert_eq!(out.results.len(), 9);
//! for &id in &out.results {
//!     assert_eq!(mesh.arena().get(id).unwrap().cycle, 4);
//! }
//! mesh.release(&out.results);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `strata-core` | Cells, IDs and the error taxonomy |
//! | [`arena`] | `strata-arena` | Generational cell arena and link checks |
//! | [`topology`] | `strata-topology` | Stencil widths, mesh shapes and wiring plans |
//! | [`kernel`] | `strata-kernel` | The numeric kernel contract |
//! | [`kernels`] | `strata-kernels` | Reference kernels (wave, smoothing) |
//! | [`engine`] | `strata-engine` | Nodes, refinement and the mesh orchestrator |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Cells, identifiers and errors (`strata-core`).
pub use strata_core as types;

/// Generational cell storage (`strata-arena`).
///
/// [`arena::CellArena`] owns every cell of a run; handles are checked
/// on each access, so a stale cross-reference is detected instead of
/// aliasing a reused slot.
pub use strata_arena as arena;

/// Mesh shapes and port-wiring plans (`strata-topology`).
pub use strata_topology as topology;

/// The kernel contract (`strata-kernel`).
///
/// Implement [`kernel::Kernel`] to plug a numeric scheme into the engine.
pub use strata_kernel as kernel;

/// Reference kernels (`strata-kernels`).
pub use strata_kernels as kernels;

/// Stencil nodes, refinement and orchestration (`strata-engine`).
///
/// [`engine::Mesh`] runs a mesh to completion; [`engine::LocalService`]
/// hosts its nodes as threads of this process.
pub use strata_engine as engine;

/// Common imports for typical Strata usage.
///
/// ```rust
/// use strata::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use strata_core::{Cell, CellId, EngineError, GridPos, KernelError, LoggingId};

    // Arena
    pub use strata_arena::{ArenaConfig, CellArena};

    // Kernel contract
    pub use strata_kernel::{EvalContext, GridParams, Kernel, PointSet};

    // Engine
    pub use strata_engine::{
        ConfigError, LocalService, LogPhase, LogSink, Mesh, MeshConfig, MeshOutcome, RunMetrics,
        TracingSink,
    };
}
