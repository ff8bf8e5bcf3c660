//! Stencil dataflow engine with adaptive mesh refinement.
//!
//! A run is a mesh of stencil nodes, one per (row, column). Each node
//! pulls its predecessors' values through one-slot ports, advances its
//! cell with the pluggable [`Kernel`](strata_kernel::Kernel) and
//! publishes the result. When the kernel flags a cell, the node runs a
//! finer child mesh around it, restricts the fine result back and links
//! the fine cells so neighbouring refinements can reuse them.
//!
//! [`Mesh`] is the entry point (`init_execute` / `execute`). Nodes are
//! created and driven through an [`ObjectService`]; [`LocalService`] runs
//! them as threads of this process.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod env;
pub mod log;
pub mod mesh;
pub mod metrics;
pub mod node;
pub mod port;
pub mod refine;
pub mod service;
pub mod signal;

pub use config::{ConfigError, MeshConfig, MAX_LEVEL_LIMIT};
pub use env::RunEnv;
pub use log::{LogEntry, LogPhase, LogSink, TracingSink};
pub use mesh::{Mesh, MeshOutcome};
pub use metrics::{MeshMetrics, RunMetrics};
pub use node::{NodeExit, NodeSetup, NodeState, StencilNode};
pub use port::{InPort, OutPort, Published, Publisher};
pub use refine::{findpoint, Bias, Found};
pub use service::{LocalService, NodeOp, NodeReply, ObjectService, Pending, PendingSet};
pub use signal::MeshSignal;
