//! Generational storage for [`Cell`](strata_core::Cell) values.
//!
//! Every cell exchanged by stencil nodes lives in one [`CellArena`],
//! addressed by a [`CellId`](strata_core::CellId) handle. Handles carry the
//! slot generation, so "free" is arena deallocation and a weak
//! cross-reference is a plain handle checked with
//! [`CellArena::contains`] before use.
//!
//! # Snapshot semantics
//!
//! ```text
//! CellArena
//! └── Slab (RwLock)
//!     └── Slot[] { generation, Option<Arc<Cell>> }
//! ```
//!
//! Reads hand out `Arc<Cell>` snapshots. Writes replace the `Arc` in the
//! slot, so a reader holding an older snapshot keeps a consistent view
//! while the owner moves on.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod arena;
pub mod config;
pub mod error;
pub mod links;

pub use arena::CellArena;
pub use config::ArenaConfig;
pub use error::ArenaError;
