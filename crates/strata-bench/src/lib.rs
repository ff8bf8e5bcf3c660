//! Benchmark profiles for the Strata stencil engine.
//!
//! - [`reference_config`]: width 5, three rows, no refinement
//! - [`refined_config`]: the same mesh with one level of refinement
//! - [`pulse_kernel`]: a wave kernel whose pulse sits mid-domain
//! - [`reference_mesh`]: a mesh over a fresh [`LocalService`]

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use strata_engine::{ConfigError, LocalService, Mesh, MeshConfig};
use strata_kernels::WaveKernel;

/// Width-5 stencil, three rows per level, refinement disabled.
pub fn reference_config() -> MeshConfig {
    MeshConfig {
        stencil_width: 5,
        ..MeshConfig::default()
    }
}

/// [`reference_config`] with `max_level` 1.
pub fn refined_config() -> MeshConfig {
    MeshConfig {
        max_level: 1,
        ..reference_config()
    }
}

/// Wave kernel with its pulse in the middle of the default domain.
pub fn pulse_kernel() -> WaveKernel {
    WaveKernel::default()
}

/// A mesh running [`pulse_kernel`] under `config`.
pub fn reference_mesh(config: MeshConfig) -> Result<Mesh, ConfigError> {
    let service = Arc::new(LocalService::new(config.arena.clone()));
    Mesh::new(service, Arc::new(pulse_kernel()), config)
}
