//! Mesh configuration, validation, and error types.
//!
//! [`MeshConfig`] is the input to [`Mesh::new`](crate::Mesh::new).
//! [`validate()`](MeshConfig::validate) checks the structural invariants
//! once; per-run size checks happen in
//! [`init_execute`](crate::Mesh::init_execute) and
//! [`execute`](crate::Mesh::execute).

use std::error::Error;
use std::fmt;
use std::time::Duration;

use strata_arena::ArenaConfig;
use strata_core::EngineError;
use strata_kernel::{GridError, GridParams};
use strata_topology::{StencilWidth, TopologyError};

/// Deepest refinement level a configuration may allow.
pub const MAX_LEVEL_LIMIT: u32 = 20;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected by [`MeshConfig::validate()`] and the per-run size
/// checks.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// Stencil width is not one of 3, 5, 7 or 9.
    InvalidStencilWidth {
        /// The rejected width.
        width: usize,
    },
    /// Fewer than two rows per mesh.
    TooFewRows {
        /// The configured row count.
        rows: usize,
    },
    /// `max_level` exceeds [`MAX_LEVEL_LIMIT`].
    LevelTooDeep {
        /// The configured level.
        max_level: u32,
    },
    /// Granularity is zero or does not divide the point count.
    GranularityMismatch {
        /// Points requested.
        points: usize,
        /// Points per cell.
        granularity: usize,
    },
    /// The run has no points.
    NoPoints,
    /// The number of initial cells does not match the mesh.
    InitialCountMismatch {
        /// Cells the mesh needs.
        expected: usize,
        /// Cells supplied.
        found: usize,
    },
    /// Grid parameters failed validation.
    InvalidGrid(GridError),
    /// A harvest timeout of zero.
    ZeroTimeout,
    /// A log stride of zero.
    ZeroLogStride,
    /// The arena cannot hold a single cell.
    ZeroArenaCapacity,
    /// The wiring plan could not be built.
    Topology(TopologyError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidStencilWidth { width } => {
                write!(f, "stencil width {width} is not one of 3, 5, 7, 9")
            }
            Self::TooFewRows { rows } => {
                write!(f, "rows_per_level {rows} is below minimum of 2")
            }
            Self::LevelTooDeep { max_level } => {
                write!(f, "max_level {max_level} exceeds {MAX_LEVEL_LIMIT}")
            }
            Self::GranularityMismatch {
                points,
                granularity,
            } => write!(
                f,
                "{points} points cannot be split into cells of {granularity}"
            ),
            Self::NoPoints => write!(f, "a mesh needs at least one point"),
            Self::InitialCountMismatch { expected, found } => {
                write!(f, "expected {expected} initial cells, got {found}")
            }
            Self::InvalidGrid(e) => write!(f, "grid: {e}"),
            Self::ZeroTimeout => write!(f, "harvest_timeout must be non-zero"),
            Self::ZeroLogStride => write!(f, "log_stride must be at least 1"),
            Self::ZeroArenaCapacity => write!(f, "arena must hold at least one cell"),
            Self::Topology(e) => write!(f, "topology: {e}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidGrid(e) => Some(e),
            Self::Topology(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GridError> for ConfigError {
    fn from(e: GridError) -> Self {
        Self::InvalidGrid(e)
    }
}

impl From<TopologyError> for ConfigError {
    fn from(e: TopologyError) -> Self {
        Self::Topology(e)
    }
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        EngineError::config(e.to_string())
    }
}

// ── MeshConfig ─────────────────────────────────────────────────────

/// Everything a [`Mesh`](crate::Mesh) needs besides the kernel and the
/// object service.
#[derive(Clone, Debug)]
pub struct MeshConfig {
    /// Predecessors per interior node: 3, 5, 7 or 9. Default: 3.
    pub stencil_width: usize,
    /// Rows (time lanes) in every mesh, base and child. Default: 3.
    pub rows_per_level: usize,
    /// Deepest refinement level allowed; 0 disables refinement. Default: 0.
    pub max_level: u32,
    /// Grid points per cell. Default: 1.
    pub granularity: usize,
    /// Grid and time-step parameters. `dx0` is recomputed per run from
    /// the point count.
    pub grid: GridParams,
    /// Give up on the harvest after this long. Default: `None` (wait
    /// forever).
    pub harvest_timeout: Option<Duration>,
    /// Log `Step` entries only on cycles divisible by this. Default: 1.
    pub log_stride: u32,
    /// Cell arena limits, used by [`LocalService::new`](crate::LocalService::new).
    pub arena: ArenaConfig,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            stencil_width: 3,
            rows_per_level: 3,
            max_level: 0,
            granularity: 1,
            grid: GridParams::default(),
            harvest_timeout: None,
            log_stride: 1,
            arena: ArenaConfig::default(),
        }
    }
}

impl MeshConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.width()?;
        if self.rows_per_level < 2 {
            return Err(ConfigError::TooFewRows {
                rows: self.rows_per_level,
            });
        }
        if self.max_level > MAX_LEVEL_LIMIT {
            return Err(ConfigError::LevelTooDeep {
                max_level: self.max_level,
            });
        }
        if self.granularity == 0 {
            return Err(ConfigError::GranularityMismatch {
                points: 0,
                granularity: 0,
            });
        }
        self.grid.validate()?;
        if self.harvest_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.log_stride == 0 {
            return Err(ConfigError::ZeroLogStride);
        }
        if self.arena.max_cells == 0 {
            return Err(ConfigError::ZeroArenaCapacity);
        }
        Ok(())
    }

    /// The stencil width as a checked value.
    pub fn width(&self) -> Result<StencilWidth, ConfigError> {
        StencilWidth::new(self.stencil_width).map_err(|_| ConfigError::InvalidStencilWidth {
            width: self.stencil_width,
        })
    }

    /// Cells needed for `points` grid points.
    pub fn cells_for(&self, points: usize) -> Result<usize, ConfigError> {
        if points == 0 {
            return Err(ConfigError::NoPoints);
        }
        if self.granularity == 0 || points % self.granularity != 0 {
            return Err(ConfigError::GranularityMismatch {
                points,
                granularity: self.granularity,
            });
        }
        Ok(points / self.granularity)
    }
}
