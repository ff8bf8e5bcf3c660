//! Grid and time-step parameters shared by every kernel.

use std::error::Error;
use std::fmt;

/// Errors from [`GridParams::validate`].
#[derive(Clone, Debug, PartialEq)]
pub enum GridError {
    /// The domain bounds are not finite or `min_x >= max_x`.
    EmptyDomain {
        /// Lower bound.
        min_x: f64,
        /// Upper bound.
        max_x: f64,
    },
    /// The Courant factor is outside `(0, 1]`.
    UnstableCourant {
        /// The rejected value.
        lambda: f64,
    },
    /// A point carries no evolved values.
    NoEquations,
    /// The refinement ratio is not finite and positive.
    InvalidRatio {
        /// The rejected value.
        ratio: f64,
    },
    /// The base spacing is not finite and positive.
    InvalidSpacing {
        /// The rejected value.
        dx0: f64,
    },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyDomain { min_x, max_x } => {
                write!(f, "domain [{min_x}, {max_x}] is empty or not finite")
            }
            Self::UnstableCourant { lambda } => {
                write!(f, "courant factor {lambda} must lie in (0, 1]")
            }
            Self::NoEquations => write!(f, "num_eqns must be at least 1"),
            Self::InvalidRatio { ratio } => {
                write!(f, "refinement ratio {ratio} must be finite and positive")
            }
            Self::InvalidSpacing { dx0 } => {
                write!(f, "base spacing {dx0} must be finite and positive")
            }
        }
    }
}

impl Error for GridError {}

/// Parameters of the 1-D grid the mesh discretises.
///
/// `dx0` is the spacing of the base (level 0) grid. It is normally set
/// from the point count with [`GridParams::with_points`]; each refinement
/// level halves it, and the time step follows the Courant factor.
#[derive(Clone, Debug, PartialEq)]
pub struct GridParams {
    /// Left edge of the domain.
    pub min_x: f64,
    /// Right edge of the domain.
    pub max_x: f64,
    /// Courant factor: `dt = lambda * dx`.
    pub lambda: f64,
    /// Evolved values per grid point.
    pub num_eqns: usize,
    /// Point-count growth per level for statically layered meshes.
    pub refine_ratio: f64,
    /// Base grid spacing.
    pub dx0: f64,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            min_x: 0.0,
            max_x: 15.0,
            lambda: 0.15,
            num_eqns: 3,
            refine_ratio: 1.5,
            dx0: 15.0,
        }
    }
}

impl GridParams {
    /// Set `dx0` so `points` base points span the domain edge to edge.
    pub fn with_points(mut self, points: usize) -> Self {
        let gaps = points.saturating_sub(1).max(1);
        self.dx0 = (self.max_x - self.min_x) / gaps as f64;
        self
    }

    /// Grid spacing at `level`.
    pub fn dx(&self, level: u32) -> f64 {
        self.dx0 / f64::from(level).exp2()
    }

    /// Time step at `level`.
    pub fn dt(&self, level: u32) -> f64 {
        self.lambda * self.dx(level)
    }

    /// Coordinate of base point `index`.
    pub fn coordinate(&self, index: usize) -> f64 {
        self.min_x + index as f64 * self.dx0
    }

    /// Check the parameters are usable.
    pub fn validate(&self) -> Result<(), GridError> {
        if !self.min_x.is_finite() || !self.max_x.is_finite() || self.min_x >= self.max_x {
            return Err(GridError::EmptyDomain {
                min_x: self.min_x,
                max_x: self.max_x,
            });
        }
        if !(self.lambda > 0.0 && self.lambda <= 1.0) {
            return Err(GridError::UnstableCourant {
                lambda: self.lambda,
            });
        }
        if self.num_eqns == 0 {
            return Err(GridError::NoEquations);
        }
        if !self.refine_ratio.is_finite() || self.refine_ratio <= 0.0 {
            return Err(GridError::InvalidRatio {
                ratio: self.refine_ratio,
            });
        }
        if !self.dx0.is_finite() || self.dx0 <= 0.0 {
            return Err(GridError::InvalidSpacing { dx0: self.dx0 });
        }
        Ok(())
    }
}
