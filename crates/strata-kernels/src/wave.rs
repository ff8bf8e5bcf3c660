//! First-order 1-D wave equation kernel.
//!
//! Evolves `chi` (the field), `Phi = d chi / dx` and `Pi = d chi / dt`:
//! ```text
//! chi_t = Pi
//! Phi_t = Pi_x
//! Pi_t  = Phi_x
//! ```
//! with a Lax-Friedrichs update over the nearest left and right points.
//! Points without a neighbour on one side (the physical edges) are
//! carried forward unchanged.
//!
//! Constructed via the builder pattern: [`WaveKernel::builder`].

use std::sync::Arc;

use strata_core::{Cell, KernelError};
use strata_kernel::{EvalContext, GridParams, Kernel, PointSet};

use crate::neighbors::around;

const CHI: usize = 0;
const PHI: usize = 1;
const PI: usize = 2;

/// The wave-equation kernel.
///
/// Initial data is a Gaussian pulse `chi = amp * exp(-((x - r0) / delta)^2)`
/// at rest. A cell asks for refinement once `|chi|` exceeds `ethreshold`
/// at any of its points.
#[derive(Clone, Debug, PartialEq)]
pub struct WaveKernel {
    amp: f64,
    r0: f64,
    delta: f64,
    ethreshold: f64,
}

/// Builder for [`WaveKernel`].
pub struct WaveKernelBuilder {
    amp: f64,
    r0: f64,
    delta: f64,
    ethreshold: f64,
}

impl WaveKernel {
    /// Create a builder with the default pulse (`amp` 0.1, `r0` 8,
    /// `delta` 1, `ethreshold` 0.005).
    pub fn builder() -> WaveKernelBuilder {
        WaveKernelBuilder {
            amp: 0.1,
            r0: 8.0,
            delta: 1.0,
            ethreshold: 0.005,
        }
    }

    /// Pulse amplitude.
    pub fn amp(&self) -> f64 {
        self.amp
    }

    /// Refinement threshold.
    pub fn ethreshold(&self) -> f64 {
        self.ethreshold
    }

    fn check_shape(&self, anchor: &Cell) -> Result<(), KernelError> {
        if anchor.num_points() > 0 && anchor.num_eqns() < 3 {
            return Err(KernelError::ShapeMismatch {
                expected: "3 equations per point (chi, Phi, Pi)".into(),
                found: format!("{} equations", anchor.num_eqns()),
            });
        }
        Ok(())
    }
}

impl Default for WaveKernel {
    fn default() -> Self {
        let b = Self::builder();
        Self {
            amp: b.amp,
            r0: b.r0,
            delta: b.delta,
            ethreshold: b.ethreshold,
        }
    }
}

impl WaveKernelBuilder {
    /// Pulse amplitude (default 0.1).
    pub fn amp(mut self, amp: f64) -> Self {
        self.amp = amp;
        self
    }

    /// Pulse centre (default 8).
    pub fn r0(mut self, r0: f64) -> Self {
        self.r0 = r0;
        self
    }

    /// Pulse width (default 1). Must be positive.
    pub fn delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    /// Refinement threshold on `|chi|` (default 0.005). Must be >= 0.
    pub fn ethreshold(mut self, ethreshold: f64) -> Self {
        self.ethreshold = ethreshold;
        self
    }

    /// Build the kernel, validating the parameters.
    ///
    /// # Errors
    ///
    /// Returns `Err` if any parameter is non-finite, `delta <= 0` or
    /// `ethreshold < 0`.
    pub fn build(self) -> Result<WaveKernel, String> {
        for (name, v) in [
            ("amp", self.amp),
            ("r0", self.r0),
            ("delta", self.delta),
            ("ethreshold", self.ethreshold),
        ] {
            if !v.is_finite() {
                return Err(format!("{name} must be finite, got {v}"));
            }
        }
        if self.delta <= 0.0 {
            return Err(format!("delta must be positive, got {}", self.delta));
        }
        if self.ethreshold < 0.0 {
            return Err(format!("ethreshold must be >= 0, got {}", self.ethreshold));
        }
        Ok(WaveKernel {
            amp: self.amp,
            r0: self.r0,
            delta: self.delta,
            ethreshold: self.ethreshold,
        })
    }
}

impl Kernel for WaveKernel {
    fn name(&self) -> &str {
        "wave"
    }

    fn eval(
        &self,
        result: &mut Cell,
        preds: &[Arc<Cell>],
        ctx: &EvalContext<'_>,
    ) -> Result<i32, KernelError> {
        let anchor = ctx.anchor_cell(preds)?;
        if ctx.is_overdone(anchor) {
            return Ok(ctx.hold(result, anchor));
        }
        self.check_shape(anchor)?;
        ctx.seed_from(result, anchor);

        let dt = ctx.grid.dt(ctx.level);
        let points = PointSet::gather(preds);
        for p in 0..anchor.num_points() {
            let Some(i) = points.position(anchor.coords[p]) else {
                continue;
            };
            let (Some(l), Some(r)) = around(&points, i) else {
                continue;
            };
            let (ul, ur) = (points.value(l), points.value(r));
            let span = points.coord(r) - points.coord(l);
            let out = result.point_mut(p);
            out[CHI] = 0.5 * (ul[CHI] + ur[CHI]) + dt * points.value(i)[PI];
            out[PHI] = 0.5 * (ul[PHI] + ur[PHI]) + dt * (ur[PI] - ul[PI]) / span;
            out[PI] = 0.5 * (ul[PI] + ur[PI]) + dt * (ur[PHI] - ul[PHI]) / span;
            if out.iter().any(|v| !v.is_finite()) {
                return Err(KernelError::NonFinite {
                    column: ctx.pos.column,
                    point: p,
                });
            }
        }
        Ok(ctx.advance(result, anchor))
    }

    fn refine(&self, cell: &Cell, _ctx: &EvalContext<'_>) -> bool {
        (0..cell.num_points()).any(|p| cell.point(p)[CHI].abs() > self.ethreshold)
    }

    fn initial_state(&self, x: f64, _level: u32, _grid: &GridParams, out: &mut [f64]) {
        out.fill(0.0);
        let s = (x - self.r0) / self.delta;
        let chi = self.amp * (-s * s).exp();
        if let Some(v) = out.get_mut(CHI) {
            *v = chi;
        }
        if let Some(v) = out.get_mut(PHI) {
            *v = -2.0 * s / self.delta * chi;
        }
    }
}
