//! Explicit three-point smoothing over seeded random data.
//!
//! Each evaluation relaxes every value toward the mean of its nearest
//! left and right points:
//! ```text
//! u_new = u + alpha * (u_left - 2 u + u_right)
//! ```
//! Initial data is uniform in `[-1, 1)` and depends only on the seed and
//! the coordinate, so coarse and refined meshes sample the same field.
//! With `stages > 1` each stage applies `alpha / stages`, so a full step
//! smooths by the same amount regardless of the stage count.

use std::sync::Arc;

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use strata_core::{Cell, KernelError};
use strata_kernel::{EvalContext, GridParams, Kernel, PointSet};

use crate::neighbors::around;

/// The smoothing kernel.
#[derive(Clone, Debug, PartialEq)]
pub struct SmoothingKernel {
    seed: u64,
    alpha: f64,
    stages: u32,
    threshold: Option<f64>,
}

impl SmoothingKernel {
    /// A single-stage kernel with smoothing factor 0.25 and no refinement.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            alpha: 0.25,
            stages: 1,
            threshold: None,
        }
    }

    /// Set the smoothing factor. Values above 0.5 are unstable and are
    /// clamped.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha.clamp(0.0, 0.5);
        self
    }

    /// Split each step into `stages` evaluations.
    pub fn with_stages(mut self, stages: u32) -> Self {
        self.stages = stages.max(1);
        self
    }

    /// Ask for refinement where any value's magnitude exceeds `threshold`.
    pub fn refine_above(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    fn sample(&self, x: f64) -> f64 {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ x.to_bits());
        let bits = rng.next_u64() >> 11;
        bits as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
    }
}

impl Kernel for SmoothingKernel {
    fn name(&self) -> &str {
        "smoothing"
    }

    fn stages(&self) -> u32 {
        self.stages
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
        ctx.seed_from(result, anchor);

        let alpha = self.alpha / f64::from(self.stages);
        let points = PointSet::gather(preds);
        for p in 0..anchor.num_points() {
            let Some(i) = points.position(anchor.coords[p]) else {
                continue;
            };
            let (Some(l), Some(r)) = around(&points, i) else {
                continue;
            };
            let (ul, u, ur) = (points.value(l), points.value(i), points.value(r));
            if ul.len() != u.len() || ur.len() != u.len() {
                return Err(KernelError::ShapeMismatch {
                    expected: format!("{} equations per point", u.len()),
                    found: format!("{} and {}", ul.len(), ur.len()),
                });
            }
            for (k, out) in result.point_mut(p).iter_mut().enumerate() {
                *out = u[k] + alpha * (ul[k] - 2.0 * u[k] + ur[k]);
            }
        }
        Ok(ctx.advance(result, anchor))
    }

    fn refine(&self, cell: &Cell, _ctx: &EvalContext<'_>) -> bool {
        self.threshold
            .is_some_and(|t| cell.payload.iter().any(|v| v.abs() > t))
    }

    fn initial_state(&self, x: f64, _level: u32, _grid: &GridParams, out: &mut [f64]) {
        let base = self.sample(x);
        for (k, v) in out.iter_mut().enumerate() {
            *v = base / (k + 1) as f64;
        }
    }
}

#[cfg(test)]
mod tests {
    use strata_core::GridPos;

    use super::*;

    fn ctx(grid: &GridParams, stages: u32) -> EvalContext<'_> {
        EvalContext {
            pos: GridPos::new(1, 1),
            anchor: Some(1),
            num_steps: 8,
            level: 0,
            width: 3,
            stages,
            grid,
        }
    }

    fn line(values: &[f64]) -> Vec<Arc<Cell>> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let mut c = Cell::new(i, values.len(), 0).with_points([i as f64], 1);
                c.point_mut(0)[0] = v;
                Arc::new(c)
            })
            .collect()
    }

    #[test]
    fn initial_data_is_deterministic() {
        let grid = GridParams::default();
        let a = SmoothingKernel::new(7);
        let b = SmoothingKernel::new(7);
        let c = SmoothingKernel::new(8);
        let (mut va, mut vb, mut vc) = ([0.0; 3], [0.0; 3], [0.0; 3]);
        a.initial_state(2.5, 0, &grid, &mut va);
        b.initial_state(2.5, 1, &grid, &mut vb);
        c.initial_state(2.5, 0, &grid, &mut vc);
        assert_eq!(va, vb);
        assert_ne!(va, vc);
        assert!(va.iter().all(|v| (-1.0..1.0).contains(v)));
    }

    #[test]
    fn spike_spreads() {
        let grid = GridParams::default();
        let kernel = SmoothingKernel::new(0);
        let preds = line(&[0.0, 1.0, 0.0]);
        let mut result = Cell::new(0, 0, 0);
        assert_eq!(kernel.eval(&mut result, &preds, &ctx(&grid, 1)).unwrap(), 7);
        assert_eq!(result.point(0)[0], 0.5);
    }

    #[test]
    fn stages_split_alpha() {
        let grid = GridParams::default();
        let kernel = SmoothingKernel::new(0).with_stages(2);
        let preds = line(&[0.0, 1.0, 0.0]);
        let mut result = Cell::new(0, 0, 0);
        kernel.eval(&mut result, &preds, &ctx(&grid, 2)).unwrap();
        assert_eq!(result.point(0)[0], 0.75);
        assert_eq!((result.cycle, result.iter), (0, 1));
    }

    #[test]
    fn refinement_is_opt_in() {
        let grid = GridParams::default();
        let cell = &line(&[0.9])[0];
        assert!(!SmoothingKernel::new(0).refine(cell, &ctx(&grid, 1)));
        assert!(SmoothingKernel::new(0)
            .refine_above(0.5)
            .refine(cell, &ctx(&grid, 1)));
    }

    // ── Property tests ──────────────────────────────────────────

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn smoothing_never_exceeds_input_range(
                values in prop::collection::vec(-10.0f64..10.0, 3),
                alpha in 0.0f64..0.5,
            ) {
                let grid = GridParams::default();
                let kernel = SmoothingKernel::new(0).with_alpha(alpha);
                let preds = line(&values);
                let mut result = Cell::new(0, 0, 0);
                kernel.eval(&mut result, &preds, &ctx(&grid, 1)).unwrap();
                let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let v = result.point(0)[0];
                prop_assert!(v >= lo - 1e-12 && v <= hi + 1e-12);
            }
        }
    }
}
