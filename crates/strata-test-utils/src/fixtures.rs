//! Reusable test kernels.
//!
//! - [`StepCounter`] carries each cell forward unchanged, counting steps.
//! - [`RefineAt`] is a step counter that flags chosen (column, cycle)
//!   pairs of the base mesh for refinement. Made
//!   [`evolving`](RefineAt::evolving), its state also changes every step.
//! - [`FailingKernel`] fails deterministically at one (column, cycle).
//! - [`SlowKernel`] sleeps before every step.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use strata_core::{Cell, KernelError};
use strata_kernel::{EvalContext, GridParams, Kernel};

/// Advance `result` one step past the anchor, or hold once overdone.
pub fn step(
    result: &mut Cell,
    preds: &[Arc<Cell>],
    ctx: &EvalContext<'_>,
) -> Result<i32, KernelError> {
    let anchor = ctx.anchor_cell(preds)?;
    if ctx.is_overdone(anchor) {
        return Ok(ctx.hold(result, anchor));
    }
    ctx.seed_from(result, anchor);
    Ok(ctx.advance(result, anchor))
}

/// Initial data shared by the fixtures: `[x², x, 1, ...]`.
pub fn quadratic(x: f64, out: &mut [f64]) {
    for (i, v) in out.iter_mut().enumerate() {
        *v = match i {
            0 => x * x,
            1 => x,
            _ => 1.0,
        };
    }
}

/// Carries every cell forward unchanged.
pub struct StepCounter {
    stages: u32,
    calls: AtomicUsize,
}

impl StepCounter {
    pub fn new() -> Self {
        Self {
            stages: 1,
            calls: AtomicUsize::new(0),
        }
    }

    /// Count `stages` evaluations per full step.
    pub fn with_stages(mut self, stages: u32) -> Self {
        self.stages = stages.max(1);
        self
    }

    /// How many times `eval()` has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for StepCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel for StepCounter {
    fn name(&self) -> &str {
        "step_counter"
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
        self.calls.fetch_add(1, Ordering::Relaxed);
        step(result, preds, ctx)
    }

    fn initial_state(&self, x: f64, _level: u32, _grid: &GridParams, out: &mut [f64]) {
        quadratic(x, out);
    }
}

/// A step counter that asks for refinement of base-mesh cells at the
/// given `(column, cycle)` pairs.
pub struct RefineAt {
    targets: Vec<(usize, u32)>,
    evolving: bool,
}

impl RefineAt {
    pub fn new(targets: impl IntoIterator<Item = (usize, u32)>) -> Self {
        Self {
            targets: targets.into_iter().collect(),
            evolving: false,
        }
    }

    /// Refine `column` of the base mesh at every cycle up to `cycles`.
    pub fn every_cycle(column: usize, cycles: u32) -> Self {
        Self::new((1..=cycles).map(|cycle| (column, cycle)))
    }

    /// Apply `v += dt * sin(v)` to every value on each step, so values
    /// depend on the step size and never match a linear interpolation
    /// of coarser ones.
    pub fn evolving(mut self) -> Self {
        self.evolving = true;
        self
    }
}

impl Kernel for RefineAt {
    fn name(&self) -> &str {
        "refine_at"
    }

    fn eval(
        &self,
        result: &mut Cell,
        preds: &[Arc<Cell>],
        ctx: &EvalContext<'_>,
    ) -> Result<i32, KernelError> {
        let remaining = step(result, preds, ctx)?;
        if self.evolving && remaining >= 0 {
            let dt = ctx.grid.dt(ctx.level);
            for v in &mut result.payload {
                *v += dt * v.sin();
            }
        }
        Ok(remaining)
    }

    fn refine(&self, cell: &Cell, _ctx: &EvalContext<'_>) -> bool {
        cell.level == 0 && self.targets.contains(&(cell.column, cell.cycle))
    }

    fn initial_state(&self, x: f64, _level: u32, _grid: &GridParams, out: &mut [f64]) {
        quadratic(x, out);
    }
}

/// Fails with [`KernelError::ExecutionFailed`] when it would produce
/// `cycle` at `column`.
pub struct FailingKernel {
    column: usize,
    cycle: u32,
}

impl FailingKernel {
    pub fn at(column: usize, cycle: u32) -> Self {
        Self { column, cycle }
    }
}

impl Kernel for FailingKernel {
    fn name(&self) -> &str {
        "failing"
    }

    fn eval(
        &self,
        result: &mut Cell,
        preds: &[Arc<Cell>],
        ctx: &EvalContext<'_>,
    ) -> Result<i32, KernelError> {
        let anchor = ctx.anchor_cell(preds)?;
        if anchor.column == self.column && anchor.cycle + 1 == self.cycle {
            return Err(KernelError::ExecutionFailed {
                reason: format!(
                    "injected failure at column {} cycle {}",
                    self.column, self.cycle
                ),
            });
        }
        step(result, preds, ctx)
    }

    fn initial_state(&self, x: f64, _level: u32, _grid: &GridParams, out: &mut [f64]) {
        quadratic(x, out);
    }
}

/// A step counter that sleeps `delay` before every evaluation.
pub struct SlowKernel {
    delay: Duration,
}

impl SlowKernel {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Kernel for SlowKernel {
    fn name(&self) -> &str {
        "slow"
    }

    fn eval(
        &self,
        result: &mut Cell,
        preds: &[Arc<Cell>],
        ctx: &EvalContext<'_>,
    ) -> Result<i32, KernelError> {
        std::thread::sleep(self.delay);
        step(result, preds, ctx)
    }

    fn initial_state(&self, x: f64, _level: u32, _grid: &GridParams, out: &mut [f64]) {
        quadratic(x, out);
    }
}
