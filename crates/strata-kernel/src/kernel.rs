//! The [`Kernel`] trait.

use std::sync::Arc;

use strata_arena::CellArena;
use strata_core::{Cell, CellId, KernelError, LoggingId};

use crate::context::{AllocRequest, EvalContext};
use crate::grid::GridParams;

/// A pluggable numeric kernel.
///
/// # Contract
///
/// - `eval()` writes the new state into `result` (a private working copy)
///   and returns the step-remaining signal: `> 0` while running, `0` on
///   the last step, `< 0` once overdone. The signal alone drives node
///   termination.
/// - Once a predecessor is overdone, `eval()` must keep carrying it
///   forward (see [`EvalContext::hold`]) so every node of a mesh stops
///   after the same step.
/// - `refine()` is only consulted after a full sub-cycle.
/// - Kernels are shared by every node thread and must be `Send + Sync`.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use strata_core::{Cell, KernelError};
/// use strata_kernel::{EvalContext, GridParams, Kernel};
///
/// struct Hold;
///
/// impl Kernel for Hold {
///     fn name(&self) -> &str { "hold" }
///
///     fn eval(
///         &self,
///         result: &mut Cell,
///         preds: &[Arc<Cell>],
///         ctx: &EvalContext<'_>,
///     ) -> Result<i32, KernelError> {
///         let anchor = ctx.anchor_cell(preds)?;
///         if ctx.is_overdone(anchor) {
///             return Ok(ctx.hold(result, anchor));
///         }
///         ctx.seed_from(result, anchor);
///         Ok(ctx.advance(result, anchor))
///     }
///
///     fn initial_state(&self, _x: f64, _level: u32, _grid: &GridParams, out: &mut [f64]) {
///         out.fill(0.0);
///     }
/// }
///
/// assert_eq!(Hold.name(), "hold");
/// ```
pub trait Kernel: Send + Sync + 'static {
    /// Human-readable name for errors and logs.
    fn name(&self) -> &str;

    /// Integrator stages per full time step.
    fn stages(&self) -> u32 {
        1
    }

    /// Called once per mesh run before any node starts.
    fn init(&self, _num_steps: u32, _logging: Option<LoggingId>) -> Result<(), KernelError> {
        Ok(())
    }

    /// Allocate a cell for `req` in `arena`.
    ///
    /// The default builds a cell over `req.coords` with a zeroed payload
    /// and, when `req.seed` is set, fills every point from
    /// [`initial_state`](Kernel::initial_state).
    fn alloc(&self, arena: &CellArena, req: &AllocRequest<'_>) -> Result<CellId, KernelError> {
        let mut cell = Cell::new(req.column, req.columns, req.level)
            .with_points(req.coords.iter().copied(), req.grid.num_eqns);
        if req.seed {
            for (p, &x) in req.coords.iter().enumerate() {
                self.initial_state(x, req.level, req.grid, cell.point_mut(p));
            }
        }
        arena
            .insert(cell)
            .map_err(|e| KernelError::ExecutionFailed {
                reason: format!("cell allocation: {e}"),
            })
    }

    /// Advance one cell from its predecessor set.
    fn eval(
        &self,
        result: &mut Cell,
        preds: &[Arc<Cell>],
        ctx: &EvalContext<'_>,
    ) -> Result<i32, KernelError>;

    /// Whether `cell` needs a finer mesh.
    fn refine(&self, _cell: &Cell, _ctx: &EvalContext<'_>) -> bool {
        false
    }

    /// Initial data at coordinate `x`, written into `out` (`num_eqns`
    /// values).
    fn initial_state(&self, x: f64, level: u32, grid: &GridParams, out: &mut [f64]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_arena::ArenaConfig;

    struct Ramp;

    impl Kernel for Ramp {
        fn name(&self) -> &str {
            "ramp"
        }

        fn eval(
            &self,
            result: &mut Cell,
            preds: &[Arc<Cell>],
            ctx: &EvalContext<'_>,
        ) -> Result<i32, KernelError> {
            let anchor = ctx.anchor_cell(preds)?;
            ctx.seed_from(result, anchor);
            Ok(ctx.advance(result, anchor))
        }

        fn initial_state(&self, x: f64, level: u32, _grid: &GridParams, out: &mut [f64]) {
            for (i, v) in out.iter_mut().enumerate() {
                *v = x * (i + 1) as f64 + f64::from(level);
            }
        }
    }

    #[test]
    fn default_alloc_seeds_points() {
        let arena = CellArena::new(ArenaConfig::with_max_cells(4));
        let grid = GridParams::default();
        let req = AllocRequest {
            column: 2,
            columns: 5,
            row: 0,
            level: 1,
            coords: &[1.0, 2.0],
            grid: &grid,
            seed: true,
        };
        let id = Ramp.alloc(&arena, &req).unwrap();
        let cell = arena.get(id).unwrap();
        assert_eq!(cell.column, 2);
        assert_eq!(cell.level, 1);
        assert_eq!(cell.point(1), &[3.0, 5.0, 7.0]);
    }

    #[test]
    fn unseeded_alloc_is_zero() {
        let arena = CellArena::new(ArenaConfig::with_max_cells(4));
        let grid = GridParams::default();
        let req = AllocRequest {
            column: 0,
            columns: 1,
            row: 1,
            level: 0,
            coords: &[4.0],
            grid: &grid,
            seed: false,
        };
        let id = Ramp.alloc(&arena, &req).unwrap();
        assert_eq!(arena.get(id).unwrap().payload, vec![0.0; 3]);
    }

    #[test]
    fn full_arena_surfaces_as_kernel_error() {
        let arena = CellArena::new(ArenaConfig::with_max_cells(1));
        let grid = GridParams::default();
        let req = AllocRequest {
            column: 0,
            columns: 1,
            row: 0,
            level: 0,
            coords: &[0.0],
            grid: &grid,
            seed: false,
        };
        let _first = Ramp.alloc(&arena, &req).unwrap();
        match Ramp.alloc(&arena, &req) {
            Err(KernelError::ExecutionFailed { .. }) => {}
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
    }
}
