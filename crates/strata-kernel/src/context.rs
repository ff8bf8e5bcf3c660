//! Per-call context handed to kernels.

use std::sync::Arc;

use strata_core::{Cell, GridPos, KernelError};

use crate::grid::GridParams;

/// Arguments to [`Kernel::alloc`](crate::Kernel::alloc).
#[derive(Clone, Copy, Debug)]
pub struct AllocRequest<'a> {
    /// Column of the new cell.
    pub column: usize,
    /// Columns in the mesh the cell belongs to.
    pub columns: usize,
    /// Row the cell is allocated for.
    pub row: usize,
    /// Refinement level of the mesh.
    pub level: u32,
    /// Coordinates of the points the cell holds.
    pub coords: &'a [f64],
    /// Grid parameters of the run.
    pub grid: &'a GridParams,
    /// Fill the payload from the kernel's initial data.
    pub seed: bool,
}

/// What a kernel sees when it advances one cell.
#[derive(Clone, Copy, Debug)]
pub struct EvalContext<'a> {
    /// Position of the evaluating node.
    pub pos: GridPos,
    /// Index of the predecessor at the node's own column.
    pub anchor: Option<usize>,
    /// Evaluations the mesh runs before stopping.
    pub num_steps: u32,
    /// Refinement level of the mesh.
    pub level: u32,
    /// Stencil width of the mesh.
    pub width: usize,
    /// Integrator stages per full step.
    pub stages: u32,
    /// Grid parameters of the run.
    pub grid: &'a GridParams,
}

impl EvalContext<'_> {
    /// The predecessor at the node's own column.
    pub fn anchor_cell<'p>(&self, preds: &'p [Arc<Cell>]) -> Result<&'p Cell, KernelError> {
        self.anchor
            .and_then(|i| preds.get(i))
            .map(Arc::as_ref)
            .ok_or_else(|| KernelError::ShapeMismatch {
                expected: format!("an anchor predecessor for {}", self.pos),
                found: format!("{} predecessors, anchor {:?}", preds.len(), self.anchor),
            })
    }

    /// Whether `preds` spans the full stencil rather than a clipped one.
    pub fn is_full_stencil(&self, preds: &[Arc<Cell>]) -> bool {
        preds.len() == self.width
    }

    /// Evaluations already applied to `cell`.
    pub fn progress(&self, cell: &Cell) -> u32 {
        cell.cycle * self.stages.max(1) + cell.iter
    }

    /// Steps left after reaching `progress`: positive while running,
    /// 0 on the last step, negative once overdone.
    pub fn remaining(&self, progress: u32) -> i32 {
        let left = i64::from(self.num_steps) - i64::from(progress);
        left.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    /// Whether `anchor` has already completed the run.
    pub fn is_overdone(&self, anchor: &Cell) -> bool {
        self.progress(anchor) >= self.num_steps
    }

    /// Copy the shape and state of `anchor` into `result`, dropping its
    /// cross-references and refinement flag.
    pub fn seed_from(&self, result: &mut Cell, anchor: &Cell) {
        result.column = anchor.column;
        result.columns = anchor.columns;
        result.level = anchor.level;
        result.cycle = anchor.cycle;
        result.iter = anchor.iter;
        result.time = anchor.time;
        result.coords.clone_from(&anchor.coords);
        result.payload.clone_from(&anchor.payload);
        result.refine = false;
        result.links = Default::default();
    }

    /// Move `result` one evaluation past `anchor` and return the
    /// step-remaining signal.
    pub fn advance(&self, result: &mut Cell, anchor: &Cell) -> i32 {
        let stages = self.stages.max(1);
        result.iter = anchor.iter + 1;
        result.cycle = anchor.cycle;
        result.time = anchor.time;
        if result.iter >= stages {
            result.iter = 0;
            result.cycle += 1;
            result.time += self.grid.dt(self.level);
        }
        self.remaining(self.progress(result))
    }

    /// Carry `anchor` forward unchanged once the run is over.
    pub fn hold(&self, result: &mut Cell, anchor: &Cell) -> i32 {
        self.seed_from(result, anchor);
        self.remaining(self.progress(anchor) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(grid: &GridParams, stages: u32) -> EvalContext<'_> {
        EvalContext {
            pos: GridPos::new(1, 2),
            anchor: Some(1),
            num_steps: 4,
            level: 0,
            width: 3,
            stages,
            grid,
        }
    }

    #[test]
    fn advance_counts_down_to_zero() {
        let grid = GridParams::default().with_points(16);
        let ctx = ctx(&grid, 1);
        let mut anchor = Cell::new(2, 16, 0).with_points([2.0], 3);
        let mut signals = Vec::new();
        for _ in 0..4 {
            let mut next = anchor.clone();
            signals.push(ctx.advance(&mut next, &anchor));
            anchor = next;
        }
        assert_eq!(signals, vec![3, 2, 1, 0]);
        assert_eq!(anchor.cycle, 4);
        assert!((anchor.time - 0.6).abs() < 1e-12);
        assert!(ctx.is_overdone(&anchor));

        let mut held = Cell::new(0, 0, 0);
        assert_eq!(ctx.hold(&mut held, &anchor), -1);
        assert_eq!(held.cycle, 4);
    }

    #[test]
    fn stages_advance_cycle_on_wrap() {
        let grid = GridParams::default();
        let ctx = ctx(&grid, 2);
        let anchor = Cell::new(0, 1, 0);
        let mut mid = anchor.clone();
        assert_eq!(ctx.advance(&mut mid, &anchor), 3);
        assert_eq!((mid.cycle, mid.iter), (0, 1));
        let mut full = mid.clone();
        assert_eq!(ctx.advance(&mut full, &mid), 2);
        assert_eq!((full.cycle, full.iter), (1, 0));
    }

    #[test]
    fn seed_drops_links_and_flag() {
        let grid = GridParams::default();
        let ctx = ctx(&grid, 1);
        let mut anchor = Cell::new(3, 9, 1).with_points([1.0, 1.5], 3);
        anchor.refine = true;
        anchor.links.overwrite = Some(strata_core::CellId::new(4, 0));
        let mut result = Cell::new(0, 0, 0);
        ctx.seed_from(&mut result, &anchor);
        assert_eq!(result.coords, anchor.coords);
        assert_eq!(result.level, 1);
        assert!(!result.refine);
        assert!(result.links.is_empty());
    }

    #[test]
    fn missing_anchor_is_shape_mismatch() {
        let grid = GridParams::default();
        let mut ctx = ctx(&grid, 1);
        ctx.anchor = None;
        let preds = vec![Arc::new(Cell::new(0, 1, 0))];
        match ctx.anchor_cell(&preds) {
            Err(KernelError::ShapeMismatch { .. }) => {}
            other => panic!("expected ShapeMismatch, got {other:?}"),
        }
    }
}
