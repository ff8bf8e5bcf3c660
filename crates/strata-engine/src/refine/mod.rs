//! The adaptive refinement engine.
//!
//! Called from a node's control loop when its kernel flags a cell. The
//! engine builds a child mesh at twice the spatial and temporal
//! resolution around the node's stencil, runs it to completion on the
//! same object service, restricts the result back onto the coarse cell
//! and links the fine cells so sibling refinements can find them.
//!
//! ```text
//! preds  P0 │ P1  P2  P3 │ P4        (width 5, inner cells P1..P3)
//! child       q1 · q2 · q3 ·         (right-biased: · = midpoint)
//! ```

mod bias;
mod build;
mod pointsearch;
mod splice;

use std::sync::Arc;

use indexmap::IndexMap;
use strata_core::{Cell, CellId, EngineError};
use strata_kernel::{EvalContext, PointSet};
use strata_topology::{MeshShape, WiringPlan};

pub use bias::Bias;
pub use pointsearch::{findpoint, Found, MAX_HOPS};

use crate::config::ConfigError;
use crate::env::RunEnv;
use crate::mesh::MeshRun;

/// Replace `next` with the restriction of a child mesh run over `preds`.
///
/// `plans` caches child wiring plans by column count for the lifetime
/// of the calling node; `retained` collects the fine cells `next` now
/// references.
pub(crate) fn refine(
    env: &RunEnv,
    plans: &mut IndexMap<usize, Arc<WiringPlan>>,
    retained: &mut Vec<CellId>,
    next: &mut Cell,
    preds: &[Arc<Cell>],
    ctx: &EvalContext<'_>,
) -> Result<(), EngineError> {
    let m = ctx
        .anchor
        .filter(|&m| m >= 1 && m + 1 < preds.len())
        .ok_or_else(|| EngineError::invalid(format!("centred stencil at {}", ctx.pos)))?;
    let bias = Bias::choose(
        preds[m - 1].refine,
        preds[m + 1].refine,
        ctx.pos.row,
        ctx.level,
        env.config.rows_per_level,
    );

    let points = PointSet::gather(preds);
    let lo = preds[0].num_points();
    let hi = points.len() - preds[preds.len() - 1].num_points();
    if lo == 0 || hi <= lo || hi >= points.len() {
        return Err(EngineError::invalid(format!(
            "stencil at {} has empty boundary cells",
            ctx.pos
        )));
    }
    let fine = build::fine_points(&points, lo..hi, bias);
    let initial = build::alloc_child(env, ctx, preds, &points, &fine)?;

    let plan = match child_plan(env, plans, initial.len()) {
        Ok(plan) => plan,
        Err(e) => {
            env.arena().free_all(initial);
            return Err(e);
        }
    };
    tracing::debug!(
        pos = %ctx.pos,
        level = ctx.level,
        ?bias,
        fine_points = fine.len(),
        "refining"
    );
    env.metrics.child_mesh();
    let run = MeshRun {
        env: env.clone(),
        plan,
        num_steps: 2 * ctx.stages.max(1),
        level: ctx.level + 1,
        timeout: None,
    }
    .run(&initial);
    env.arena().free_all(initial);
    splice::splice(env, next, run?, retained)
}

fn child_plan(
    env: &RunEnv,
    plans: &mut IndexMap<usize, Arc<WiringPlan>>,
    columns: usize,
) -> Result<Arc<WiringPlan>, EngineError> {
    if let Some(plan) = plans.get(&columns) {
        return Ok(Arc::clone(plan));
    }
    let shape = MeshShape::uniform(env.config.rows_per_level, columns, env.config.width()?)
        .map_err(ConfigError::from)?;
    let plan = Arc::new(WiringPlan::build(&shape).map_err(ConfigError::from)?);
    plans.insert(columns, Arc::clone(&plan));
    Ok(plan)
}
