//! Child mesh construction: fine point layout and initial cells.

use std::ops::Range;
use std::sync::Arc;

use smallvec::{smallvec, SmallVec};
use strata_core::{Cell, CellId, CrossLinks, EngineError};
use strata_kernel::{midpoint, AllocRequest, EvalContext, PointSet};

use super::bias::Bias;
use super::pointsearch::findpoint;
use crate::env::RunEnv;

/// Where a fine point's initial value comes from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum FineSource {
    /// Copied from coarse point `i`.
    Coarse(usize),
    /// Between coarse points `a` and `b`.
    Between(usize, usize),
}

/// One point of a child mesh.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct FinePoint {
    pub(crate) x: f64,
    pub(crate) source: FineSource,
}

/// Lay out the fine points for the coarse points `inner`, with one
/// midpoint between each pair of neighbours.
///
/// `inner` must leave at least one point on each side of `points`; those
/// outer points bound the midpoints at the ends.
pub(crate) fn fine_points(
    points: &PointSet<'_>,
    inner: Range<usize>,
    bias: Bias,
) -> Vec<FinePoint> {
    let coarse = |i: usize| FinePoint {
        x: points.coord(i),
        source: FineSource::Coarse(i),
    };
    let between = |a: usize, b: usize| FinePoint {
        x: 0.5 * (points.coord(a) + points.coord(b)),
        source: FineSource::Between(a, b),
    };

    let mut fine = Vec::with_capacity(bias.fine_points(inner.len()));
    if bias == Bias::Unbiased {
        fine.push(between(inner.start - 1, inner.start));
    }
    for i in inner {
        match bias {
            Bias::LeftBiased => {
                fine.push(between(i - 1, i));
                fine.push(coarse(i));
            }
            Bias::RightBiased | Bias::Unbiased => {
                fine.push(coarse(i));
                fine.push(between(i, i + 1));
            }
        }
    }
    fine
}

/// Allocate and fill the initial cells of a child mesh.
///
/// Cells hold `granularity` points each (the last may hold fewer). While
/// the coarse stencil is still at its initial data the kernel seeds the
/// cells itself; otherwise coarse points are copied and midpoints are
/// taken from a sibling refinement when one exists, or interpolated.
/// A cell whose midpoint came from a sibling also takes that fine
/// cell's cross-references (the first found, when it holds several).
pub(crate) fn alloc_child(
    env: &RunEnv,
    ctx: &EvalContext<'_>,
    preds: &[Arc<Cell>],
    points: &PointSet<'_>,
    fine: &[FinePoint],
) -> Result<Vec<CellId>, EngineError> {
    let arena = env.arena();
    let anchor = ctx.anchor_cell(preds).map_err(|e| env.kernel_failure(e))?;
    let seed = preds.iter().all(|p| p.cycle == 0 && p.iter == 0);
    let level = ctx.level + 1;
    let granularity = env.config.granularity.max(1);
    let columns = fine.len().div_ceil(granularity);

    let mut ids = Vec::with_capacity(columns);
    let fill = |column: usize, chunk: &[FinePoint]| -> Result<CellId, EngineError> {
        let coords: SmallVec<[f64; 4]> = chunk.iter().map(|p| p.x).collect();
        let mut links: Option<CrossLinks> = None;
        let payload: Option<Vec<f64>> = (!seed).then(|| {
            let mut payload = Vec::new();
            for p in chunk {
                let (values, found) = initial_value(env, preds, points, p, level);
                payload.extend_from_slice(&values);
                links = links.or(found);
            }
            payload
        });
        let request = AllocRequest {
            column,
            columns,
            row: 0,
            level,
            coords: &coords,
            grid: env.grid(),
            seed,
        };
        let id = env
            .kernel
            .alloc(arena, &request)
            .map_err(|e| env.kernel_failure(e))?;
        let time = anchor.time;
        let filled = arena.update(id, |cell| {
            cell.time = time;
            if let Some(payload) = payload {
                cell.payload = payload;
            }
            if let Some(links) = links {
                cell.links = links;
            }
        });
        if let Err(e) = filled {
            let _ = arena.free(id);
            return Err(e.into());
        }
        Ok(id)
    };

    for (column, chunk) in fine.chunks(granularity).enumerate() {
        match fill(column, chunk) {
            Ok(id) => ids.push(id),
            Err(e) => {
                arena.free_all(ids);
                return Err(e);
            }
        }
    }
    Ok(ids)
}

fn initial_value(
    env: &RunEnv,
    preds: &[Arc<Cell>],
    points: &PointSet<'_>,
    point: &FinePoint,
    level: u32,
) -> (SmallVec<[f64; 8]>, Option<CrossLinks>) {
    match point.source {
        FineSource::Coarse(i) => (points.value(i).iter().copied().collect(), None),
        FineSource::Between(a, b) => {
            let (left, _) = points.owner(a);
            let (right, _) = points.owner(b);
            let found = findpoint(env.arena(), &preds[left], &preds[right], point.x, level);
            env.metrics.search(found.is_some());
            match found {
                Some(found) => (found.values, Some(found.links)),
                None => {
                    let mut out: SmallVec<[f64; 8]> = smallvec![0.0; points.value(a).len()];
                    midpoint(points.value(a), points.value(b), &mut out);
                    (out, None)
                }
            }
        }
    }
}
