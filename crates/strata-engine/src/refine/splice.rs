//! Restriction of a child mesh's result onto the coarse cell, and the
//! cross-references that make the fine values findable afterwards.

use std::sync::Arc;

use strata_core::{Cell, CellId, EngineError};

use crate::env::RunEnv;
use crate::mesh::Harvest;

/// Copy the child's values onto `next`, link `next` to the child cell at
/// its coordinate and link that child cell to its neighbours.
///
/// The linked child cells (and whatever they reference) move into
/// `retained`; every other cell of the child run is freed.
pub(crate) fn splice(
    env: &RunEnv,
    next: &mut Cell,
    harvest: Harvest,
    retained: &mut Vec<CellId>,
) -> Result<(), EngineError> {
    let arena = env.arena();
    let Harvest {
        results,
        retained: child_retained,
    } = harvest;

    let spliced = restrict(env, next, &results).and_then(|t| {
        let left = t.checked_sub(1).map(|i| results[i]);
        let right = results.get(t + 1).copied();
        arena.update(results[t], |cell| {
            cell.links.left = left;
            cell.links.right = right;
        })?;
        next.links.overwrite = Some(results[t]);
        Ok(t)
    });
    let t = match spliced {
        Ok(t) => t,
        Err(e) => {
            arena.free_all(results.iter().chain(&child_retained).copied());
            return Err(e);
        }
    };

    let lo = t.saturating_sub(1);
    let hi = (t + 1).min(results.len() - 1);
    let keep = arena.closure(results[lo..=hi].iter().copied());
    let dropped = arena.free_all(
        results
            .iter()
            .chain(&child_retained)
            .copied()
            .filter(|id| !keep.contains(id)),
    );
    retained.extend(keep);
    env.metrics.refined();
    tracing::debug!(
        column = next.column,
        level = next.level,
        cycle = next.cycle,
        child_cells = results.len(),
        freed = dropped,
        "spliced child mesh"
    );
    Ok(())
}

/// Overwrite every point of `next` with the child point at the same
/// coordinate. Returns the index of the child cell holding `next`'s
/// first point.
fn restrict(env: &RunEnv, next: &mut Cell, results: &[CellId]) -> Result<usize, EngineError> {
    let arena = env.arena();
    let cells: Vec<Arc<Cell>> = results
        .iter()
        .map(|&id| arena.get(id))
        .collect::<Result<_, _>>()?;

    let mut target = None;
    for p in 0..next.num_points() {
        let x = next.coords[p];
        let (c, q) = cells
            .iter()
            .enumerate()
            .find_map(|(c, cell)| cell.find_coord(x).map(|q| (c, q)))
            .ok_or_else(|| EngineError::invalid(format!("fine point at x={x}")))?;
        let src = cells[c].point(q);
        let dst = next.point_mut(p);
        if src.len() != dst.len() {
            return Err(EngineError::invalid(format!(
                "fine point at x={x} holds {} values, coarse point {}",
                src.len(),
                dst.len()
            )));
        }
        dst.copy_from_slice(src);
        target.get_or_insert(c);
    }
    target.ok_or_else(|| EngineError::invalid("refined cell without points"))
}
