//! Multi-level row metadata for statically refined meshes.

use std::ops::Range;

use crate::error::TopologyError;

/// Column layout of a mesh whose rows hold several refinement levels.
///
/// Columns are ordered finest level first: level `L` (the finest) owns
/// columns `0..nx[L]`, and each coarser level appends the points it does
/// not share with the level below it. Row blocks alternate between
/// levels so finer columns are updated more often than coarse ones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelLayout {
    nx: Vec<usize>,
    rowsize: Vec<usize>,
    level_begin: Vec<usize>,
    level_end: Vec<usize>,
}

impl LevelLayout {
    /// Build the layout from per-level point counts, coarsest first.
    ///
    /// `rowsize[j] = nx[L] + Σ_{i=j}^{L-1} (nx[i] - (nx[i+1] + 1) / 2)`:
    /// a row at level `j` holds every column at level `j` or finer.
    pub fn from_counts(nx: Vec<usize>) -> Result<Self, TopologyError> {
        if nx.is_empty() {
            return Err(TopologyError::LevelTableMismatch {
                reason: "at least one level is required".into(),
            });
        }
        if let Some(level) = nx.iter().position(|&n| n == 0) {
            return Err(TopologyError::LevelTableMismatch {
                reason: format!("level {level} has no points"),
            });
        }
        let top = nx.len() - 1;
        let mut rowsize = vec![0usize; nx.len()];
        rowsize[top] = nx[top];
        for j in (0..top).rev() {
            let shared = (nx[j + 1] + 1) / 2;
            let own = nx[j].checked_sub(shared).ok_or_else(|| {
                TopologyError::LevelTableMismatch {
                    reason: format!(
                        "level {j} has {} points but level {} overlaps {shared} of them",
                        nx[j],
                        j + 1
                    ),
                }
            })?;
            rowsize[j] = rowsize[j + 1] + own;
        }
        let level_begin = (0..=top)
            .map(|j| if j == top { 0 } else { rowsize[j + 1] })
            .collect();
        let level_end = rowsize.clone();
        Ok(Self {
            nx,
            rowsize,
            level_begin,
            level_end,
        })
    }

    /// Counts grown by a fixed ratio per level:
    /// `nx[i] = floor(ratio * nx[i - 1])`.
    pub fn geometric(nx0: usize, max_level: usize, ratio: f64) -> Result<Self, TopologyError> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(TopologyError::LevelTableMismatch {
                reason: format!("refinement ratio must be finite and positive, got {ratio}"),
            });
        }
        let mut nx = Vec::with_capacity(max_level + 1);
        nx.push(nx0);
        for i in 1..=max_level {
            nx.push((ratio * nx[i - 1] as f64) as usize);
        }
        Self::from_counts(nx)
    }

    /// Finest level index (`L`).
    pub fn max_level(&self) -> usize {
        self.nx.len() - 1
    }

    /// Points per level, coarsest first.
    pub fn counts(&self) -> &[usize] {
        &self.nx
    }

    /// Columns in a row at `level` (that level and everything finer).
    pub fn row_size(&self, level: usize) -> usize {
        self.rowsize[level]
    }

    /// Columns owned by `level`.
    pub fn level_range(&self, level: usize) -> Range<usize> {
        self.level_begin[level]..self.level_end[level]
    }

    /// Level owning `column`, if the column exists.
    pub fn level_of_column(&self, column: usize) -> Option<usize> {
        (0..self.nx.len()).find(|&j| self.level_range(j).contains(&column))
    }

    /// Number of rows for this layout: `rows_per_level * 2^L`.
    pub fn row_count(&self, rows_per_level: usize) -> usize {
        rows_per_level << self.max_level()
    }

    /// Level of every row.
    ///
    /// Block `b` (rows `b * rows_per_level ..`) runs at level `L - j` for
    /// the largest `j` with `b % 2^j == 0`, so block 0 is the full coarse
    /// row and odd blocks touch only the finest level.
    pub fn row_levels(&self, rows_per_level: usize) -> Vec<usize> {
        let top = self.max_level();
        let blocks = 1usize << top;
        let mut levels = Vec::with_capacity(blocks * rows_per_level);
        for b in 0..blocks {
            let j = (0..=top).rev().find(|&j| b % (1 << j) == 0).unwrap_or(0);
            levels.extend(std::iter::repeat(top - j).take(rows_per_level));
        }
        levels
    }

    /// Columns in every row.
    pub fn row_sizes(&self, rows_per_level: usize) -> Vec<usize> {
        self.row_levels(rows_per_level)
            .into_iter()
            .map(|level| self.rowsize[level])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_level_is_uniform() {
        let layout = LevelLayout::from_counts(vec![11]).unwrap();
        assert_eq!(layout.max_level(), 0);
        assert_eq!(layout.row_size(0), 11);
        assert_eq!(layout.level_range(0), 0..11);
        assert_eq!(layout.row_sizes(3), vec![11, 11, 11]);
    }

    #[test]
    fn two_levels_put_fine_columns_first() {
        // rowsize[1] = 15; rowsize[0] = 15 + 10 - 8 = 17.
        let layout = LevelLayout::from_counts(vec![10, 15]).unwrap();
        assert_eq!(layout.row_size(1), 15);
        assert_eq!(layout.row_size(0), 17);
        assert_eq!(layout.level_range(1), 0..15);
        assert_eq!(layout.level_range(0), 15..17);
        assert_eq!(layout.level_of_column(3), Some(1));
        assert_eq!(layout.level_of_column(16), Some(0));
        assert_eq!(layout.level_of_column(17), None);
        assert_eq!(layout.row_count(3), 6);
        assert_eq!(layout.row_sizes(3), vec![17, 17, 17, 15, 15, 15]);
    }

    #[test]
    fn three_level_block_schedule() {
        let layout = LevelLayout::from_counts(vec![8, 12, 18]).unwrap();
        assert_eq!(layout.row_levels(1), vec![0, 2, 1, 2]);
    }

    #[test]
    fn geometric_counts_truncate() {
        let layout = LevelLayout::geometric(11, 2, 1.5).unwrap();
        assert_eq!(layout.counts(), &[11, 16, 24]);
    }

    #[test]
    fn rejects_bad_tables() {
        assert!(LevelLayout::from_counts(vec![]).is_err());
        assert!(LevelLayout::from_counts(vec![4, 0]).is_err());
        // A coarse level cannot be smaller than half its child.
        match LevelLayout::from_counts(vec![2, 10]) {
            Err(TopologyError::LevelTableMismatch { .. }) => {}
            other => panic!("expected LevelTableMismatch, got {other:?}"),
        }
        assert!(LevelLayout::geometric(4, 1, f64::NAN).is_err());
    }
}
