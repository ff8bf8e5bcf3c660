//! Mesh shape: rows, columns per row, stencil width, level metadata.

use std::ops::RangeInclusive;

use crate::error::TopologyError;
use crate::levels::LevelLayout;
use crate::width::StencilWidth;

/// Everything the topology builder needs to know about a mesh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshShape {
    row_sizes: Vec<usize>,
    width: StencilWidth,
    rows_per_level: usize,
    layout: Option<LevelLayout>,
}

impl MeshShape {
    /// `rows` rows of `columns` columns each.
    pub fn uniform(
        rows: usize,
        columns: usize,
        width: StencilWidth,
    ) -> Result<Self, TopologyError> {
        if rows == 0 || columns == 0 {
            return Err(TopologyError::EmptyMesh);
        }
        if rows < 2 {
            return Err(TopologyError::TooFewRows { rows });
        }
        Ok(Self {
            row_sizes: vec![columns; rows],
            width,
            rows_per_level: rows,
            layout: None,
        })
    }

    /// Rows sized by a [`LevelLayout`]: `rows_per_level * 2^L` rows.
    pub fn layered(
        layout: LevelLayout,
        rows_per_level: usize,
        width: StencilWidth,
    ) -> Result<Self, TopologyError> {
        if rows_per_level == 0 {
            return Err(TopologyError::EmptyMesh);
        }
        let rows = layout.row_count(rows_per_level);
        if rows < 2 {
            return Err(TopologyError::TooFewRows { rows });
        }
        Ok(Self {
            row_sizes: layout.row_sizes(rows_per_level),
            width,
            rows_per_level,
            layout: Some(layout),
        })
    }

    /// Number of rows (time lanes).
    pub fn rows(&self) -> usize {
        self.row_sizes.len()
    }

    /// Columns in `row`.
    pub fn row_size(&self, row: usize) -> usize {
        self.row_sizes[row]
    }

    /// Columns in every row.
    pub fn row_sizes(&self) -> &[usize] {
        &self.row_sizes
    }

    /// Total node count.
    pub fn node_count(&self) -> usize {
        self.row_sizes.iter().sum()
    }

    /// Stencil width.
    pub fn width(&self) -> StencilWidth {
        self.width
    }

    /// Rows per row block.
    pub fn rows_per_level(&self) -> usize {
        self.rows_per_level
    }

    /// Level metadata, if the mesh mixes refinement levels.
    pub fn layout(&self) -> Option<&LevelLayout> {
        self.layout.as_ref()
    }

    /// Row fed by column `column` of `row`.
    ///
    /// Normally the next row (wrapping to 0). A column missing from the
    /// next row skips to the first later row that has it, or to row 0.
    pub fn destination_row(&self, row: usize, column: usize) -> usize {
        let next = (row + 1) % self.rows();
        if column < self.row_sizes[next] {
            return next;
        }
        (row + 1..self.rows())
            .find(|&j| column < self.row_sizes[j])
            .unwrap_or(0)
    }

    /// Columns of `destination` fed by `(row, column)`, before clipping to
    /// the destination row.
    ///
    /// Rows that start a row block (and every row of a single-level mesh)
    /// reach across levels; other rows stay inside the column's own level.
    pub fn neighbor_columns(&self, row: usize, column: usize) -> RangeInclusive<usize> {
        let half = self.width.half();
        let mut lo = column.saturating_sub(half);
        let mut hi = (column + half).min(self.row_sizes[row] - 1);
        if let Some(layout) = &self.layout {
            let block_start = row % self.rows_per_level == 0;
            if !block_start && layout.max_level() > 0 {
                if let Some(level) = layout.level_of_column(column) {
                    let range = layout.level_range(level);
                    lo = lo.max(range.start);
                    hi = hi.min(range.end.saturating_sub(1));
                }
            }
        }
        lo..=hi
    }

    pub(crate) fn validate(&self) -> Result<(), TopologyError> {
        if self.row_sizes.is_empty() {
            return Err(TopologyError::EmptyMesh);
        }
        if let Some(row) = self.row_sizes.iter().position(|&n| n == 0) {
            return Err(TopologyError::EmptyRow { row });
        }
        Ok(())
    }
}
