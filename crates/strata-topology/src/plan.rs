//! The immutable port-wiring plan.

use smallvec::SmallVec;
use strata_core::GridPos;

use crate::error::TopologyError;
use crate::shape::MeshShape;
use crate::width::StencilWidth;

/// One input of a node: the output port `port` of node `(row, column)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PortSource {
    /// Source row.
    pub row: usize,
    /// Source column.
    pub column: usize,
    /// Output port index on the source node.
    pub port: usize,
}

/// One output of a node: input port `input` of node `(row, column)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PortTarget {
    /// Destination row.
    pub row: usize,
    /// Destination column.
    pub column: usize,
    /// Input port index on the destination node.
    pub input: usize,
}

/// Wiring of a single node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeWiring {
    /// Inputs in port order: descending source row, then ascending
    /// source column.
    pub inputs: SmallVec<[PortSource; 9]>,
    /// Outputs in port order (the order the source enumerated them).
    pub outputs: SmallVec<[PortTarget; 9]>,
    /// Input port fed by the node's own column, if any.
    pub anchor: Option<usize>,
}

impl NodeWiring {
    /// Number of input ports.
    pub fn in_degree(&self) -> usize {
        self.inputs.len()
    }

    /// Number of output ports.
    pub fn out_degree(&self) -> usize {
        self.outputs.len()
    }
}

/// Immutable table of every port connection in a mesh.
///
/// Built once per mesh instantiation. Kernels index predecessor sets by
/// position, so the input order is part of the contract and is
/// reproduced exactly by [`WiringPlan::build`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WiringPlan {
    width: StencilWidth,
    nodes: Vec<Vec<NodeWiring>>,
}

impl WiringPlan {
    /// Compute the plan for `shape`.
    pub fn build(shape: &MeshShape) -> Result<Self, TopologyError> {
        shape.validate()?;
        let rows = shape.rows();
        let mut nodes: Vec<Vec<NodeWiring>> = shape
            .row_sizes()
            .iter()
            .map(|&n| vec![NodeWiring::default(); n])
            .collect();
        let mut out_counts: Vec<Vec<usize>> =
            shape.row_sizes().iter().map(|&n| vec![0; n]).collect();

        // Enumerate sources in (row, column) order; each source numbers its
        // output ports in the order it discovers destinations.
        for row in 0..rows {
            for column in 0..shape.row_size(row) {
                let dst = shape.destination_row(row, column);
                for target in shape.neighbor_columns(row, column) {
                    if target >= shape.row_size(dst) {
                        continue;
                    }
                    let port = out_counts[row][column];
                    out_counts[row][column] += 1;
                    nodes[dst][target].inputs.push(PortSource { row, column, port });
                }
            }
        }

        for (row, row_nodes) in nodes.iter_mut().enumerate() {
            for (column, node) in row_nodes.iter_mut().enumerate() {
                if node.inputs.is_empty() {
                    return Err(TopologyError::Unreachable { row, column });
                }
                node.inputs.sort_by(|a, b| {
                    b.row.cmp(&a.row).then_with(|| a.column.cmp(&b.column))
                });
                node.anchor = node.inputs.iter().position(|s| s.column == column);
            }
        }

        // Invert the inputs into per-source output tables.
        let mut outputs: Vec<Vec<Vec<Option<PortTarget>>>> = out_counts
            .iter()
            .map(|r| r.iter().map(|&n| vec![None; n]).collect())
            .collect();
        for (row, row_nodes) in nodes.iter().enumerate() {
            for (column, node) in row_nodes.iter().enumerate() {
                for (input, src) in node.inputs.iter().enumerate() {
                    outputs[src.row][src.column][src.port] =
                        Some(PortTarget { row, column, input });
                }
            }
        }
        for (row, row_outputs) in outputs.into_iter().enumerate() {
            for (column, ports) in row_outputs.into_iter().enumerate() {
                nodes[row][column].outputs = ports.into_iter().flatten().collect();
            }
        }

        Ok(Self {
            width: shape.width(),
            nodes,
        })
    }

    /// Stencil width the plan was built for.
    pub fn width(&self) -> StencilWidth {
        self.width
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.nodes.len()
    }

    /// Columns in `row`.
    pub fn row_size(&self, row: usize) -> usize {
        self.nodes[row].len()
    }

    /// Total node count.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().map(Vec::len).sum()
    }

    /// Total number of port connections.
    pub fn edge_count(&self) -> usize {
        self.iter().map(|(_, n)| n.in_degree()).sum()
    }

    /// Wiring of the node at `pos`.
    pub fn node(&self, pos: GridPos) -> Option<&NodeWiring> {
        self.nodes.get(pos.row)?.get(pos.column)
    }

    /// All nodes in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (GridPos, &NodeWiring)> + '_ {
        self.nodes.iter().enumerate().flat_map(|(row, r)| {
            r.iter()
                .enumerate()
                .map(move |(column, n)| (GridPos::new(row, column), n))
        })
    }

    /// Canonical little-endian encoding, used to compare plans byte for
    /// byte.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.edge_count() * 24);
        let mut put = |v: usize| out.extend_from_slice(&(v as u64).to_le_bytes());
        put(self.width.get());
        put(self.rows());
        for row in &self.nodes {
            put(row.len());
            for node in row {
                put(node.inputs.len());
                for s in &node.inputs {
                    put(s.row);
                    put(s.column);
                    put(s.port);
                }
                put(node.outputs.len());
                put(node.anchor.map_or(usize::MAX, |a| a));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::LevelLayout;

    fn nine_by_five() -> WiringPlan {
        let shape = MeshShape::uniform(3, 9, StencilWidth::FIVE).unwrap();
        WiringPlan::build(&shape).unwrap()
    }

    #[test]
    fn interior_node_reads_full_stencil() {
        let plan = nine_by_five();
        let node = plan.node(GridPos::new(1, 4)).unwrap();
        let cols: Vec<_> = node.inputs.iter().map(|s| s.column).collect();
        assert_eq!(cols, vec![2, 3, 4, 5, 6]);
        assert!(node.inputs.iter().all(|s| s.row == 0));
        assert_eq!(node.anchor, Some(2));
        assert_eq!(node.out_degree(), 5);
    }

    #[test]
    fn boundary_nodes_are_clipped() {
        let plan = nine_by_five();
        let left = plan.node(GridPos::new(0, 0)).unwrap();
        assert_eq!(left.in_degree(), 3);
        assert_eq!(left.anchor, Some(0));
        assert!(left.inputs.iter().all(|s| s.row == 2));
        let near = plan.node(GridPos::new(0, 7)).unwrap();
        assert_eq!(near.in_degree(), 4);
        assert_eq!(near.anchor, Some(2));
    }

    #[test]
    fn output_ports_number_destinations_left_to_right() {
        let plan = nine_by_five();
        let src = plan.node(GridPos::new(0, 4)).unwrap();
        let targets: Vec<_> = src.outputs.iter().map(|t| (t.row, t.column)).collect();
        assert_eq!(targets, vec![(1, 2), (1, 3), (1, 4), (1, 5), (1, 6)]);
        // Source port p feeds the input whose PortSource names port p.
        for (port, t) in src.outputs.iter().enumerate() {
            let dst = plan.node(GridPos::new(t.row, t.column)).unwrap();
            let s = dst.inputs[t.input];
            assert_eq!((s.row, s.column, s.port), (0, 4, port));
        }
    }

    #[test]
    fn edge_count_balances() {
        let plan = nine_by_five();
        let outs: usize = plan.iter().map(|(_, n)| n.out_degree()).sum();
        assert_eq!(outs, plan.edge_count());
        // Per row: 5 interior-ish nodes + clipped edges = 3+4+5*5+4+3.
        assert_eq!(plan.edge_count(), 3 * 39);
    }

    #[test]
    fn building_twice_is_byte_identical() {
        let a = nine_by_five();
        let b = nine_by_five();
        assert_eq!(a, b);
        assert_eq!(a.encode(), b.encode());
    }

    #[test]
    fn layered_seam_is_crossed_only_from_block_start_rows() {
        let layout = LevelLayout::from_counts(vec![10, 15]).unwrap();
        let shape = MeshShape::layered(layout, 3, StencilWidth::THREE).unwrap();
        let plan = WiringPlan::build(&shape).unwrap();
        assert_eq!(plan.rows(), 6);
        assert_eq!(plan.row_size(0), 17);
        assert_eq!(plan.row_size(3), 15);

        // Row 0 starts a block, so row 1 reads across the 14|15 seam.
        let node = plan.node(GridPos::new(1, 15)).unwrap();
        let srcs: Vec<_> = node.inputs.iter().map(|s| (s.row, s.column)).collect();
        assert_eq!(srcs, vec![(0, 14), (0, 15), (0, 16)]);
        assert_eq!(node.anchor, Some(1));

        // Row 2 does not; coarse columns skip the fine rows to row 0.
        let node = plan.node(GridPos::new(2, 15)).unwrap();
        let srcs: Vec<_> = node.inputs.iter().map(|s| (s.row, s.column)).collect();
        assert_eq!(srcs, vec![(1, 15), (1, 16)]);
        let node = plan.node(GridPos::new(0, 15)).unwrap();
        let srcs: Vec<_> = node.inputs.iter().map(|s| (s.row, s.column)).collect();
        assert_eq!(srcs, vec![(2, 15), (2, 16)]);
    }

    #[test]
    fn mixed_source_rows_sort_descending_then_by_column() {
        // One row per level: every row starts a block, and coarse columns
        // of row 0 wrap back into row 0.
        let layout = LevelLayout::from_counts(vec![10, 15]).unwrap();
        let shape = MeshShape::layered(layout, 1, StencilWidth::THREE).unwrap();
        let plan = WiringPlan::build(&shape).unwrap();
        let node = plan.node(GridPos::new(0, 14)).unwrap();
        let srcs: Vec<_> = node.inputs.iter().map(|s| (s.row, s.column)).collect();
        assert_eq!(srcs, vec![(1, 13), (1, 14), (0, 15)]);
        assert_eq!(node.anchor, Some(1));
    }

    // ── Property tests ──────────────────────────────────────────

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn width_strategy() -> impl Strategy<Value = StencilWidth> {
            prop_oneof![Just(3usize), Just(5), Just(7), Just(9)]
                .prop_map(|w| StencilWidth::new(w).unwrap())
        }

        proptest! {
            #[test]
            fn inputs_sorted_and_ports_consistent(
                rows in 2usize..6,
                columns in 1usize..24,
                width in width_strategy(),
            ) {
                let shape = MeshShape::uniform(rows, columns, width).unwrap();
                let plan = WiringPlan::build(&shape).unwrap();
                for (pos, node) in plan.iter() {
                    prop_assert!(node.in_degree() >= 1);
                    prop_assert!(node.in_degree() <= width.get());
                    prop_assert!(node.anchor.is_some());
                    for pair in node.inputs.windows(2) {
                        let ordered = pair[0].row > pair[1].row
                            || (pair[0].row == pair[1].row && pair[0].column < pair[1].column);
                        prop_assert!(ordered);
                    }
                    for (port, t) in node.outputs.iter().enumerate() {
                        let dst = plan.node(GridPos::new(t.row, t.column)).unwrap();
                        let s = dst.inputs[t.input];
                        prop_assert_eq!((s.row, s.column, s.port), (pos.row, pos.column, port));
                    }
                }
            }

            #[test]
            fn build_is_deterministic(
                rows in 2usize..6,
                columns in 1usize..24,
                width in width_strategy(),
            ) {
                let shape = MeshShape::uniform(rows, columns, width).unwrap();
                let a = WiringPlan::build(&shape).unwrap();
                let b = WiringPlan::build(&shape).unwrap();
                prop_assert_eq!(a.encode(), b.encode());
            }
        }
    }
}
