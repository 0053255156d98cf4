use crate::config::LayoutParameters;
use crate::graph::{CellId, Graph};

use super::LayoutContext;
use super::block::{Block, BlockKind, Orientation, PrimaryVariant};
use super::cell::{Cell, CellDirection, CellKind, InternShape, Side};
use super::error::LayoutError;

/// Bottom-up integer sizing of every block tree, cell ordering along the
/// buses, and the left-to-right slot cursor.
pub(super) fn assign_positions(
    graph: &Graph,
    cells: &mut [Cell],
    params: &LayoutParameters,
    _ctx: &mut LayoutContext,
) -> Result<(), LayoutError> {
    for cell in cells.iter_mut() {
        if cell.kind == CellKind::Intern && cell.shape == Some(InternShape::MaybeFlat) {
            let flat = buses_adjacent(graph, cell);
            cell.shape = Some(if flat {
                InternShape::Flat
            } else {
                InternShape::Crossover
            });
            cell.direction = if flat {
                CellDirection::Flat
            } else {
                CellDirection::Middle
            };
        }
    }

    let mut ranked: Vec<usize> = (0..cells.len())
        .filter(|&i| cells[i].kind != CellKind::Shunt)
        .collect();
    ranked.sort_by_key(|&i| order_key(graph, &cells[i]));
    for (rank, &i) in ranked.iter().enumerate() {
        cells[i].order = Some(rank as i64);
    }

    // Re-orient shunt bridges (before sizing, which assigns the glue
    // offsets) so LEFT's bus order precedes RIGHT's.
    for i in 0..cells.len() {
        if cells[i].kind != CellKind::Shunt {
            continue;
        }
        let Some(link) = cells[i].shunt else { continue };
        let left_order = cells[link.left.0].order.unwrap_or(i64::MAX);
        let right_order = cells[link.right.0].order.unwrap_or(i64::MAX);
        if left_order > right_order {
            cells[i].reverse_shunt();
            let link = cells[i].shunt.expect("shunt link survives reversal");
            cells[link.left.0].shunt_partner = Some((CellId(i), Side::Left));
            cells[link.right.0].shunt_partner = Some((CellId(i), Side::Right));
        }
    }

    for cell in cells.iter_mut() {
        let orientation = match cell.kind {
            CellKind::Shunt => Orientation::Horizontal,
            CellKind::Intern if cell.shape == Some(InternShape::Flat) => Orientation::Horizontal,
            _ => Orientation::Vertical,
        };
        let root = cell.root.as_mut().expect("cell root block not organized");
        sizing(root, orientation)?;
    }

    let mut cursor: i32 = 0;
    for &i in &ranked {
        let mut offset = cursor;
        if let Some((shunt_id, Side::Right)) = cells[i].shunt_partner {
            if let Some(link) = cells[shunt_id.0].shunt {
                let left = &cells[link.left.0];
                let left_end = left.h_offset + left.slot_width();
                offset = offset.max(left_end + cells[shunt_id.0].bridge_length());
            }
        }
        cells[i].h_offset = offset;
        let slots = cells[i].slot_width().max(1);
        if let Some(root) = cells[i].root.as_mut() {
            root.position.h.shift = offset;
        }
        cursor = offset + slots;
    }
    Ok(())
}

fn buses_adjacent(graph: &Graph, cell: &Cell) -> bool {
    if cell.bus_nodes.len() != 2 {
        return false;
    }
    let a = graph.node(cell.bus_nodes[0]).bus;
    let b = graph.node(cell.bus_nodes[1]).bus;
    match (a, b) {
        (Some(a), Some(b)) => {
            a.busbar_index == b.busbar_index && a.section_index.abs_diff(b.section_index) == 1
        }
        _ => false,
    }
}

/// Cells rank by explicit feeder order first, then by the position of their
/// first bus, then by detection index.
fn order_key(graph: &Graph, cell: &Cell) -> (i64, (usize, usize), usize) {
    let feeder_order = cell
        .nodes
        .iter()
        .filter_map(|n| graph.node(*n).feeder.map(|f| f.order as i64))
        .min()
        .unwrap_or(i64::MAX);
    let bus = cell
        .bus_nodes
        .iter()
        .filter_map(|n| graph.node(*n).bus)
        .map(|b| (b.busbar_index, b.section_index))
        .min()
        .unwrap_or((usize::MAX, usize::MAX));
    (feeder_order, bus, cell.index)
}

/// Recursive span computation. Vertical blocks: serial glues on V and
/// envelopes on H, parallel glues on H and envelopes on V; horizontal
/// blocks transpose the roles. Children's offsets in the glue dimension are
/// contiguous, children reset to zero in the envelope dimension.
pub(super) fn sizing(block: &mut Block, orientation: Orientation) -> Result<(), LayoutError> {
    block.position.orientation = orientation;
    match &mut block.kind {
        BlockKind::Primary(primary) => {
            let nodes = primary.nodes.len() as i32;
            match orientation {
                Orientation::Vertical => {
                    block.position.h.span = 1;
                    block.position.v.span = match primary.variant {
                        PrimaryVariant::Feeder => 0,
                        _ if primary.stacked => 0,
                        _ => (nodes - 2).max(0),
                    };
                }
                Orientation::Horizontal => {
                    block.position.h.span = 2 * (nodes - 1);
                    block.position.v.span = 0;
                }
            }
        }
        BlockKind::Serial(serial) => {
            let mut glue = 0;
            let mut envelope = 0;
            for sub in &mut serial.subs {
                sizing(sub, orientation)?;
                match orientation {
                    Orientation::Vertical => {
                        sub.position.v.value = glue;
                        sub.position.h.value = 0;
                        glue += sub.position.v.span;
                        envelope = envelope.max(sub.position.h.span);
                    }
                    Orientation::Horizontal => {
                        sub.position.h.value = glue;
                        sub.position.v.value = 0;
                        glue += sub.position.h.span;
                        envelope = envelope.max(sub.position.v.span);
                    }
                }
            }
            match orientation {
                Orientation::Vertical => {
                    block.position.v.span = glue;
                    block.position.h.span = envelope;
                }
                Orientation::Horizontal => {
                    block.position.h.span = glue;
                    block.position.v.span = envelope;
                }
            }
        }
        BlockKind::Parallel(parallel) => {
            let mut glue = 0;
            let mut envelope = 0;
            for sub in &mut parallel.subs {
                sizing(sub, orientation)?;
                match orientation {
                    Orientation::Vertical => {
                        sub.position.h.value = glue;
                        sub.position.v.value = 0;
                        glue += sub.position.h.span;
                        envelope = envelope.max(sub.position.v.span);
                    }
                    Orientation::Horizontal => {
                        sub.position.v.value = glue;
                        sub.position.h.value = 0;
                        glue += sub.position.v.span;
                        envelope = envelope.max(sub.position.h.span);
                    }
                }
            }
            match orientation {
                Orientation::Vertical => {
                    block.position.h.span = glue;
                    block.position.v.span = envelope;
                }
                Orientation::Horizontal => {
                    block.position.v.span = glue;
                    block.position.h.span = envelope;
                }
            }
        }
        BlockKind::Undefined(undefined) => {
            if orientation == Orientation::Horizontal {
                return Err(LayoutError::UnsupportedHorizontalLayout);
            }
            let mut h = 0;
            let mut v = 0;
            for sub in &mut undefined.subs {
                sizing(sub, orientation)?;
                sub.position.h.value = 0;
                sub.position.v.value = 0;
                h = h.max(sub.position.h.span);
                v = v.max(sub.position.v.span);
            }
            block.position.h.span = h;
            block.position.v.span = v;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FeederDirection, Graph, NodeKind};

    #[test]
    fn serial_chain_sizes_to_one_by_two() {
        let mut graph = Graph::new();
        let bus = graph.add_bus("bus", 0, 0);
        let d = graph.add_node("d", NodeKind::Switch);
        let f1 = graph.add_node("f1", NodeKind::Fictitious);
        let b = graph.add_node("b", NodeKind::Switch);
        let f2 = graph.add_node("f2", NodeKind::Fictitious);
        let load = graph.add_feeder("load", 0, FeederDirection::Top);
        graph.add_edge(bus, d);
        graph.add_edge(d, f1);
        graph.add_edge(f1, b);
        graph.add_edge(b, f2);
        graph.add_edge(f2, load);

        let leg = Block::leg_primary(&graph, vec![bus, d, f1]).unwrap();
        let body = Block::body_primary(&graph, vec![f1, b, f2]).unwrap();
        let feeder = Block::feeder_primary(&graph, vec![f2, load]).unwrap();
        let mut serial = Block::serial(&graph, vec![leg, body, feeder]).unwrap();
        sizing(&mut serial, Orientation::Vertical).unwrap();
        assert_eq!(serial.position.h.span, 1);
        assert_eq!(serial.position.v.span, 2);
    }

    #[test]
    fn composite_spans_follow_glue_and_envelope() {
        let mut graph = Graph::new();
        let bus = graph.add_bus("bus", 0, 0);
        let d1 = graph.add_node("d1", NodeKind::Switch);
        let d2 = graph.add_node("d2", NodeKind::Switch);
        let f = graph.add_node("f", NodeKind::Fictitious);
        graph.add_edge(bus, d1);
        graph.add_edge(d1, f);
        graph.add_edge(bus, d2);
        graph.add_edge(d2, f);

        let a = Block::leg_primary(&graph, vec![bus, d1, f]).unwrap();
        let b = Block::leg_primary(&graph, vec![bus, d2, f]).unwrap();
        let mut group = Block::parallel(&graph, vec![a, b], true).unwrap();
        sizing(&mut group, Orientation::Vertical).unwrap();
        // glue dimension is the sum with contiguous offsets
        assert_eq!(group.position.h.span, 2);
        let BlockKind::Parallel(p) = &group.kind else {
            panic!("expected parallel");
        };
        assert_eq!(p.subs[0].position.h.value, 0);
        assert_eq!(p.subs[1].position.h.value, 1);
        // stacked legs collapse vertically, the group envelopes them
        assert_eq!(group.position.v.span, 0);
        assert!(p.subs.iter().all(|s| s.position.v.span == 0));
    }

    #[test]
    fn undefined_block_refuses_horizontal_layout() {
        let mut graph = Graph::new();
        let f1 = graph.add_node("f1", NodeKind::Fictitious);
        let s = graph.add_node("s", NodeKind::Switch);
        let f2 = graph.add_node("f2", NodeKind::Fictitious);
        graph.add_edge(f1, s);
        graph.add_edge(s, f2);
        let body = Block::body_primary(&graph, vec![f1, s, f2]).unwrap();
        let mut undefined = Block::undefined(vec![body]);
        assert!(matches!(
            sizing(&mut undefined, Orientation::Horizontal),
            Err(LayoutError::UnsupportedHorizontalLayout)
        ));
        assert!(sizing(&mut undefined, Orientation::Vertical).is_ok());
    }

    #[test]
    fn horizontal_chain_spans_half_slots() {
        let mut graph = Graph::new();
        let s1 = graph.add_node("s1", NodeKind::Shunt);
        let x = graph.add_node("x", NodeKind::Fictitious);
        let s2 = graph.add_node("s2", NodeKind::Shunt);
        graph.add_edge(s1, x);
        graph.add_edge(x, s2);
        let a = Block::body_primary(&graph, vec![s1, x]).unwrap();
        let b = Block::body_primary(&graph, vec![x, s2]).unwrap();
        let mut serial = Block::serial(&graph, vec![a, b]).unwrap();
        sizing(&mut serial, Orientation::Horizontal).unwrap();
        assert_eq!(serial.position.h.span, 4);
        assert_eq!(serial.position.v.span, 0);
    }
}
