use std::collections::BTreeSet;

use crate::config::LayoutParameters;
use crate::graph::{CellId, Graph, NodeId, NodeKind};

use super::LayoutContext;
use super::cell::{Cell, CellKind, Side};
use super::error::LayoutError;

/// Partitions every reachable non-bus node into cells. Components touching
/// one bus become extern cells, two buses intern cells; components carrying
/// a pair of shunt junction nodes are split into two extern cells plus the
/// bridging shunt cell.
pub(super) fn detect_cells(
    graph: &mut Graph,
    params: &LayoutParameters,
    ctx: &mut LayoutContext,
) -> Result<Vec<Cell>, LayoutError> {
    let mut visited = vec![false; graph.node_count()];
    let mut cells: Vec<Cell> = Vec::new();

    for seed in graph.node_ids().collect::<Vec<_>>() {
        let node = graph.node(seed);
        if node.kind == NodeKind::Bus || visited[seed.0] || node.edges.is_empty() {
            continue;
        }
        let (members, buses) = component(graph, seed, &mut visited);

        if params.handle_shunts {
            let shunt_nodes: Vec<NodeId> = members
                .iter()
                .copied()
                .filter(|n| graph.node(*n).kind == NodeKind::Shunt)
                .collect();
            if shunt_nodes.len() == 2
                && try_split_shunt(graph, &members, &shunt_nodes, &mut cells, ctx)?
            {
                continue;
            }
        }

        match buses.len() {
            0 => {
                ctx.diag(
                    None,
                    format!("component of {} nodes reaches no bus, skipped", members.len()),
                );
            }
            1 => {
                push_cell(graph, &mut cells, CellKind::Extern, buses, members, ctx);
            }
            2 => {
                push_cell(graph, &mut cells, CellKind::Intern, buses, members, ctx);
            }
            n => {
                if params.exception_if_pattern_not_handled {
                    return Err(LayoutError::PatternNotRecognized {
                        cell: ctx.cell_counter,
                    });
                }
                ctx.diag(
                    Some(ctx.cell_counter),
                    format!("cell touches {n} buses, keeping the first two"),
                );
                let kept = buses[..2].to_vec();
                push_cell(graph, &mut cells, CellKind::Intern, kept, members, ctx);
            }
        }
    }
    Ok(cells)
}

/// BFS over non-bus nodes. Returns members in visit order and the touched
/// buses sorted by grid position.
fn component(graph: &Graph, seed: NodeId, visited: &mut [bool]) -> (Vec<NodeId>, Vec<NodeId>) {
    let mut members = Vec::new();
    let mut queue = vec![seed];
    visited[seed.0] = true;
    let mut head = 0;
    let mut buses: BTreeSet<((usize, usize), NodeId)> = BTreeSet::new();
    while head < queue.len() {
        let current = queue[head];
        head += 1;
        members.push(current);
        for neighbour in graph.adjacent(current) {
            let node = graph.node(neighbour);
            if node.kind == NodeKind::Bus {
                let key = node
                    .bus
                    .map(|b| (b.busbar_index, b.section_index))
                    .unwrap_or((usize::MAX, usize::MAX));
                buses.insert((key, neighbour));
            } else if !visited[neighbour.0] {
                visited[neighbour.0] = true;
                queue.push(neighbour);
            }
        }
    }
    (members, buses.into_iter().map(|(_, n)| n).collect())
}

fn push_cell(
    graph: &mut Graph,
    cells: &mut Vec<Cell>,
    kind: CellKind,
    buses: Vec<NodeId>,
    members: Vec<NodeId>,
    ctx: &mut LayoutContext,
) -> CellId {
    let id = CellId(cells.len());
    let mut cell = Cell::new(ctx.next_cell(), kind);
    for member in &members {
        graph.node_mut(*member).cell = Some(id);
    }
    cell.nodes = buses.iter().copied().chain(members).collect();
    cell.bus_nodes = buses;
    cells.push(cell);
    id
}

/// Splits a two-shunt-node component into extern + extern + shunt bridge.
/// Returns false when the topology is not a clean bridge (no fictitious
/// chain, an alternate path between the sides, or a side touching more than
/// one bus); the component then falls back to plain classification.
fn try_split_shunt(
    graph: &mut Graph,
    members: &[NodeId],
    shunts: &[NodeId],
    cells: &mut Vec<Cell>,
    ctx: &mut LayoutContext,
) -> Result<bool, LayoutError> {
    let a = shunts[0];
    let b = shunts[1];
    let Some(bridge) = find_bridge(graph, a, b) else {
        return Ok(false);
    };
    let interior: BTreeSet<NodeId> = bridge[1..bridge.len() - 1].iter().copied().collect();
    let member_set: BTreeSet<NodeId> = members.iter().copied().collect();
    // block the bridge hop pairs too: a collapsed bridge is one direct edge
    // with no interior node to stop the walk
    let mut bridge_hops: BTreeSet<(NodeId, NodeId)> = BTreeSet::new();
    for pair in bridge.windows(2) {
        bridge_hops.insert((pair[0], pair[1]));
        bridge_hops.insert((pair[1], pair[0]));
    }

    let side_a = side_component(graph, a, &interior, &bridge_hops, &member_set);
    let side_a_set: BTreeSet<NodeId> = side_a.iter().copied().collect();
    if side_a_set.contains(&b) {
        return Ok(false);
    }
    let side_b: Vec<NodeId> = members
        .iter()
        .copied()
        .filter(|n| !side_a_set.contains(n) && !interior.contains(n))
        .collect();

    let buses_a = buses_of(graph, &side_a);
    let buses_b = buses_of(graph, &side_b);
    if buses_a.len() != 1 || buses_b.len() != 1 {
        return Ok(false);
    }

    let id_a = push_cell(graph, cells, CellKind::Extern, buses_a, side_a, ctx);
    let id_b = push_cell(graph, cells, CellKind::Extern, buses_b, side_b, ctx);
    let shunt_id = CellId(cells.len());
    let shunt_cell = Cell::new_shunt(
        ctx.next_cell(),
        bridge.clone(),
        (id_a, &cells[id_a.0]),
        (id_b, &cells[id_b.0]),
    )?;
    for node in &interior {
        graph.node_mut(*node).cell = Some(shunt_id);
    }
    cells[id_a.0].shunt_partner = Some((shunt_id, Side::Left));
    cells[id_b.0].shunt_partner = Some((shunt_id, Side::Right));
    cells.push(shunt_cell);
    Ok(true)
}

/// The bridging chain [a, fictitious…, b]: every interior node is a
/// degree-2 fictitious node, so the bridge carries no other branching.
fn find_bridge(graph: &Graph, a: NodeId, b: NodeId) -> Option<Vec<NodeId>> {
    if graph.adjacent(a).contains(&b) {
        return Some(vec![a, b]);
    }
    for start in graph.adjacent(a) {
        if graph.node(start).kind != NodeKind::Fictitious || graph.degree(start) != 2 {
            continue;
        }
        let mut path = vec![a, start];
        let mut prev = a;
        let mut current = start;
        loop {
            let neighbours = graph.adjacent(current);
            let next = if neighbours[0] == prev {
                neighbours[1]
            } else {
                neighbours[0]
            };
            if next == b {
                path.push(b);
                return Some(path);
            }
            if graph.node(next).kind == NodeKind::Fictitious && graph.degree(next) == 2 {
                path.push(next);
                prev = current;
                current = next;
            } else {
                break;
            }
        }
    }
    None
}

fn side_component(
    graph: &Graph,
    start: NodeId,
    blocked: &BTreeSet<NodeId>,
    blocked_hops: &BTreeSet<(NodeId, NodeId)>,
    members: &BTreeSet<NodeId>,
) -> Vec<NodeId> {
    let mut seen = BTreeSet::new();
    let mut queue = vec![start];
    seen.insert(start);
    let mut head = 0;
    let mut out = Vec::new();
    while head < queue.len() {
        let current = queue[head];
        head += 1;
        out.push(current);
        for neighbour in graph.adjacent(current) {
            if members.contains(&neighbour)
                && !blocked.contains(&neighbour)
                && !blocked_hops.contains(&(current, neighbour))
                && seen.insert(neighbour)
            {
                queue.push(neighbour);
            }
        }
    }
    out
}

fn buses_of(graph: &Graph, side: &[NodeId]) -> Vec<NodeId> {
    let mut buses: BTreeSet<((usize, usize), NodeId)> = BTreeSet::new();
    for node in side {
        for neighbour in graph.adjacent(*node) {
            let n = graph.node(neighbour);
            if n.kind == NodeKind::Bus {
                let key = n
                    .bus
                    .map(|b| (b.busbar_index, b.section_index))
                    .unwrap_or((usize::MAX, usize::MAX));
                buses.insert((key, neighbour));
            }
        }
    }
    buses.into_iter().map(|(_, n)| n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FeederDirection;

    fn ctx() -> LayoutContext {
        LayoutContext::new()
    }

    #[test]
    fn extern_and_intern_cells_are_classified() {
        let mut graph = Graph::new();
        let b1 = graph.add_bus("b1", 0, 0);
        let b2 = graph.add_bus("b2", 1, 0);
        // extern: b1 - d - f - load
        let d = graph.add_node("d", NodeKind::Switch);
        let f = graph.add_node("f", NodeKind::Fictitious);
        let load = graph.add_feeder("load", 0, FeederDirection::Top);
        graph.add_edge(b1, d);
        graph.add_edge(d, f);
        graph.add_edge(f, load);
        // intern: b1 - c - b2 with connection nodes
        let f1 = graph.add_node("f1", NodeKind::Fictitious);
        let c = graph.add_node("c", NodeKind::Switch);
        let f2 = graph.add_node("f2", NodeKind::Fictitious);
        let d1 = graph.add_node("d1", NodeKind::Switch);
        let d2 = graph.add_node("d2", NodeKind::Switch);
        graph.add_edge(b1, d1);
        graph.add_edge(d1, f1);
        graph.add_edge(f1, c);
        graph.add_edge(c, f2);
        graph.add_edge(f2, d2);
        graph.add_edge(d2, b2);

        let params = LayoutParameters::default();
        let mut context = ctx();
        let cells = detect_cells(&mut graph, &params, &mut context).unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].kind, CellKind::Extern);
        assert_eq!(cells[1].kind, CellKind::Intern);
        assert_eq!(cells[1].bus_nodes.len(), 2);
        assert_eq!(graph.node(d).cell, Some(CellId(0)));
        assert_eq!(graph.node(c).cell, Some(CellId(1)));
    }

    #[test]
    fn shunt_component_splits_into_three_cells() {
        let mut graph = Graph::new();
        let bus = graph.add_bus("bus", 0, 0);
        let d1 = graph.add_node("d1", NodeKind::Switch);
        let s1 = graph.add_node("s1", NodeKind::Shunt);
        let fa = graph.add_node("fa", NodeKind::Fictitious);
        let l1 = graph.add_feeder("l1", 0, FeederDirection::Top);
        let x1 = graph.add_node("x1", NodeKind::Fictitious);
        let d2 = graph.add_node("d2", NodeKind::Switch);
        let s2 = graph.add_node("s2", NodeKind::Shunt);
        let fb = graph.add_node("fb", NodeKind::Fictitious);
        let l2 = graph.add_feeder("l2", 1, FeederDirection::Top);
        graph.add_edge(bus, d1);
        graph.add_edge(d1, s1);
        graph.add_edge(s1, fa);
        graph.add_edge(fa, l1);
        graph.add_edge(s1, x1);
        graph.add_edge(x1, s2);
        graph.add_edge(bus, d2);
        graph.add_edge(d2, s2);
        graph.add_edge(s2, fb);
        graph.add_edge(fb, l2);

        let params = LayoutParameters {
            remove_unnecessary_fictitious_nodes: false,
            ..LayoutParameters::default()
        };
        let mut context = ctx();
        let cells = detect_cells(&mut graph, &params, &mut context).unwrap();
        assert_eq!(cells.len(), 3);
        assert_eq!(cells[2].kind, CellKind::Shunt);
        assert_eq!(cells[2].nodes, vec![s1, x1, s2]);
        // junction nodes stay extern-owned, the interior belongs to the bridge
        assert_eq!(graph.node(s1).cell, Some(CellId(0)));
        assert_eq!(graph.node(s2).cell, Some(CellId(1)));
        assert_eq!(graph.node(x1).cell, Some(CellId(2)));
    }
}
