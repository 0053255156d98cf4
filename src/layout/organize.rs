use std::collections::{BTreeMap, BTreeSet};

use crate::config::LayoutParameters;
use crate::graph::{EdgeId, FeederDirection, Graph, NodeId, NodeKind};

use super::LayoutContext;
use super::block::{Block, BlockKind, Extremity};
use super::cell::{Cell, CellDirection, CellKind, InternShape};
use super::error::LayoutError;

/// Builds one root block for the cell from its member nodes, then derives
/// the cell-level classification (direction for extern cells, leg layout and
/// shape for intern cells).
pub(super) fn organize_cell(
    graph: &Graph,
    cell: &mut Cell,
    params: &LayoutParameters,
    ctx: &mut LayoutContext,
) -> Result<(), LayoutError> {
    if cell.kind == CellKind::Shunt {
        return organize_shunt(graph, cell);
    }
    let primaries = build_primaries(graph, cell)?;
    let root = compose(graph, cell, primaries)?;
    cell.root = Some(root);
    match cell.kind {
        CellKind::Extern => assign_extern_direction(graph, cell, ctx),
        CellKind::Intern => search_legs(graph, cell, params, ctx)?,
        CellKind::Shunt => unreachable!(),
    }
    Ok(())
}

fn in_cell_set(cell: &Cell) -> BTreeSet<NodeId> {
    cell.nodes.iter().copied().collect()
}

fn cell_degree(graph: &Graph, set: &BTreeSet<NodeId>, node: NodeId) -> usize {
    graph
        .node(node)
        .edges
        .iter()
        .filter(|e| set.contains(&graph.edge(**e).other(node)))
        .count()
}

/// Connector nodes end primary chains; switches and two-connection
/// equipment are chain interiors.
fn is_connector(graph: &Graph, set: &BTreeSet<NodeId>, node: NodeId) -> bool {
    matches!(
        graph.node(node).kind,
        NodeKind::Bus | NodeKind::Feeder | NodeKind::Fictitious | NodeKind::Shunt
    ) || cell_degree(graph, set, node) != 2
}

/// Walks every unconsumed in-cell edge from connector nodes into minimal
/// 2-3 node chains and classifies each one as a primary block.
fn build_primaries(graph: &Graph, cell: &Cell) -> Result<Vec<Block>, LayoutError> {
    let set = in_cell_set(cell);
    let mut consumed: BTreeSet<EdgeId> = BTreeSet::new();
    let mut primaries = Vec::new();
    for &start in &cell.nodes {
        if !is_connector(graph, &set, start) {
            continue;
        }
        for &edge in &graph.node(start).edges {
            if consumed.contains(&edge) {
                continue;
            }
            let other = graph.edge(edge).other(start);
            if !set.contains(&other) {
                continue;
            }
            consumed.insert(edge);
            let mut chain = vec![start];
            let mut current = other;
            loop {
                chain.push(current);
                if is_connector(graph, &set, current) {
                    break;
                }
                let mut next = None;
                for &e in &graph.node(current).edges {
                    if consumed.contains(&e) {
                        continue;
                    }
                    let o = graph.edge(e).other(current);
                    if !set.contains(&o) {
                        continue;
                    }
                    consumed.insert(e);
                    next = Some(o);
                    break;
                }
                match next {
                    Some(o) => current = o,
                    None => break,
                }
            }
            if chain.len() > 3 {
                let detail = chain
                    .iter()
                    .map(|n| graph.node(*n).id.as_str())
                    .collect::<Vec<_>>()
                    .join("-");
                return Err(LayoutError::PrimaryNotConsistent {
                    kind: "chain",
                    detail,
                });
            }
            primaries.push(classify_primary(graph, chain)?);
        }
    }
    if primaries.is_empty() {
        return Err(LayoutError::EmptyBlock("cell"));
    }
    Ok(primaries)
}

fn classify_primary(graph: &Graph, chain: Vec<NodeId>) -> Result<Block, LayoutError> {
    let first = graph.node(chain[0]).kind;
    let last = graph.node(*chain.last().unwrap()).kind;
    if first == NodeKind::Bus || last == NodeKind::Bus {
        Block::leg_primary(graph, chain)
    } else if first == NodeKind::Feeder || last == NodeKind::Feeder {
        Block::feeder_primary(graph, chain)
    } else {
        Block::body_primary(graph, chain)
    }
}

/// Alternates parallel merging and serial chaining until one root remains.
/// Serial chaining joins two blocks at a connection node only when their
/// extremity cardinalities fully account for the node's in-cell degree.
/// When neither step makes progress the leftovers are superposed under an
/// undefined composite.
fn compose(graph: &Graph, cell: &Cell, mut blocks: Vec<Block>) -> Result<Block, LayoutError> {
    let set = in_cell_set(cell);
    loop {
        if blocks.len() == 1 {
            return Ok(blocks.pop().unwrap());
        }
        let mut progress = false;

        let mut groups: BTreeMap<(NodeId, NodeId), Vec<usize>> = BTreeMap::new();
        for (i, block) in blocks.iter().enumerate() {
            groups.entry(pair_key(block)).or_default().push(i);
        }
        if groups.values().any(|g| g.len() >= 2) {
            let mut taken = vec![false; blocks.len()];
            let mut next_blocks = Vec::with_capacity(blocks.len());
            for i in 0..blocks.len() {
                if taken[i] {
                    continue;
                }
                let members = &groups[&pair_key(&blocks[i])];
                if members.len() >= 2 {
                    let group: Vec<Block> = members
                        .iter()
                        .map(|&j| {
                            taken[j] = true;
                            blocks[j].clone()
                        })
                        .collect();
                    next_blocks.push(Block::parallel(graph, group, true)?);
                } else {
                    taken[i] = true;
                    next_blocks.push(blocks[i].clone());
                }
            }
            blocks = next_blocks;
            progress = true;
        }

        let mut touch: BTreeMap<NodeId, Vec<(usize, Extremity)>> = BTreeMap::new();
        for (i, block) in blocks.iter().enumerate() {
            for extremity in [Extremity::Start, Extremity::End] {
                let node = block.extremity_node(extremity);
                if matches!(graph.node(node).kind, NodeKind::Bus | NodeKind::Feeder) {
                    continue;
                }
                touch.entry(node).or_default().push((i, extremity));
            }
        }
        let mut chained: Option<(usize, usize)> = None;
        for (node, touching) in &touch {
            if touching.len() != 2 {
                continue;
            }
            let (i, ei) = touching[0];
            let (j, ej) = touching[1];
            if i == j {
                continue;
            }
            let degree = cell_degree(graph, &set, *node);
            if blocks[i].cardinality(ei) + blocks[j].cardinality(ej) == degree {
                chained = Some((i, j));
                break;
            }
        }
        if let Some((i, j)) = chained {
            let (lo, hi) = (i.min(j), i.max(j));
            let second = blocks.remove(hi);
            let first = blocks.remove(lo);
            let merged = if first.is_serial() && !second.is_serial() {
                let mut serial = first;
                serial.add_sub_block(graph, second)?;
                serial
            } else if second.is_serial() && !first.is_serial() {
                let mut serial = second;
                serial.add_sub_block(graph, first)?;
                serial
            } else {
                // two chains (or two primaries) meeting: serial() flattens
                Block::serial(graph, vec![first, second])?
            };
            blocks.insert(lo, merged);
            progress = true;
        }

        if !progress {
            return Ok(Block::undefined(blocks));
        }
    }
}

fn pair_key(block: &Block) -> (NodeId, NodeId) {
    let s = block.extremity_node(Extremity::Start);
    let e = block.extremity_node(Extremity::End);
    if s <= e { (s, e) } else { (e, s) }
}

fn assign_extern_direction(graph: &Graph, cell: &mut Cell, ctx: &mut LayoutContext) {
    let mut direction: Option<FeederDirection> = None;
    let mut mixed = false;
    for &node in &cell.nodes {
        if let Some(info) = graph.node(node).feeder {
            match direction {
                None => direction = Some(info.direction),
                Some(d) if d != info.direction => mixed = true,
                _ => {}
            }
        }
    }
    if mixed {
        ctx.diag(
            Some(cell.index),
            "feeders of cell disagree on direction, keeping the first".to_string(),
        );
    }
    cell.direction = match direction {
        Some(FeederDirection::Bottom) => CellDirection::Bottom,
        _ => CellDirection::Top,
    };
}

/// Finds the bus legs of an intern cell and classifies its shape: one leg is
/// UNILEG, two legs on a serial root become the LEFT/RIGHT sides (root
/// re-oriented so the earlier bus comes first) with the flat-or-crossover
/// decision deferred to position time. Anything else is an unrecognized
/// pattern, fatal in strict mode.
fn search_legs(
    graph: &Graph,
    cell: &mut Cell,
    params: &LayoutParameters,
    ctx: &mut LayoutContext,
) -> Result<(), LayoutError> {
    let root = cell.root.as_mut().expect("intern cell not organized");
    let legs = count_legs(root);
    if legs == 1 {
        cell.shape = Some(InternShape::Unileg);
        cell.direction = CellDirection::Top;
        return Ok(());
    }
    if legs == 2 && root.is_serial() {
        let ends_are_legs = {
            let BlockKind::Serial(serial) = &root.kind else {
                unreachable!()
            };
            serial.subs[0].is_leg() && serial.subs.last().unwrap().is_leg()
        };
        let start = root.extremity_node(Extremity::Start);
        let end = root.extremity_node(Extremity::End);
        let start_bus = graph.node(start).bus;
        let end_bus = graph.node(end).bus;
        let (Some(start_bus), Some(end_bus)) = (start_bus, end_bus) else {
            return Err(LayoutError::LegsNotIdentified { cell: cell.index });
        };
        if !ends_are_legs {
            return Err(LayoutError::LegsNotIdentified { cell: cell.index });
        }
        if end_bus < start_bus {
            root.reverse();
        }
        cell.shape = Some(InternShape::MaybeFlat);
        cell.direction = CellDirection::Undefined;
        return Ok(());
    }
    if params.exception_if_pattern_not_handled {
        return Err(LayoutError::PatternNotRecognized { cell: cell.index });
    }
    ctx.diag(
        Some(cell.index),
        format!("pattern not recognized ({legs} legs), keeping one candidate leg"),
    );
    cell.shape = Some(InternShape::Unileg);
    cell.direction = CellDirection::Top;
    Ok(())
}

/// Leg-parallel groups count as a single merged leg.
fn count_legs(block: &Block) -> usize {
    match &block.kind {
        BlockKind::Primary(_) | BlockKind::Parallel(_) if block.is_leg() => 1,
        BlockKind::Primary(_) => 0,
        BlockKind::Parallel(p) => p.subs.iter().map(count_legs).sum(),
        BlockKind::Serial(s) => s.subs.iter().map(count_legs).sum(),
        BlockKind::Undefined(u) => u.subs.iter().map(count_legs).sum(),
    }
}

/// The bridge chain becomes a horizontal serial of two-node body primaries.
fn organize_shunt(graph: &Graph, cell: &mut Cell) -> Result<(), LayoutError> {
    let mut primaries = Vec::new();
    for pair in cell.nodes.windows(2) {
        primaries.push(Block::body_primary(graph, pair.to_vec())?);
    }
    if primaries.is_empty() {
        return Err(LayoutError::EmptyBlock("shunt cell"));
    }
    let root = if primaries.len() == 1 {
        primaries.pop().unwrap()
    } else {
        Block::serial(graph, primaries)?
    };
    cell.root = Some(root);
    cell.direction = CellDirection::Flat;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FeederDirection;
    use crate::layout::block::BlockType;

    fn organize_single(graph: &Graph, cell: &mut Cell) -> Result<(), LayoutError> {
        let params = LayoutParameters::default();
        let mut ctx = LayoutContext::new();
        organize_cell(graph, cell, &params, &mut ctx)
    }

    fn extern_cell(graph: &Graph, bus: NodeId, members: Vec<NodeId>) -> Cell {
        let mut cell = Cell::new(0, CellKind::Extern);
        cell.bus_nodes = vec![bus];
        cell.nodes = std::iter::once(bus).chain(members).collect();
        cell
    }

    #[test]
    fn feeder_chain_becomes_serial_root() {
        let mut graph = Graph::new();
        let bus = graph.add_bus("bus", 0, 0);
        let d = graph.add_node("d", NodeKind::Switch);
        let f1 = graph.add_node("f1", NodeKind::Fictitious);
        let b = graph.add_node("b", NodeKind::Switch);
        let f2 = graph.add_node("f2", NodeKind::Fictitious);
        let load = graph.add_feeder("load", 0, FeederDirection::Bottom);
        graph.add_edge(bus, d);
        graph.add_edge(d, f1);
        graph.add_edge(f1, b);
        graph.add_edge(b, f2);
        graph.add_edge(f2, load);

        let mut cell = extern_cell(&graph, bus, vec![d, f1, b, f2, load]);
        organize_single(&graph, &mut cell).unwrap();
        let root = cell.root_block();
        assert_eq!(root.block_type(), BlockType::Serial);
        assert_eq!(root.extremity_node(Extremity::Start), bus);
        assert_eq!(root.extremity_node(Extremity::End), load);
        assert_eq!(cell.direction, CellDirection::Bottom);
    }

    #[test]
    fn double_leg_merges_into_stacked_parallel() {
        let mut graph = Graph::new();
        let bus = graph.add_bus("bus", 0, 0);
        let d1 = graph.add_node("d1", NodeKind::Switch);
        let d2 = graph.add_node("d2", NodeKind::Switch);
        let f = graph.add_node("f", NodeKind::Fictitious);
        let load = graph.add_feeder("load", 0, FeederDirection::Top);
        graph.add_edge(bus, d1);
        graph.add_edge(d1, f);
        graph.add_edge(bus, d2);
        graph.add_edge(d2, f);
        graph.add_edge(f, load);

        let mut cell = extern_cell(&graph, bus, vec![d1, d2, f, load]);
        organize_single(&graph, &mut cell).unwrap();
        let root = cell.root_block();
        assert_eq!(root.block_type(), BlockType::Serial);
        let BlockKind::Serial(serial) = &root.kind else {
            panic!("expected serial root");
        };
        assert_eq!(serial.subs[0].block_type(), BlockType::LegParallel);
        assert_eq!(serial.subs[0].cardinality(Extremity::Start), 2);
    }

    #[test]
    fn intern_chain_is_maybe_flat_with_ordered_legs() {
        let mut graph = Graph::new();
        let b2 = graph.add_bus("b2", 0, 1);
        let b1 = graph.add_bus("b1", 0, 0);
        let d2 = graph.add_node("d2", NodeKind::Switch);
        let f2 = graph.add_node("f2", NodeKind::Fictitious);
        let c = graph.add_node("c", NodeKind::Switch);
        let f1 = graph.add_node("f1", NodeKind::Fictitious);
        let d1 = graph.add_node("d1", NodeKind::Switch);
        graph.add_edge(b2, d2);
        graph.add_edge(d2, f2);
        graph.add_edge(f2, c);
        graph.add_edge(c, f1);
        graph.add_edge(f1, d1);
        graph.add_edge(d1, b1);

        let mut cell = Cell::new(0, CellKind::Intern);
        cell.bus_nodes = vec![b1, b2];
        cell.nodes = vec![b1, b2, d2, f2, c, f1, d1];
        organize_single(&graph, &mut cell).unwrap();
        assert_eq!(cell.shape, Some(InternShape::MaybeFlat));
        // the root starts at the section-0 bus whatever the build order was
        assert_eq!(cell.root_block().extremity_node(Extremity::Start), b1);
        assert_eq!(cell.root_block().extremity_node(Extremity::End), b2);
    }

    #[test]
    fn unrecognized_pattern_degrades_or_fails() {
        let mut graph = Graph::new();
        let b1 = graph.add_bus("b1", 0, 0);
        let b2 = graph.add_bus("b2", 1, 0);
        let f = graph.add_node("f", NodeKind::Fictitious);
        let j = graph.add_node("j", NodeKind::Fictitious);
        let d1 = graph.add_node("d1", NodeKind::Switch);
        let d2 = graph.add_node("d2", NodeKind::Switch);
        let d3 = graph.add_node("d3", NodeKind::Switch);
        // a three-way junction between the two buses: no serial two-leg shape
        graph.add_edge(b1, d1);
        graph.add_edge(d1, f);
        graph.add_edge(f, d2);
        graph.add_edge(d2, b2);
        graph.add_edge(f, d3);
        graph.add_edge(d3, j);
        graph.add_edge(j, b2);

        let mut cell = Cell::new(7, CellKind::Intern);
        cell.bus_nodes = vec![b1, b2];
        cell.nodes = vec![b1, b2, f, j, d1, d2, d3];

        let mut ctx = LayoutContext::new();
        let strict = LayoutParameters {
            exception_if_pattern_not_handled: true,
            ..LayoutParameters::default()
        };
        let err = organize_cell(&graph, &mut cell.clone(), &strict, &mut ctx).unwrap_err();
        assert!(matches!(err, LayoutError::PatternNotRecognized { cell: 7 }));

        let lenient = LayoutParameters::default();
        organize_cell(&graph, &mut cell, &lenient, &mut ctx).unwrap();
        assert_eq!(cell.shape, Some(InternShape::Unileg));
        assert!(!ctx.diagnostics.is_empty());
    }
}
