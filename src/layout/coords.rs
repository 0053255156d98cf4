use crate::config::LayoutParameters;
use crate::graph::{Graph, NodeId};

use super::block::{Block, BlockKind, Coord, Extremity, Orientation, PrimaryBlock, PrimaryVariant};
use super::cell::{Cell, CellDirection, CellKind, InternShape};
use super::error::LayoutError;

/// Top-down projection of the integer grid into pixels. Busbar rails get
/// priority y writes, every cell distributes coordinates through its block
/// tree, shunt bridges anchor last on the extern results.
pub(super) fn calculate_coords(
    graph: &mut Graph,
    cells: &mut [Cell],
    params: &LayoutParameters,
) -> Result<(), LayoutError> {
    for id in graph.node_ids().collect::<Vec<_>>() {
        let Some(bus) = graph.node(id).bus else {
            continue;
        };
        let y = bus_y(params, bus.busbar_index);
        graph.node_mut(id).y.propose_priority(y);
    }

    for cell in cells.iter_mut() {
        if cell.kind != CellKind::Shunt {
            place_cell(graph, cell, params)?;
        }
    }
    for cell in cells.iter_mut() {
        if cell.kind == CellKind::Shunt {
            place_shunt(graph, cell);
        }
    }

    // Buses no cell proposed an x for fall back to their section index.
    for id in graph.node_ids().collect::<Vec<_>>() {
        let node = graph.node(id);
        let Some(bus) = node.bus else { continue };
        if node.x.is_empty() {
            let x = params.initial_bus_x
                + params.horizontal_bus_padding
                + bus.section_index as f32 * params.cell_width;
            graph.node_mut(id).x.propose(x);
        }
    }
    Ok(())
}

fn bus_y(params: &LayoutParameters, busbar_index: usize) -> f32 {
    params.initial_bus_y + busbar_index as f32 * params.vertical_space_between_busbars
}

fn slot_center_x(params: &LayoutParameters, offset: i32, slots: i32) -> f32 {
    params.initial_bus_x
        + params.horizontal_bus_padding
        + (offset as f32 + slots as f32 / 2.0) * params.cell_width
}

fn place_cell(
    graph: &mut Graph,
    cell: &mut Cell,
    params: &LayoutParameters,
) -> Result<(), LayoutError> {
    let mut root = cell.root.take().expect("cell root block not organized");
    let slots = match root.position.orientation {
        Orientation::Vertical => root.position.h.span,
        Orientation::Horizontal => root.position.h.span / 2,
    }
    .max(1);
    let x = slot_center_x(params, cell.h_offset, slots);
    let x_span = slots as f32 * params.cell_width;

    let result = match (cell.kind, cell.shape) {
        (CellKind::Intern, Some(InternShape::Flat)) => {
            let rail = graph
                .node(cell.bus_nodes[0])
                .bus
                .map(|b| b.busbar_index)
                .unwrap_or(0);
            root.coord = Coord {
                x,
                y: bus_y(params, rail),
                x_span,
                y_span: 0.0,
            };
            distribute(graph, &mut root, params, 1.0)
        }
        (CellKind::Intern, Some(InternShape::Crossover)) => {
            let start = root.extremity_node(Extremity::Start);
            let end = root.extremity_node(Extremity::End);
            let y_start = graph
                .node(start)
                .bus
                .map(|b| bus_y(params, b.busbar_index))
                .unwrap_or(params.initial_bus_y);
            let y_end = graph
                .node(end)
                .bus
                .map(|b| bus_y(params, b.busbar_index))
                .unwrap_or(params.initial_bus_y);
            let sign = if y_end >= y_start { 1.0 } else { -1.0 };
            let y_span = ((y_end - y_start).abs() - 2.0 * params.vertical_bus_padding).max(1.0);
            root.coord = Coord {
                x,
                y: (y_start + y_end) / 2.0,
                x_span,
                y_span,
            };
            distribute(graph, &mut root, params, sign)
        }
        _ => {
            // extern and unileg cells: a content band beyond the bus padding
            let base = match cell.kind {
                CellKind::Extern => params.extern_cell_height - params.feeder_span,
                _ => params.intern_cell_height,
            };
            let v_span = root.position.v.span;
            let content = if params.adapt_cell_height_to_content {
                v_span as f32 * params.stack_height
            } else {
                base
            }
            .max(v_span as f32 * params.min_space_between_components)
            .max(1.0);
            let rail = graph
                .node(cell.bus_nodes[0])
                .bus
                .map(|b| b.busbar_index)
                .unwrap_or(0);
            let attach_y = bus_y(params, rail);
            let sign = if cell.direction == CellDirection::Bottom {
                1.0
            } else {
                -1.0
            };
            let near = attach_y + sign * params.vertical_bus_padding;
            root.coord = Coord {
                x,
                y: near + sign * content / 2.0,
                x_span,
                y_span: content,
            };
            distribute(graph, &mut root, params, sign)
        }
    };
    cell.root = Some(root);
    result
}

/// Recursive coordinate distribution. `sign` is the direction of travel
/// along the sequence axis: -1.0 walks up (top cells), +1.0 walks down or
/// right. The near edge of a block is where its start extremity sits.
fn distribute(
    graph: &mut Graph,
    block: &mut Block,
    params: &LayoutParameters,
    sign: f32,
) -> Result<(), LayoutError> {
    let position = block.position;
    let coord = block.coord;
    match &mut block.kind {
        BlockKind::Serial(serial) => match position.orientation {
            Orientation::Vertical => {
                let total = position.v.span.max(1) as f32;
                let step = coord.y_span / total;
                let near = coord.y - sign * coord.y_span / 2.0;
                for sub in &mut serial.subs {
                    let span = sub.position.v.span as f32;
                    sub.coord = Coord {
                        x: coord.x,
                        x_span: coord.x_span,
                        y: near + sign * (sub.position.v.value as f32 + span / 2.0) * step,
                        y_span: span * step,
                    };
                }
                for k in 0..serial.subs.len() - 1 {
                    let shared = serial.subs[k].extremity_node(Extremity::End);
                    graph.node_mut(shared).x.propose_priority(coord.x);
                }
                for sub in &mut serial.subs {
                    distribute(graph, sub, params, sign)?;
                }
                Ok(())
            }
            Orientation::Horizontal => {
                let total = position.h.span.max(1) as f32;
                let step = coord.x_span / total;
                let near = coord.x - sign * coord.x_span / 2.0;
                for sub in &mut serial.subs {
                    let span = sub.position.h.span as f32;
                    sub.coord = Coord {
                        x: near + sign * (sub.position.h.value as f32 + span / 2.0) * step,
                        x_span: span * step,
                        y: coord.y,
                        y_span: coord.y_span,
                    };
                }
                for k in 0..serial.subs.len() - 1 {
                    let shared = serial.subs[k].extremity_node(Extremity::End);
                    graph.node_mut(shared).y.propose_priority(coord.y);
                }
                for sub in &mut serial.subs {
                    distribute(graph, sub, params, sign)?;
                }
                Ok(())
            }
        },
        BlockKind::Parallel(parallel) => match position.orientation {
            Orientation::Vertical => {
                let total = position.h.span.max(1) as f32;
                let step = coord.x_span / total;
                let left = coord.x - coord.x_span / 2.0;
                for sub in &mut parallel.subs {
                    let span = sub.position.h.span as f32;
                    sub.coord = Coord {
                        x: left + (sub.position.h.value as f32 + span / 2.0) * step,
                        x_span: span * step,
                        y: coord.y,
                        y_span: coord.y_span,
                    };
                    distribute(graph, sub, params, sign)?;
                }
                Ok(())
            }
            Orientation::Horizontal => {
                let total = position.v.span.max(1) as f32;
                let step = coord.y_span / total;
                let top = coord.y - coord.y_span / 2.0;
                for sub in &mut parallel.subs {
                    let span = sub.position.v.span as f32;
                    sub.coord = Coord {
                        x: coord.x,
                        x_span: coord.x_span,
                        y: top + (sub.position.v.value as f32 + span / 2.0) * step,
                        y_span: span * step,
                    };
                    distribute(graph, sub, params, sign)?;
                }
                Ok(())
            }
        },
        BlockKind::Primary(primary) => {
            place_primary(graph, primary, position.orientation, coord, params, sign);
            Ok(())
        }
        BlockKind::Undefined(undefined) => {
            if position.orientation == Orientation::Horizontal {
                return Err(LayoutError::UnsupportedHorizontalLayout);
            }
            for sub in &mut undefined.subs {
                sub.coord = coord;
                distribute(graph, sub, params, sign)?;
            }
            Ok(())
        }
    }
}

fn place_primary(
    graph: &mut Graph,
    primary: &PrimaryBlock,
    orientation: Orientation,
    coord: Coord,
    params: &LayoutParameters,
    sign: f32,
) {
    let count = primary.nodes.len();
    match orientation {
        Orientation::Vertical => {
            let near = coord.y - sign * coord.y_span / 2.0;
            if primary.variant == PrimaryVariant::Feeder {
                let connection = primary.nodes[0];
                let feeder = primary.nodes[1];
                propose(graph, connection, coord.x, near);
                propose(graph, feeder, coord.x, near + sign * params.feeder_span);
                return;
            }
            for (i, &node) in primary.nodes.iter().enumerate() {
                let t = if count > 1 {
                    i as f32 / (count - 1) as f32
                } else {
                    0.5
                };
                propose(graph, node, coord.x, near + sign * t * coord.y_span);
            }
        }
        Orientation::Horizontal => {
            let near = coord.x - sign * coord.x_span / 2.0;
            for (i, &node) in primary.nodes.iter().enumerate() {
                let t = if count > 1 {
                    i as f32 / (count - 1) as f32
                } else {
                    0.5
                };
                propose(graph, node, near + sign * t * coord.x_span, coord.y);
            }
        }
    }
}

fn propose(graph: &mut Graph, node: NodeId, x: f32, y: f32) {
    let node = graph.node_mut(node);
    node.x.propose(x);
    node.y.propose(y);
}

/// Interior bridge nodes interpolate between the two junction nodes, whose
/// coordinates the extern cells own.
fn place_shunt(graph: &mut Graph, cell: &mut Cell) {
    let count = cell.nodes.len();
    if count < 2 {
        return;
    }
    let first = cell.nodes[0];
    let last = cell.nodes[count - 1];
    let (Some(x1), Some(y1)) = (graph.node(first).x_coord(), graph.node(first).y_coord()) else {
        return;
    };
    let (Some(x2), Some(y2)) = (graph.node(last).x_coord(), graph.node(last).y_coord()) else {
        return;
    };
    let points: Vec<(f32, f32)> = (0..count)
        .map(|i| {
            let t = i as f32 / (count - 1) as f32;
            (x1 + t * (x2 - x1), y1 + t * (y2 - y1))
        })
        .collect();
    for (i, &node) in cell.nodes.iter().enumerate() {
        if i == 0 || i == count - 1 {
            continue;
        }
        propose(graph, node, points[i].0, points[i].1);
    }
    if let Some(root) = cell.root.as_mut() {
        root.coord = Coord {
            x: (x1 + x2) / 2.0,
            y: (y1 + y2) / 2.0,
            x_span: (x2 - x1).abs(),
            y_span: (y2 - y1).abs(),
        };
        if let BlockKind::Serial(serial) = &mut root.kind {
            for (k, sub) in serial.subs.iter_mut().enumerate() {
                let a = points[k];
                let b = points[k + 1];
                sub.coord = Coord {
                    x: (a.0 + b.0) / 2.0,
                    y: (a.1 + b.1) / 2.0,
                    x_span: (b.0 - a.0).abs(),
                    y_span: (b.1 - a.1).abs(),
                };
            }
        }
    }
}
