use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

use crate::graph::Graph;
use crate::layout::{Cell, Diagnostic, EdgeRoute, Layout};

/// Serializable snapshot of a computed layout: finalized node coordinates
/// plus the structural cell/block trees, for downstream renderers.
#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<NodeDump>,
    pub cells: Vec<Cell>,
    pub routes: Vec<EdgeRoute>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub id: String,
    pub kind: String,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub rotation_angle: Option<f32>,
    pub cell: Option<usize>,
}

impl LayoutDump {
    pub fn from_layout(layout: &Layout, graph: &Graph) -> Self {
        let nodes = graph
            .node_ids()
            .map(|id| {
                let node = graph.node(id);
                NodeDump {
                    id: node.id.clone(),
                    kind: format!("{:?}", node.kind),
                    x: node.x_coord(),
                    y: node.y_coord(),
                    rotation_angle: node.rotation_angle,
                    cell: node.cell.map(|c| c.0),
                }
            })
            .collect();

        LayoutDump {
            width: layout.width,
            height: layout.height,
            nodes,
            cells: layout.cells.clone(),
            routes: layout.routes.clone(),
            diagnostics: layout.diagnostics.clone(),
        }
    }
}

pub fn write_layout_dump(path: &Path, layout: &Layout, graph: &Graph) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let dump = LayoutDump::from_layout(layout, graph);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}
