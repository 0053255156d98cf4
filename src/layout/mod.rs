mod block;
mod cell;
mod coords;
mod detect;
mod error;
mod organize;
mod position;
mod rotation;

pub use block::{
    Block, BlockKind, BlockType, Coord, Extremity, Orientation, ParallelBlock, ParallelVariant,
    Position, PrimaryBlock, PrimaryVariant, Segment, SerialBlock, UndefinedBlock,
};
pub use cell::{Cell, CellDirection, CellKind, InternShape, ShuntLink, Side};
pub use error::LayoutError;
pub use rotation::EdgeRoute;

use serde::Serialize;

use crate::config::LayoutParameters;
use crate::graph::Graph;

/// One lenient-mode degradation or notable event, kept instead of a log
/// line and returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub cell: Option<usize>,
    pub message: String,
}

/// Mutable pipeline state threaded through the passes: the cell index
/// generator and the accumulating diagnostics.
#[derive(Debug, Default)]
pub(crate) struct LayoutContext {
    pub cell_counter: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl LayoutContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_cell(&mut self) -> usize {
        let index = self.cell_counter;
        self.cell_counter += 1;
        index
    }

    pub fn diag(&mut self, cell: Option<usize>, message: String) {
        self.diagnostics.push(Diagnostic { cell, message });
    }
}

/// The computed layout: cells with their sized and placed block trees,
/// routed edge polylines, diagnostics from lenient degradations, and the
/// overall bounding box. Final node x/y/rotation live on the graph nodes.
#[derive(Debug, Clone, Serialize)]
pub struct Layout {
    pub cells: Vec<Cell>,
    pub routes: Vec<EdgeRoute>,
    pub diagnostics: Vec<Diagnostic>,
    pub width: f32,
    pub height: f32,
}

/// Runs the full pipeline: fictitious-node collapse, cell detection, block
/// organization, integer position sizing, pixel projection, edge routing
/// and the transformer rotation post-pass. Deterministic: the same graph
/// and parameters produce bit-identical coordinates.
pub fn compute_layout(
    graph: &mut Graph,
    params: &LayoutParameters,
) -> Result<Layout, LayoutError> {
    let mut ctx = LayoutContext::new();
    if params.remove_unnecessary_fictitious_nodes {
        let removed = graph.collapse_fictitious_runs();
        if removed > 0 {
            ctx.diag(None, format!("collapsed {removed} pass-through fictitious nodes"));
        }
    }
    let mut cells = detect::detect_cells(graph, params, &mut ctx)?;
    for cell in cells.iter_mut() {
        organize::organize_cell(graph, cell, params, &mut ctx)?;
    }
    position::assign_positions(graph, &mut cells, params, &mut ctx)?;
    coords::calculate_coords(graph, &mut cells, params)?;
    let routes = rotation::route_edges(graph);
    rotation::assign_rotations(graph, &routes);

    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for id in graph.node_ids() {
        let node = graph.node(id);
        if let (Some(x), Some(y)) = (node.x_coord(), node.y_coord()) {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }
    let width = if min_x == f32::MAX { 1.0 } else { (max_x - min_x).max(1.0) };
    let height = if min_y == f32::MAX { 1.0 } else { (max_y - min_y).max(1.0) };

    Ok(Layout {
        cells,
        routes,
        diagnostics: ctx.diagnostics,
        width,
        height,
    })
}
