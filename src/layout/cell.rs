use serde::Serialize;

use crate::graph::{CellId, NodeId};

use super::block::Block;
use super::error::LayoutError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CellKind {
    Extern,
    Intern,
    Shunt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CellDirection {
    Top,
    Bottom,
    Middle,
    Flat,
    Undefined,
}

/// Shape of an intern cell. `MaybeFlat` is transitional: set by leg search,
/// resolved to `Flat` or `Crossover` once position information is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InternShape {
    Unileg,
    MaybeFlat,
    Flat,
    Crossover,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Left,
    Right,
}

/// LEFT/RIGHT mapping of a shunt cell to its two extern parents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShuntLink {
    pub left: CellId,
    pub right: CellId,
}

/// A group of nodes attached to one or two buses, owning one root block.
#[derive(Debug, Clone, Serialize)]
pub struct Cell {
    pub index: usize,
    pub kind: CellKind,
    /// Bus nodes first (in busbar/section order), then member nodes in
    /// detection order. Shunt cells hold the bridge chain left to right.
    pub nodes: Vec<NodeId>,
    pub bus_nodes: Vec<NodeId>,
    pub root: Option<Block>,
    /// Left-to-right rank along the buses; extern/intern cells only.
    pub order: Option<i64>,
    pub direction: CellDirection,
    pub shape: Option<InternShape>,
    /// On shunt cells: the two bridged extern cells.
    pub shunt: Option<ShuntLink>,
    /// On extern cells: the bridging shunt cell and which side of it this
    /// cell occupies.
    pub shunt_partner: Option<(CellId, Side)>,
    /// Starting horizontal slot, assigned during position computation.
    pub h_offset: i32,
}

impl Cell {
    pub fn new(index: usize, kind: CellKind) -> Self {
        Cell {
            index,
            kind,
            nodes: Vec::new(),
            bus_nodes: Vec::new(),
            root: None,
            order: None,
            direction: CellDirection::Undefined,
            shape: None,
            shunt: None,
            shunt_partner: None,
            h_offset: 0,
        }
    }

    /// Builds a shunt cell over `nodes` bridging `left` and `right`. The
    /// first and last node must belong one each to the two extern cells.
    pub fn new_shunt(
        index: usize,
        nodes: Vec<NodeId>,
        left: (CellId, &Cell),
        right: (CellId, &Cell),
    ) -> Result<Self, LayoutError> {
        let coherent = nodes.len() >= 2
            && left.1.nodes.contains(&nodes[0])
            && right.1.nodes.contains(nodes.last().unwrap());
        if !coherent {
            return Err(LayoutError::IncoherentShuntNodes);
        }
        let mut cell = Cell::new(index, CellKind::Shunt);
        cell.nodes = nodes;
        cell.shunt = Some(ShuntLink {
            left: left.0,
            right: right.0,
        });
        Ok(cell)
    }

    pub fn root_block(&self) -> &Block {
        self.root.as_ref().expect("cell root block not organized")
    }

    /// Number of grid slots the bridge spans between its two junction nodes.
    pub fn bridge_length(&self) -> i32 {
        self.root_block().position.h.span / 2 - 1
    }

    /// Width of the cell in grid slots. Horizontal roots count their spans
    /// in half-slots.
    pub fn slot_width(&self) -> i32 {
        let root = self.root_block();
        match root.position.orientation {
            super::block::Orientation::Vertical => root.position.h.span,
            super::block::Orientation::Horizontal => root.position.h.span / 2,
        }
    }

    /// Swaps the LEFT/RIGHT mapping and the node chain, so that the LEFT
    /// cell's bus order always precedes the RIGHT one's.
    pub fn reverse_shunt(&mut self) {
        if let Some(link) = &mut self.shunt {
            std::mem::swap(&mut link.left, &mut link.right);
        }
        self.nodes.reverse();
        if let Some(root) = &mut self.root {
            root.reverse();
        }
    }
}
