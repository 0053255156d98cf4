use serde::Serialize;

use crate::graph::{Graph, NodeId, NodeKind};

use super::error::LayoutError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Extremity {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Orientation {
    Vertical,
    Horizontal,
}

/// One dimension of a block's integer grid position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Segment {
    pub value: i32,
    pub span: i32,
    pub shift: i32,
}

/// Integer grid position of a block: horizontal slot, vertical stack level,
/// and the orientation of the drawn axis. Set once during bottom-up sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub h: Segment,
    pub v: Segment,
    pub orientation: Orientation,
}

impl Default for Position {
    fn default() -> Self {
        Position {
            h: Segment::default(),
            v: Segment::default(),
            orientation: Orientation::Vertical,
        }
    }
}

/// Continuous pixel coordinate of a block: centre plus extents. Assigned
/// exactly once, top-down, after positions are final.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Coord {
    pub x: f32,
    pub y: f32,
    pub x_span: f32,
    pub y_span: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockType {
    LegPrimary,
    BodyPrimary,
    FeederPrimary,
    LegParallel,
    BodyParallel,
    Serial,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrimaryVariant {
    Leg,
    Body,
    Feeder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParallelVariant {
    Leg,
    Body,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrimaryBlock {
    pub variant: PrimaryVariant,
    pub nodes: Vec<NodeId>,
    /// Stacked legs sit directly on the bus and collapse to zero vertical
    /// span; their footprint is carried by the enclosing leg-parallel group.
    pub stacked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParallelBlock {
    pub variant: ParallelVariant,
    pub subs: Vec<Block>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SerialBlock {
    pub subs: Vec<Block>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UndefinedBlock {
    pub subs: Vec<Block>,
}

#[derive(Debug, Clone, Serialize)]
pub enum BlockKind {
    Primary(PrimaryBlock),
    Parallel(ParallelBlock),
    Serial(SerialBlock),
    Undefined(UndefinedBlock),
}

/// A unit of the recursive layout tree. Composites own their sub-blocks by
/// value; nodes are referenced by handle, so two blocks meeting at a shared
/// extremity reference the same node without aliasing.
#[derive(Debug, Clone, Serialize)]
pub struct Block {
    pub kind: BlockKind,
    pub position: Position,
    pub coord: Coord,
}

fn kind_name(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Bus => "bus",
        NodeKind::Feeder => "feeder",
        NodeKind::Switch => "switch",
        NodeKind::Fictitious => "fictitious",
        NodeKind::Shunt => "shunt",
        NodeKind::Other => "other",
    }
}

fn chain_signature(graph: &Graph, nodes: &[NodeId]) -> String {
    nodes
        .iter()
        .map(|n| kind_name(graph.node(*n).kind))
        .collect::<Vec<_>>()
        .join("-")
}

fn is_connection_kind(kind: NodeKind) -> bool {
    matches!(kind, NodeKind::Fictitious | NodeKind::Shunt)
}

impl Block {
    fn with_kind(kind: BlockKind) -> Block {
        Block {
            kind,
            position: Position::default(),
            coord: Coord::default(),
        }
    }

    /// Leg chain [BUS, (SWITCH), FICTITIOUS|SHUNT], oriented bus-first.
    /// A chain built bus-last is reversed on construction.
    pub fn leg_primary(graph: &Graph, mut nodes: Vec<NodeId>) -> Result<Block, LayoutError> {
        if nodes.is_empty() {
            return Err(LayoutError::EmptyBlock("leg primary"));
        }
        if graph.node(*nodes.last().unwrap()).kind == NodeKind::Bus {
            nodes.reverse();
        }
        let valid = (2..=3).contains(&nodes.len())
            && graph.node(nodes[0]).kind == NodeKind::Bus
            && is_connection_kind(graph.node(*nodes.last().unwrap()).kind)
            && (nodes.len() == 2 || graph.node(nodes[1]).kind == NodeKind::Switch);
        if !valid {
            return Err(LayoutError::PrimaryNotConsistent {
                kind: "leg",
                detail: chain_signature(graph, &nodes),
            });
        }
        Ok(Block::with_kind(BlockKind::Primary(PrimaryBlock {
            variant: PrimaryVariant::Leg,
            nodes,
            stacked: false,
        })))
    }

    /// Interior chain with neither bus nor feeder endpoint.
    pub fn body_primary(graph: &Graph, nodes: Vec<NodeId>) -> Result<Block, LayoutError> {
        if nodes.is_empty() {
            return Err(LayoutError::EmptyBlock("body primary"));
        }
        let endpoints_ok = !matches!(
            graph.node(nodes[0]).kind,
            NodeKind::Bus | NodeKind::Feeder
        ) && !matches!(
            graph.node(*nodes.last().unwrap()).kind,
            NodeKind::Bus | NodeKind::Feeder
        );
        if !(2..=3).contains(&nodes.len()) || !endpoints_ok {
            return Err(LayoutError::PrimaryNotConsistent {
                kind: "body",
                detail: chain_signature(graph, &nodes),
            });
        }
        Ok(Block::with_kind(BlockKind::Primary(PrimaryBlock {
            variant: PrimaryVariant::Body,
            nodes,
            stacked: false,
        })))
    }

    /// Feeder stub [FICTITIOUS|SHUNT, FEEDER], oriented feeder-last. Always
    /// zero vertical span: arrow space is a fixed layout parameter.
    pub fn feeder_primary(graph: &Graph, mut nodes: Vec<NodeId>) -> Result<Block, LayoutError> {
        if nodes.is_empty() {
            return Err(LayoutError::EmptyBlock("feeder primary"));
        }
        if graph.node(nodes[0]).kind == NodeKind::Feeder {
            nodes.reverse();
        }
        let valid = nodes.len() == 2
            && is_connection_kind(graph.node(nodes[0]).kind)
            && graph.node(nodes[1]).kind == NodeKind::Feeder;
        if !valid {
            return Err(LayoutError::PrimaryNotConsistent {
                kind: "feeder",
                detail: chain_signature(graph, &nodes),
            });
        }
        Ok(Block::with_kind(BlockKind::Primary(PrimaryBlock {
            variant: PrimaryVariant::Feeder,
            nodes,
            stacked: false,
        })))
    }

    /// Chains `blocks` into one serial block. Facing extremities must share a
    /// node, reversing sub-blocks where needed; nested serials are absorbed.
    /// The chain is finally oriented so that a bus-embedding sub-block is
    /// lower and a feeder-embedding one upper.
    pub fn serial(graph: &Graph, blocks: Vec<Block>) -> Result<Block, LayoutError> {
        if blocks.is_empty() {
            return Err(LayoutError::EmptyBlock("serial"));
        }
        let mut flat = Vec::with_capacity(blocks.len());
        for block in blocks {
            match block.kind {
                BlockKind::Serial(serial) => flat.extend(serial.subs),
                _ => flat.push(block),
            }
        }
        if flat.len() == 1 {
            return Ok(flat.pop().unwrap());
        }
        let mut aligned: Vec<Block> = Vec::with_capacity(flat.len());
        for (index, mut block) in flat.into_iter().enumerate() {
            if index == 0 {
                aligned.push(block);
                continue;
            }
            let prev_start = aligned[index - 1].extremity_node(Extremity::Start);
            let prev_end = aligned[index - 1].extremity_node(Extremity::End);
            let start = block.extremity_node(Extremity::Start);
            let end = block.extremity_node(Extremity::End);
            if prev_end == start {
                // already aligned
            } else if prev_end == end {
                block.reverse();
            } else if index == 1 && prev_start == start {
                aligned[0].reverse();
            } else if index == 1 && prev_start == end {
                aligned[0].reverse();
                block.reverse();
            } else {
                return Err(LayoutError::UnconsistentChaining);
            }
            aligned.push(block);
        }
        let mut block = Block::with_kind(BlockKind::Serial(SerialBlock { subs: aligned }));
        block.orient_serial(graph);
        Ok(block)
    }

    /// Groups sibling blocks sharing both extremity nodes. Members facing the
    /// opposite way are reversed; with `merge_nested`, sub-blocks of a
    /// same-variant parallel child are absorbed directly. Leg groups mark
    /// their members stacked.
    pub fn parallel(
        graph: &Graph,
        blocks: Vec<Block>,
        merge_nested: bool,
    ) -> Result<Block, LayoutError> {
        if blocks.is_empty() {
            return Err(LayoutError::EmptyBlock("parallel"));
        }
        let mut start = blocks[0].extremity_node(Extremity::Start);
        let mut end = blocks[0].extremity_node(Extremity::End);
        // Canonical orientation: bus at the start, feeder at the end.
        if graph.node(end).kind == NodeKind::Bus || graph.node(start).kind == NodeKind::Feeder {
            std::mem::swap(&mut start, &mut end);
        }
        let mut subs = Vec::with_capacity(blocks.len());
        for mut block in blocks {
            let s = block.extremity_node(Extremity::Start);
            let e = block.extremity_node(Extremity::End);
            if s == start && e == end {
                // canonical
            } else if s == end && e == start {
                block.reverse();
            } else {
                return Err(LayoutError::ParallelExtremityMismatch);
            }
            subs.push(block);
        }
        let all_legs = subs
            .iter()
            .all(|b| matches!(b.block_type(), BlockType::LegPrimary | BlockType::LegParallel));
        let variant = if all_legs {
            ParallelVariant::Leg
        } else {
            ParallelVariant::Body
        };
        if merge_nested {
            let mut merged = Vec::with_capacity(subs.len());
            for block in subs {
                match block.kind {
                    BlockKind::Parallel(parallel) if parallel.variant == variant => {
                        merged.extend(parallel.subs);
                    }
                    _ => merged.push(block),
                }
            }
            subs = merged;
        }
        if variant == ParallelVariant::Leg && subs.len() > 1 {
            for block in &mut subs {
                if let BlockKind::Primary(primary) = &mut block.kind {
                    primary.stacked = true;
                }
            }
        }
        Ok(Block::with_kind(BlockKind::Parallel(ParallelBlock {
            variant,
            subs,
        })))
    }

    /// Catch-all superposition of sub-blocks no recognized pattern covers.
    pub fn undefined(blocks: Vec<Block>) -> Block {
        Block::with_kind(BlockKind::Undefined(UndefinedBlock { subs: blocks }))
    }

    pub fn block_type(&self) -> BlockType {
        match &self.kind {
            BlockKind::Primary(p) => match p.variant {
                PrimaryVariant::Leg => BlockType::LegPrimary,
                PrimaryVariant::Body => BlockType::BodyPrimary,
                PrimaryVariant::Feeder => BlockType::FeederPrimary,
            },
            BlockKind::Parallel(p) => match p.variant {
                ParallelVariant::Leg => BlockType::LegParallel,
                ParallelVariant::Body => BlockType::BodyParallel,
            },
            BlockKind::Serial(_) => BlockType::Serial,
            BlockKind::Undefined(_) => BlockType::Undefined,
        }
    }

    pub fn is_serial(&self) -> bool {
        matches!(self.kind, BlockKind::Serial(_))
    }

    pub fn is_leg(&self) -> bool {
        matches!(
            self.block_type(),
            BlockType::LegPrimary | BlockType::LegParallel
        )
    }

    /// The concrete node at a logical extremity: first/last node of the
    /// descendant chain.
    pub fn extremity_node(&self, extremity: Extremity) -> NodeId {
        match &self.kind {
            BlockKind::Primary(p) => match extremity {
                Extremity::Start => p.nodes[0],
                Extremity::End => *p.nodes.last().unwrap(),
            },
            BlockKind::Parallel(p) => p.subs[0].extremity_node(extremity),
            BlockKind::Serial(s) => match extremity {
                Extremity::Start => s.subs[0].extremity_node(extremity),
                Extremity::End => s.subs.last().unwrap().extremity_node(extremity),
            },
            BlockKind::Undefined(u) => u.subs[0].extremity_node(extremity),
        }
    }

    /// Swaps the extremity-to-node mapping. Applying twice restores the
    /// original mapping.
    pub fn reverse(&mut self) {
        match &mut self.kind {
            BlockKind::Primary(p) => p.nodes.reverse(),
            BlockKind::Parallel(p) => {
                for sub in &mut p.subs {
                    sub.reverse();
                }
            }
            BlockKind::Serial(s) => {
                s.subs.reverse();
                for sub in &mut s.subs {
                    sub.reverse();
                }
            }
            BlockKind::Undefined(u) => {
                for sub in &mut u.subs {
                    sub.reverse();
                }
            }
        }
    }

    /// Number of leaf chains terminating at an extremity.
    pub fn cardinality(&self, extremity: Extremity) -> usize {
        match &self.kind {
            BlockKind::Primary(_) => 1,
            BlockKind::Parallel(p) => p.subs.iter().map(|b| b.cardinality(extremity)).sum(),
            BlockKind::Serial(s) => match extremity {
                Extremity::Start => s.subs[0].cardinality(extremity),
                Extremity::End => s.subs.last().unwrap().cardinality(extremity),
            },
            BlockKind::Undefined(u) => u.subs.iter().map(|b| b.cardinality(extremity)).sum(),
        }
    }

    pub fn embeds_kind(&self, graph: &Graph, kind: NodeKind) -> bool {
        match &self.kind {
            BlockKind::Primary(p) => p.nodes.iter().any(|n| graph.node(*n).kind == kind),
            BlockKind::Parallel(p) => p.subs.iter().any(|b| b.embeds_kind(graph, kind)),
            BlockKind::Serial(s) => s.subs.iter().any(|b| b.embeds_kind(graph, kind)),
            BlockKind::Undefined(u) => u.subs.iter().any(|b| b.embeds_kind(graph, kind)),
        }
    }

    pub fn collect_nodes(&self, out: &mut Vec<NodeId>) {
        match &self.kind {
            BlockKind::Primary(p) => out.extend(p.nodes.iter().copied()),
            BlockKind::Parallel(p) => {
                for sub in &p.subs {
                    sub.collect_nodes(out);
                }
            }
            BlockKind::Serial(s) => {
                for sub in &s.subs {
                    sub.collect_nodes(out);
                }
            }
            BlockKind::Undefined(u) => {
                for sub in &u.subs {
                    sub.collect_nodes(out);
                }
            }
        }
    }

    /// Inserts one more block at whichever extremity of this serial chain it
    /// shares a node with, reversing it when it faces the wrong way.
    pub fn add_sub_block(&mut self, graph: &Graph, mut other: Block) -> Result<(), LayoutError> {
        let BlockKind::Serial(serial) = &mut self.kind else {
            return Err(LayoutError::UnconsistentChaining);
        };
        let chain_start = serial.subs[0].extremity_node(Extremity::Start);
        let chain_end = serial.subs.last().unwrap().extremity_node(Extremity::End);
        let start = other.extremity_node(Extremity::Start);
        let end = other.extremity_node(Extremity::End);
        if start == chain_end {
            serial.subs.push(other);
        } else if end == chain_end {
            other.reverse();
            serial.subs.push(other);
        } else if end == chain_start {
            serial.subs.insert(0, other);
        } else if start == chain_start {
            other.reverse();
            serial.subs.insert(0, other);
        } else {
            return Err(LayoutError::UnconsistentChaining);
        }
        self.orient_serial(graph);
        Ok(())
    }

    /// Keeps a serial chain bus-side down: reversed when the lower sub-block
    /// embeds a feeder, or when the upper embeds a bus while the lower does
    /// not (an intern chain embeds buses at both ends and is left alone).
    fn orient_serial(&mut self, graph: &Graph) {
        let BlockKind::Serial(serial) = &self.kind else {
            return;
        };
        let lower_feeder = serial.subs[0].embeds_kind(graph, NodeKind::Feeder);
        let lower_bus = serial.subs[0].embeds_kind(graph, NodeKind::Bus);
        let upper_bus = serial
            .subs
            .last()
            .unwrap()
            .embeds_kind(graph, NodeKind::Bus);
        if lower_feeder || (upper_bus && !lower_bus) {
            self.reverse();
        }
    }
}
