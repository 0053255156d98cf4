pub mod config;
pub mod graph;
pub mod layout;
pub mod layout_dump;

pub use config::LayoutParameters;
pub use graph::{BusPosition, FeederDirection, FeederInfo, Graph, Node, NodeId, NodeKind};
pub use layout::{Layout, LayoutError, compute_layout};
