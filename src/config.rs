use serde::{Deserialize, Serialize};

/// Knobs for the pixel projection and the strict/lenient behaviour switches.
/// All distances are in pixels; busbar indices grow downwards from
/// `initial_bus_y`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutParameters {
    /// Width of one horizontal cell slot.
    pub cell_width: f32,
    /// Total height reserved for an extern cell (content plus feeder arrow
    /// space) when `adapt_cell_height_to_content` is off.
    pub extern_cell_height: f32,
    /// Height of the content band of a unileg intern cell when
    /// `adapt_cell_height_to_content` is off.
    pub intern_cell_height: f32,
    /// Vertical extent of one stack level when cell height adapts to content.
    pub stack_height: f32,
    pub adapt_cell_height_to_content: bool,
    /// Left margin between `initial_bus_x` and the first cell slot.
    pub horizontal_bus_padding: f32,
    /// Gap between a busbar and the nearest cell content.
    pub vertical_bus_padding: f32,
    /// Lower bound on the vertical space allotted to one stack level.
    pub min_space_between_components: f32,
    /// Fixed pixel offset of a feeder node beyond its connection node,
    /// reserved for the feeder arrow.
    pub feeder_span: f32,
    pub initial_bus_x: f32,
    pub initial_bus_y: f32,
    pub vertical_space_between_busbars: f32,
    /// Strict mode: fail on unrecognized cell patterns instead of degrading.
    pub exception_if_pattern_not_handled: bool,
    /// Detect and split shunt bridges between extern cells.
    pub handle_shunts: bool,
    /// Collapse pass-through fictitious nodes before detection.
    pub remove_unnecessary_fictitious_nodes: bool,
}

impl Default for LayoutParameters {
    fn default() -> Self {
        Self {
            cell_width: 50.0,
            extern_cell_height: 250.0,
            intern_cell_height: 40.0,
            stack_height: 30.0,
            adapt_cell_height_to_content: false,
            horizontal_bus_padding: 20.0,
            vertical_bus_padding: 25.0,
            min_space_between_components: 15.0,
            feeder_span: 30.0,
            initial_bus_x: 0.0,
            initial_bus_y: 260.0,
            vertical_space_between_busbars: 25.0,
            exception_if_pattern_not_handled: false,
            handle_shunts: true,
            remove_unnecessary_fictitious_nodes: true,
        }
    }
}
