//! Static analyses over method IL.
//!
//! Everything here works per entry point: the methods reachable from it are
//! found first, then analyzed together.

mod cfg;
mod dependence_graph;
mod dominator_tree;
mod entry_points;
pub mod fixed_point;
mod input_analysis;
mod instruction_graph;
mod leads_to_input;
mod reachable_methods;
mod reaching_definitions;
mod slicer;

pub use self::cfg::{Cfg, CfgNode, InstructionNode};
pub use self::dependence_graph::{DepEdgeKind, DepGraph, DepNode};
pub use self::dominator_tree::DominatorTree;
pub use self::entry_points::{
    find_entry_points, is_component, is_frame_callback, is_mouse_callback, COMPONENT_BASE_TYPE,
    FRAME_CALLBACKS, MOUSE_CALLBACKS,
};
pub use self::input_analysis::{InputAnalysis, InputAnalysisResult};
pub use self::instruction_graph::InstructionGraph;
pub(crate) use self::instruction_graph::resolve;
pub use self::leads_to_input::{leads_to_input, LeadsToInputResult};
pub use self::reachable_methods::{methods_to_analyze, reaches_input_api, ReachableMethods};
pub use self::reaching_definitions::{reaching_definitions, Definition};
pub use self::slicer::{combine, compute_slice, slice_entry_point, Slice};
