//! Entry point discovery: the engine callbacks of game components.

use crate::analysis::reaches_input_api;
use crate::config::{GameConfiguration, InputApi};
use crate::il;
use crate::RC;

/// Base type of every game component.
pub const COMPONENT_BASE_TYPE: &str = "UnityEngine.MonoBehaviour";

/// Per-frame callbacks.
pub const FRAME_CALLBACKS: &[&str] = &["Update", "FixedUpdate", "LateUpdate"];

/// Mouse event callbacks.
pub const MOUSE_CALLBACKS: &[&str] = &[
    "OnMouseOver",
    "OnMouseDown",
    "OnMouseUp",
    "OnMouseEnter",
    "OnMouseExit",
    "OnMouseDrag",
    "OnMouseUpAsButton",
];

pub fn is_frame_callback(name: &str) -> bool {
    FRAME_CALLBACKS.contains(&name)
}

pub fn is_mouse_callback(name: &str) -> bool {
    MOUSE_CALLBACKS.contains(&name)
}

/// True if `type_name` is a component of the analyzed game.
pub fn is_component(program: &il::Program, game_config: &GameConfiguration, type_name: &str) -> bool {
    program.derives_from(type_name, COMPONENT_BASE_TYPE) && !game_config.is_type_ignored(type_name)
}

/// The callbacks worth analyzing, in signature order.
///
/// A callback is a parameterless method of a component, in the main module,
/// named after an engine callback. Frame callbacks are kept only when they
/// reach an input API. Mouse callbacks are input driven by themselves and
/// are always kept.
pub fn find_entry_points(
    program: &il::Program,
    game_config: &GameConfiguration,
    input_api: &InputApi,
) -> Vec<RC<il::Method>> {
    program
        .methods()
        .filter(|method| {
            method.parameters().is_empty()
                && method.has_body()
                && program.is_main_module(method)
                && (is_frame_callback(method.name()) || is_mouse_callback(method.name()))
                && is_component(program, game_config, method.declaring_type())
        })
        .filter(|method| {
            method.name().starts_with("OnMouse") || reaches_input_api(program, method, input_api)
        })
        .cloned()
        .collect()
}
