use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum VectorAxis {
    X,
    Y,
}

/// A key of `UnityEngine.KeyCode`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Key {
    /// A key given by name, such as `"space"` or `"Space"`.
    Named(String),
    /// A key given by its numeric code.
    Code(i64),
    /// Mouse button 0 to 6.
    Mouse(u8),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Key::Named(name) => write!(f, "KeyCode.{}", name),
            Key::Code(code) => write!(f, "(KeyCode) {}", code),
            Key::Mouse(button) => write!(f, "KeyCode.Mouse{}", button),
        }
    }
}

/// One input the player has to give for a path to run.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum InputCondition {
    /// The axis is held at -1, 0 or 1.
    Axis { name: String, value: f64 },
    Button { name: String, down: bool },
    Key { key: Key, down: bool },
    /// The mouse position on one axis, as a fraction of the screen.
    MousePosition { axis: VectorAxis, value: f64 },
}

impl fmt::Display for InputCondition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InputCondition::Axis { name, value } => {
                write!(f, "Input.GetAxis(\"{}\") == {}", name, value)
            }
            InputCondition::Button { name, down } => {
                write!(f, "Input.GetButton(\"{}\") == {}", name, down)
            }
            InputCondition::Key { key, down } => write!(f, "Input.GetKey({}) == {}", key, down),
            InputCondition::MousePosition { axis, value } => {
                let axis = match axis {
                    VectorAxis::X => "x",
                    VectorAxis::Y => "y",
                };
                write!(f, "Input.mousePosition.{} == {}", axis, value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let axis = InputCondition::Axis {
            name: "Horizontal".to_string(),
            value: -1.0,
        };
        assert_eq!(axis.to_string(), "Input.GetAxis(\"Horizontal\") == -1");
        let key = InputCondition::Key {
            key: Key::Mouse(1),
            down: true,
        };
        assert_eq!(key.to_string(), "Input.GetKey(KeyCode.Mouse1) == true");
        let mouse = InputCondition::MousePosition {
            axis: VectorAxis::Y,
            value: 0.25,
        };
        assert_eq!(mouse.to_string(), "Input.mousePosition.y == 0.25");
    }
}
