//! Process wide settings, set up once before any analysis runs.

use crate::il;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// The sign cases an axis read is split into.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum AxisCase {
    Positive,
    Negative,
    Zero,
}

/// Names of the input polling API.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct InputApi {
    /// Declaring type of every input polling method.
    pub input_type: String,
    /// Declaring type of the API reporting the previous frame's input state.
    /// `GetKeyDown` and friends are modelled by comparing against it.
    pub previous_input_type: String,
}

impl Default for InputApi {
    fn default() -> InputApi {
        InputApi {
            input_type: "UnityEngine.Input".to_string(),
            previous_input_type: "ActionAnalysis.PreviousInput".to_string(),
        }
    }
}

impl InputApi {
    /// A value returning method of the input type.
    pub fn is_input_api(&self, method: &il::MethodRef) -> bool {
        method.declaring_type() == self.input_type && !method.return_type().is_void()
    }

    pub fn is_previous_input_api(&self, method: &il::MethodRef) -> bool {
        method.declaring_type() == self.previous_input_type
    }

    /// True if `expression` calls an input API anywhere.
    pub fn contains_input_api(&self, expression: &il::Expression) -> bool {
        expression.any(&|expr| match expr {
            il::Expression::Call(call) | il::Expression::NewObj(call) => {
                self.is_input_api(call.method())
            }
            _ => false,
        })
    }

    /// True if `method` is, for the analysis rooted at `entry`, walked
    /// into: it has a body, it is not an input API, and it lives in the
    /// module of the entry point.
    pub fn should_process_body(
        &self,
        program: &il::Program,
        method: &il::MethodRef,
        entry: &il::Method,
    ) -> bool {
        if self.is_input_api(method) {
            return false;
        }
        match program.resolve(method) {
            Some(definition) => definition.has_body() && definition.module() == entry.module(),
            None => false,
        }
    }
}

/// Knobs of the symbolic executor.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Bound on every solver query, in milliseconds.
    pub solver_timeout_ms: Option<u64>,
    /// Columns of the mouse position case split.
    pub grid_width: u32,
    /// Rows of the mouse position case split.
    pub grid_height: u32,
    pub axis_partition: Vec<AxisCase>,
    /// Exceeding this many states aborts the entry point.
    pub max_states: usize,
    /// Exceeding this many steps in one state aborts the entry point.
    pub max_steps_per_state: usize,
    pub input_api: InputApi,
}

impl Default for AnalysisOptions {
    fn default() -> AnalysisOptions {
        AnalysisOptions {
            solver_timeout_ms: None,
            grid_width: 4,
            grid_height: 4,
            axis_partition: vec![AxisCase::Positive, AxisCase::Negative, AxisCase::Zero],
            max_states: 4096,
            max_steps_per_state: 100_000,
            input_api: InputApi::default(),
        }
    }
}

/// Describes the game under analysis.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct GameConfiguration {
    pub assembly_search_directories: Vec<PathBuf>,
    pub ignore_namespaces: BTreeSet<String>,
    pub ignore_classes: BTreeSet<String>,
    /// Also compute the input slice over every entry point.
    pub slicing: bool,
    pub analysis: AnalysisOptions,
}

impl GameConfiguration {
    pub fn from_json(json: &str) -> Result<GameConfiguration, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// True if `full_type_name` is an ignored class, or lives in an ignored
    /// namespace.
    pub fn is_type_ignored(&self, full_type_name: &str) -> bool {
        if self.ignore_classes.contains(full_type_name) {
            return true;
        }
        self.ignore_namespaces
            .iter()
            .any(|namespace| full_type_name.starts_with(&format!("{}.", namespace)))
    }

    pub fn input_api(&self) -> &InputApi {
        &self.analysis.input_api
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_types() {
        let config = GameConfiguration::from_json(
            r#"{
                "ignore_namespaces": ["ThirdParty"],
                "ignore_classes": ["Game.Debug"],
                "analysis": { "grid_width": 2 }
            }"#,
        )
        .unwrap();

        assert!(config.is_type_ignored("Game.Debug"));
        assert!(config.is_type_ignored("ThirdParty.Tween"));
        assert!(!config.is_type_ignored("ThirdPartyTools.Tween"));
        assert!(!config.is_type_ignored("Game.Player"));
        assert_eq!(config.analysis.grid_width, 2);
        assert_eq!(config.analysis.grid_height, 4);
        assert_eq!(config.analysis.max_states, 4096);
    }

    #[test]
    fn input_api_requires_a_value() {
        let api = InputApi::default();
        let get_axis = il::MethodRef::static_(
            "UnityEngine.Input",
            "GetAxis",
            vec![il::Type::String],
            il::Type::Single,
        );
        let reset = il::MethodRef::static_("UnityEngine.Input", "ResetInputAxes", vec![], il::Type::Void);
        assert!(api.is_input_api(&get_axis));
        assert!(!api.is_input_api(&reset));
    }
}
