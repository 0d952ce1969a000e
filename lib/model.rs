//! The exported results of an analysis run.
//!
//! These are plain serializable records. Formulas are stored as SMT-LIB2
//! text, so a consumer needs nothing from this crate to read them back.

use crate::analysis::Slice;
use crate::compile::CompiledPath;
use crate::symbolic::{smtlib, ExecutionStatus, SymexState};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A symbolic method call on a path.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SymcallRecord {
    pub id: usize,
    /// Signature of the called method.
    pub method: String,
    /// The arguments, as SMT-LIB2 terms.
    pub arguments: Vec<String>,
}

/// One path through an entry point.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PathRecord {
    /// Signature of the entry point.
    pub method: String,
    /// 1-based index among the halted paths of the entry point.
    pub path_index: usize,
    pub status: ExecutionStatus,
    /// The path condition as an SMT-LIB2 script.
    pub condition: String,
    pub symcalls: Vec<SymcallRecord>,
    /// Conjuncts and variables which could not be compiled against the
    /// running game.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl PathRecord {
    pub fn from_state<D: Clone>(
        method: &str,
        path_index: usize,
        state: &SymexState<D>,
    ) -> PathRecord {
        let symcalls = state
            .symbolic_method_calls()
            .iter()
            .map(|(id, call)| SymcallRecord {
                id: *id,
                method: call.method().signature(),
                arguments: call.arguments().iter().map(smtlib::term).collect(),
            })
            .collect();
        PathRecord {
            method: method.to_string(),
            path_index,
            status: state.status(),
            condition: smtlib::print_script(state.path_condition()),
            symcalls,
            warnings: Vec::new(),
        }
    }

    pub fn with_compiled(mut self, compiled: &CompiledPath) -> PathRecord {
        self.warnings.extend(compiled.warnings().iter().cloned());
        self
    }
}

/// The paths of one entry point.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EntryPointReport {
    pub method: String,
    pub paths: Vec<PathRecord>,
    /// Number of states the machine aborted.
    pub aborted: usize,
    pub warnings: Vec<String>,
}

/// An entry point the analysis gave up on.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SkippedEntryPoint {
    pub method: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub entry_points: Vec<EntryPointReport>,
    pub skipped: Vec<SkippedEntryPoint>,
    pub warnings: Vec<String>,
    /// The combined input slice, when slicing is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice: Option<Slice>,
}

impl AnalysisReport {
    pub fn entry_point(&self, method: &str) -> Option<&EntryPointReport> {
        self.entry_points
            .iter()
            .find(|report| report.method == method)
    }

    /// Every path of every entry point.
    pub fn paths(&self) -> impl Iterator<Item = &PathRecord> {
        self.entry_points.iter().flat_map(|report| report.paths.iter())
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<AnalysisReport, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Number of halted states, the ones exported as paths.
pub fn halted<D: Clone>(states: &[SymexState<D>]) -> usize {
    states
        .iter()
        .filter(|state| state.status() == ExecutionStatus::Halted)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_round_trip_through_json() {
        let report = AnalysisReport {
            entry_points: vec![EntryPointReport {
                method: "Game.Player.Update()".to_string(),
                paths: vec![PathRecord {
                    method: "Game.Player.Update()".to_string(),
                    path_index: 1,
                    status: ExecutionStatus::Halted,
                    condition: "(declare-fun |symcall:0| () Real)\n(assert (> |symcall:0| 0.0))\n"
                        .to_string(),
                    symcalls: vec![SymcallRecord {
                        id: 0,
                        method: "UnityEngine.Input.GetAxis(System.String)".to_string(),
                        arguments: vec!["\"Horizontal\"".to_string()],
                    }],
                    warnings: Vec::new(),
                }],
                aborted: 0,
                warnings: Vec::new(),
            }],
            skipped: vec![SkippedEntryPoint {
                method: "Game.Menu.Update()".to_string(),
                reason: "unsupported: stelem".to_string(),
            }],
            warnings: Vec::new(),
            slice: None,
        };
        let json = report.to_json().unwrap();
        assert!(!json.contains("\"slice\""));
        assert_eq!(AnalysisReport::from_json(&json).unwrap(), report);
        assert_eq!(report.paths().count(), 1);
        assert!(report.entry_point("Game.Player.Update()").is_some());
    }
}
