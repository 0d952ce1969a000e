//! Backward analysis: from which instructions can execution still reach an
//! input dependent instruction?
//!
//! An instruction leads to input if it is input dependent, if it calls a
//! method containing an instruction that leads to input, or if any of its
//! successors leads to input. Methods are re-solved until the set of methods
//! leading to input stops growing.

use crate::analysis::fixed_point;
use crate::analysis::{methods_to_analyze, Cfg, CfgNode, InputAnalysisResult};
use crate::config::InputApi;
use crate::il;
use crate::il::InstructionLocation;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Instructions leading to input, per method signature.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct LeadsToInputResult {
    methods: BTreeMap<String, BTreeSet<InstructionLocation>>,
}

impl LeadsToInputResult {
    pub fn methods(&self) -> &BTreeMap<String, BTreeSet<InstructionLocation>> {
        &self.methods
    }

    pub fn method_result(&self, signature: &str) -> Option<&BTreeSet<InstructionLocation>> {
        self.methods.get(signature)
    }

    pub fn leads_to_input(&self, signature: &str, location: InstructionLocation) -> bool {
        self.methods
            .get(signature)
            .map(|points| points.contains(&location))
            .unwrap_or(false)
    }

    /// True if some instruction of the method leads to input, which makes
    /// calling it lead to input.
    pub fn method_leads_to_input(&self, signature: &str) -> bool {
        self.methods
            .get(signature)
            .map(|points| !points.is_empty())
            .unwrap_or(false)
    }
}

struct LeadsToTransfer<'a> {
    method: &'a il::Method,
    signature: String,
    input: &'a InputAnalysisResult,
    leading_methods: &'a BTreeSet<String>,
}

impl<'a> LeadsToTransfer<'a> {
    fn generates(&self, location: InstructionLocation) -> Result<bool, Error> {
        if self.input.is_input_dependent(&self.signature, location) {
            return Ok(true);
        }
        Ok(self
            .method
            .instruction(location)?
            .operation()
            .calls()
            .into_iter()
            .any(|call| self.leading_methods.contains(&call.method().signature())))
    }
}

impl<'a> fixed_point::FixedPointAnalysis<bool> for LeadsToTransfer<'a> {
    fn trans(&self, node: &CfgNode, state: Option<bool>) -> Result<bool, Error> {
        let state = state.unwrap_or(false);
        match node.location() {
            Some(location) => Ok(state || self.generates(location)?),
            None => Ok(state),
        }
    }

    fn join(&self, state0: bool, state1: &bool) -> Result<bool, Error> {
        Ok(state0 || *state1)
    }
}

/// Solve leads-to-input for every method analyzed from `entry`.
pub fn leads_to_input(
    program: &il::Program,
    entry: &il::Method,
    input_api: &InputApi,
    input: &InputAnalysisResult,
) -> Result<LeadsToInputResult, Error> {
    let mut methods = Vec::new();
    for method in methods_to_analyze(program, entry, input_api) {
        let cfg = Cfg::from_method(&method)?;
        methods.push((method, cfg));
    }

    let mut leading_methods: BTreeSet<String> = BTreeSet::new();
    loop {
        let mut result = LeadsToInputResult::default();

        for (method, cfg) in &methods {
            let transfer = LeadsToTransfer {
                method,
                signature: method.signature(),
                input,
                leading_methods: &leading_methods,
            };
            let states = fixed_point::fixed_point_backward(&transfer, cfg)?;
            let points: BTreeSet<InstructionLocation> = states
                .iter()
                .filter(|(_, leads)| **leads)
                .filter_map(|(node, _)| node.location())
                .collect();
            result.methods.insert(method.signature(), points);
        }

        let next: BTreeSet<String> = result
            .methods
            .iter()
            .filter(|(_, points)| !points.is_empty())
            .map(|(signature, _)| signature.clone())
            .collect();
        if next == leading_methods {
            return Ok(result);
        }
        leading_methods = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::InputAnalysis;
    use crate::il::*;

    /// void Update() {
    ///     Log();
    ///     if (Input.GetKey("space")) { Jump(); }
    ///     Log();
    /// }
    /// void Jump() { Log(); }
    /// void Log() { Console.WriteLine("tick"); }
    fn game() -> Program {
        let get_key = MethodRef::static_(
            "UnityEngine.Input",
            "GetKey",
            vec![Type::String],
            Type::Boolean,
        );
        let jump = MethodRef::instance("Game.Player", "Jump", vec![], Type::Void);
        let log = MethodRef::instance("Game.Player", "Log", vec![], Type::Void);
        let write_line =
            MethodRef::static_("System.Console", "WriteLine", vec![Type::String], Type::Void);
        let this = Variable::this(Type::object("Game.Player"));

        let mut body = Body::new();
        let head = body.new_block();
        let then = body.new_block();
        let tail = body.new_block();
        body.emit(head, Operation::call(log.clone(), vec![ldloc(&this)]))
            .unwrap();
        body.emit(
            head,
            Operation::if_(not(call(get_key, vec![ldstr("space")])), tail),
        )
        .unwrap();
        body.emit(then, Operation::call(jump, vec![ldloc(&this)]))
            .unwrap();
        body.emit(tail, Operation::call(log.clone(), vec![ldloc(&this)]))
            .unwrap();
        body.emit(tail, Operation::ret()).unwrap();
        let update = Method::builder("Game.Player", "Update")
            .module("Game")
            .body(body)
            .build();

        let mut body = Body::new();
        let block = body.new_block();
        body.emit(block, Operation::call(log, vec![ldloc(&this)]))
            .unwrap();
        body.emit(block, Operation::ret()).unwrap();
        let jump = Method::builder("Game.Player", "Jump")
            .module("Game")
            .body(body)
            .build();

        let mut body = Body::new();
        let block = body.new_block();
        body.emit(block, Operation::call(write_line, vec![ldstr("tick")]))
            .unwrap();
        body.emit(block, Operation::ret()).unwrap();
        let log = Method::builder("Game.Player", "Log")
            .module("Game")
            .body(body)
            .build();

        let mut program = Program::new("Game");
        program.add_method(update);
        program.add_method(jump);
        program.add_method(log);
        program
    }

    #[test]
    fn only_instructions_before_the_check_lead_to_input() {
        let program = game();
        let api = InputApi::default();
        let entry = program.require_method("Game.Player.Update()").unwrap();
        let input = InputAnalysis::new(&program, entry, &api).analyze().unwrap();
        let result = leads_to_input(&program, entry, &api, &input).unwrap();

        let signature = "Game.Player.Update()";
        assert!(result.leads_to_input(signature, InstructionLocation::new(0, 0)));
        assert!(result.leads_to_input(signature, InstructionLocation::new(0, 1)));
        assert!(!result.leads_to_input(signature, InstructionLocation::new(1, 0)));
        assert!(!result.leads_to_input(signature, InstructionLocation::new(2, 0)));
        assert!(!result.leads_to_input(signature, InstructionLocation::new(2, 1)));

        assert!(!result.method_leads_to_input("Game.Player.Jump()"));
        assert!(!result.method_leads_to_input("Game.Player.Log()"));
    }
}
