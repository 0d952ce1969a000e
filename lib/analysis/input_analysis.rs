//! Forward taint analysis: which values derive from an input API.
//!
//! Every analyzed method carries a flow set of tainted local names. Three
//! sets are shared across methods and only ever grow: methods whose return
//! value is tainted, fields a tainted value was stored to, and per-method
//! parameters a tainted argument was passed to. Methods are re-solved until
//! none of the shared sets changes.

use crate::analysis::fixed_point;
use crate::analysis::{methods_to_analyze, Cfg, CfgNode};
use crate::config::InputApi;
use crate::il;
use crate::il::InstructionLocation;
use crate::Error;
use crate::RC;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Input dependent instructions per method signature, and the shared taint
/// sets they were derived from.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct InputAnalysisResult {
    methods: BTreeMap<String, BTreeSet<InstructionLocation>>,
    input_methods: BTreeSet<String>,
    input_fields: BTreeSet<String>,
    input_parameters: BTreeMap<String, BTreeSet<String>>,
}

impl InputAnalysisResult {
    /// Every analyzed method, with its input dependent instructions.
    pub fn methods(&self) -> &BTreeMap<String, BTreeSet<InstructionLocation>> {
        &self.methods
    }

    pub fn method_result(&self, signature: &str) -> Option<&BTreeSet<InstructionLocation>> {
        self.methods.get(signature)
    }

    pub fn is_input_dependent(&self, signature: &str, location: InstructionLocation) -> bool {
        self.methods
            .get(signature)
            .map(|points| points.contains(&location))
            .unwrap_or(false)
    }

    /// Methods whose return value is tainted.
    pub fn input_methods(&self) -> &BTreeSet<String> {
        &self.input_methods
    }

    /// Fields a tainted value was stored to.
    pub fn input_fields(&self) -> &BTreeSet<String> {
        &self.input_fields
    }

    /// Parameters of `signature` a tainted argument was passed to. The
    /// receiver is `this`.
    pub fn input_parameters(&self, signature: &str) -> Option<&BTreeSet<String>> {
        self.input_parameters.get(signature)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct SharedTaint {
    input_methods: BTreeSet<String>,
    input_fields: BTreeSet<String>,
    input_parameters: BTreeMap<String, BTreeSet<String>>,
}

impl SharedTaint {
    fn parameters(&self, signature: &str) -> Option<&BTreeSet<String>> {
        self.input_parameters.get(signature)
    }
}

/// Predicates shared by the transfer function and the final marking pass.
struct TaintContext<'a> {
    program: &'a il::Program,
    entry: &'a il::Method,
    input_api: &'a InputApi,
    shared: &'a SharedTaint,
}

impl<'a> TaintContext<'a> {
    fn contains_input(
        &self,
        expression: &il::Expression,
        signature: &str,
        variables: &BTreeSet<String>,
    ) -> bool {
        self.input_api.contains_input_api(expression)
            || expression.contains_method_in(&self.shared.input_methods)
            || expression.contains_field_in(&self.shared.input_fields)
            || self
                .shared
                .parameters(signature)
                .map(|parameters| expression.contains_variable_in(parameters))
                .unwrap_or(false)
            || expression.contains_variable_in(variables)
    }

    /// The value assigned by a `stloc` is tainted. A call into an analyzed
    /// method only taints through its return value.
    fn assignment_is_tainted(
        &self,
        value: &il::Expression,
        signature: &str,
        variables: &BTreeSet<String>,
    ) -> bool {
        match value {
            il::Expression::Call(call)
                if self
                    .input_api
                    .should_process_body(self.program, call.method(), self.entry) =>
            {
                self.shared.input_methods.contains(&call.method().signature())
            }
            _ => self.contains_input(value, signature, variables),
        }
    }

    fn operation_contains_input(
        &self,
        operation: &il::Operation,
        signature: &str,
        variables: &BTreeSet<String>,
    ) -> bool {
        if operation
            .expressions()
            .into_iter()
            .any(|expression| self.contains_input(expression, signature, variables))
        {
            return true;
        }
        match operation {
            il::Operation::Call(call) => {
                self.input_api.is_input_api(call.method())
                    || self.shared.input_methods.contains(&call.method().signature())
            }
            _ => false,
        }
    }
}

struct TaintTransfer<'a> {
    method: &'a il::Method,
    signature: String,
    context: TaintContext<'a>,
}

impl<'a> fixed_point::FixedPointAnalysis<BTreeSet<String>> for TaintTransfer<'a> {
    fn trans(&self, node: &CfgNode, state: Option<BTreeSet<String>>) -> Result<BTreeSet<String>, Error> {
        let mut state = state.unwrap_or_default();

        let location = match node.location() {
            Some(location) => location,
            None => return Ok(state),
        };

        if let il::Operation::StLoc { variable, value } = self.method.instruction(location)?.operation()
        {
            let tainted = self
                .context
                .assignment_is_tainted(value, &self.signature, &state);
            state.remove(variable.name());
            if tainted {
                state.insert(variable.name().to_string());
            }
        }

        Ok(state)
    }

    fn join(&self, mut state0: BTreeSet<String>, state1: &BTreeSet<String>) -> Result<BTreeSet<String>, Error> {
        state0.extend(state1.iter().cloned());
        Ok(state0)
    }
}

/// The input taint analysis of every method reachable from one entry point.
pub struct InputAnalysis<'p> {
    program: &'p il::Program,
    entry: &'p il::Method,
    input_api: &'p InputApi,
}

impl<'p> InputAnalysis<'p> {
    pub fn new(
        program: &'p il::Program,
        entry: &'p il::Method,
        input_api: &'p InputApi,
    ) -> InputAnalysis<'p> {
        InputAnalysis {
            program,
            entry,
            input_api,
        }
    }

    pub fn entry(&self) -> &'p il::Method {
        self.entry
    }

    pub fn analyze(&self) -> Result<InputAnalysisResult, Error> {
        self.solve(SharedTaint::default())
    }

    /// Resume from a previous result's shared taint sets. Resuming from a
    /// fixed point reproduces it.
    pub fn analyze_from(&self, seed: &InputAnalysisResult) -> Result<InputAnalysisResult, Error> {
        self.solve(SharedTaint {
            input_methods: seed.input_methods.clone(),
            input_fields: seed.input_fields.clone(),
            input_parameters: seed.input_parameters.clone(),
        })
    }

    fn context<'a>(&'a self, shared: &'a SharedTaint) -> TaintContext<'a> {
        TaintContext {
            program: self.program,
            entry: self.entry,
            input_api: self.input_api,
            shared,
        }
    }

    /// Solve the flow sets of one method under the current shared sets, and
    /// return the state flowing into every instruction.
    fn solve_method(
        &self,
        method: &il::Method,
        cfg: &Cfg,
        shared: &SharedTaint,
    ) -> Result<FxHashMap<CfgNode, BTreeSet<String>>, Error> {
        let transfer = TaintTransfer {
            method,
            signature: method.signature(),
            context: self.context(shared),
        };
        let out_states = fixed_point::fixed_point_forward(&transfer, cfg)?;
        let mut in_states = FxHashMap::default();
        for node in cfg.nodes() {
            if node.location().is_some() {
                let in_state =
                    fixed_point::in_state(&transfer, cfg, &out_states, node)?.unwrap_or_default();
                in_states.insert(node.clone(), in_state);
            }
        }
        Ok(in_states)
    }

    fn solve(&self, mut shared: SharedTaint) -> Result<InputAnalysisResult, Error> {
        let mut methods: Vec<(RC<il::Method>, Cfg)> = Vec::new();
        for method in methods_to_analyze(self.program, self.entry, self.input_api) {
            let cfg = Cfg::from_method(&method)?;
            methods.push((method, cfg));
        }
        let analyzed: BTreeMap<String, &il::Method> = methods
            .iter()
            .map(|(method, _)| (method.signature(), method.as_ref()))
            .collect();

        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut next = shared.clone();

            for (method, cfg) in &methods {
                let signature = method.signature();
                let in_states = self.solve_method(method, cfg, &shared)?;
                let context = self.context(&shared);

                for (node, variables) in &in_states {
                    let location = match node.location() {
                        Some(location) => location,
                        None => continue,
                    };
                    let operation = method.instruction(location)?.operation();

                    match operation {
                        il::Operation::Leave { value: Some(value) } => {
                            if context.contains_input(value, &signature, variables) {
                                next.input_methods.insert(signature.clone());
                            }
                        }
                        il::Operation::StFld { field, value, .. }
                        | il::Operation::StsFld { field, value } => {
                            if context.contains_input(value, &signature, variables) {
                                next.input_fields.insert(field.signature());
                            }
                        }
                        _ => {}
                    }

                    for call in operation.calls() {
                        let callee_signature = call.method().signature();
                        let callee = match analyzed.get(&callee_signature) {
                            Some(callee) => *callee,
                            None => continue,
                        };
                        for (index, argument) in call.arguments().iter().enumerate() {
                            if context.contains_input(argument, &signature, variables) {
                                let parameter = call
                                    .parameter_name(index, Some(callee))
                                    .unwrap_or_else(|| "this".to_string());
                                next.input_parameters
                                    .entry(callee_signature.clone())
                                    .or_default()
                                    .insert(parameter);
                            }
                        }
                    }
                }
            }

            if next == shared {
                break;
            }
            shared = next;
        }
        debug!(
            "input analysis of {} converged after {} rounds",
            self.entry.signature(),
            rounds
        );

        let mut result = InputAnalysisResult {
            methods: BTreeMap::new(),
            input_methods: shared.input_methods.clone(),
            input_fields: shared.input_fields.clone(),
            input_parameters: shared.input_parameters.clone(),
        };
        for (method, cfg) in &methods {
            let signature = method.signature();
            let in_states = self.solve_method(method, cfg, &shared)?;
            let context = self.context(&shared);
            let mut points = BTreeSet::new();
            for (node, variables) in &in_states {
                if let Some(location) = node.location() {
                    let operation = method.instruction(location)?.operation();
                    if context.operation_contains_input(operation, &signature, variables) {
                        points.insert(location);
                    }
                }
            }
            result.methods.insert(signature, points);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::*;

    fn get_axis() -> MethodRef {
        MethodRef::static_("UnityEngine.Input", "GetAxis", vec![Type::String], Type::Single)
    }

    /// class Player {
    ///     float speed;
    ///     void Update() { float h = Input.GetAxis("Horizontal"); speed = h; Move(h); }
    ///     void Move(float dx) { float scaled = dx * 2; Console.WriteLine(scaled); }
    /// }
    fn player() -> Program {
        let this = Variable::this(Type::object("Game.Player"));
        let h = Variable::local("h", Type::Single);
        let dx = Variable::parameter("dx", 0, Type::Single);
        let scaled = Variable::local("scaled", Type::Single);
        let speed = FieldRef::instance("Game.Player", "speed", Type::Single);
        let move_ = MethodRef::instance("Game.Player", "Move", vec![Type::Single], Type::Void);
        let write_line =
            MethodRef::static_("System.Console", "WriteLine", vec![Type::Single], Type::Void);

        let mut body = Body::new();
        let block = body.new_block();
        body.emit(
            block,
            Operation::stloc(&h, call(get_axis(), vec![ldstr("Horizontal")])),
        )
        .unwrap();
        body.emit(block, Operation::stfld(ldloc(&this), speed, ldloc(&h)))
            .unwrap();
        body.emit(block, Operation::call(move_, vec![ldloc(&this), ldloc(&h)]))
            .unwrap();
        body.emit(block, Operation::ret()).unwrap();
        let update = Method::builder("Game.Player", "Update")
            .module("Game")
            .body(body)
            .build();

        let mut body = Body::new();
        let block = body.new_block();
        body.emit(block, Operation::stloc(&scaled, mul(ldloc(&dx), ldc_f4(2.0))))
            .unwrap();
        body.emit(block, Operation::call(write_line, vec![ldloc(&scaled)]))
            .unwrap();
        body.emit(block, Operation::ret()).unwrap();
        let move_method = Method::builder("Game.Player", "Move")
            .parameter("dx", Type::Single)
            .module("Game")
            .body(body)
            .build();

        let mut program = Program::new("Game");
        program.add_method(update);
        program.add_method(move_method);
        program
    }

    #[test]
    fn taint_flows_through_fields_and_parameters() {
        let program = player();
        let api = InputApi::default();
        let entry = program.require_method("Game.Player.Update()").unwrap();
        let result = InputAnalysis::new(&program, entry, &api).analyze().unwrap();

        assert!(result.input_fields().contains("Game.Player.speed"));
        assert!(result
            .input_parameters("Game.Player.Move(System.Single)")
            .unwrap()
            .contains("dx"));

        let update = result.method_result("Game.Player.Update()").unwrap();
        assert_eq!(update.len(), 3);
        assert!(!update.contains(&InstructionLocation::new(0, 3)));

        let move_points = result.method_result("Game.Player.Move(System.Single)").unwrap();
        assert!(move_points.contains(&InstructionLocation::new(0, 0)));
        assert!(move_points.contains(&InstructionLocation::new(0, 1)));
        assert!(!move_points.contains(&InstructionLocation::new(0, 2)));
    }

    #[test]
    fn fixed_point_is_idempotent() {
        let program = player();
        let api = InputApi::default();
        let entry = program.require_method("Game.Player.Update()").unwrap();
        let analysis = InputAnalysis::new(&program, entry, &api);
        let result = analysis.analyze().unwrap();
        let again = analysis.analyze_from(&result).unwrap();
        assert_eq!(result, again);
    }

    /// class Player {
    ///     void Update() { F(Input.GetAxis("Horizontal")); G(); }
    ///     static void F(float x) { bool negative = x < 0; if (negative) Console.WriteLine(1); }
    ///     static void G() { int y = 3; Console.WriteLine(y); }
    /// }
    #[test]
    fn conditions_on_tainted_parameters_are_marked() {
        let x = Variable::parameter("x", 0, Type::Single);
        let negative = Variable::local("negative", Type::Boolean);
        let y = Variable::local("y", Type::Int32);
        let f = MethodRef::static_("Game.Player", "F", vec![Type::Single], Type::Void);
        let g = MethodRef::static_("Game.Player", "G", vec![], Type::Void);
        let write_line =
            MethodRef::static_("System.Console", "WriteLine", vec![Type::Int32], Type::Void);

        let mut body = Body::new();
        let block = body.new_block();
        body.emit(
            block,
            Operation::call(f, vec![call(get_axis(), vec![ldstr("Horizontal")])]),
        )
        .unwrap();
        body.emit(block, Operation::call(g, vec![])).unwrap();
        body.emit(block, Operation::ret()).unwrap();
        let update = Method::builder("Game.Player", "Update")
            .module("Game")
            .body(body)
            .build();

        let mut body = Body::new();
        let head = body.new_block();
        let then = body.new_block();
        let exit = body.new_block();
        body.emit(
            head,
            Operation::stloc(
                &negative,
                comp(ComparisonKind::LessThan, ldloc(&x), ldc_f4(0.0)),
            ),
        )
        .unwrap();
        body.emit(head, Operation::if_(ldloc(&negative), then)).unwrap();
        body.emit_glue(head, exit).unwrap();
        body.emit(then, Operation::call(write_line.clone(), vec![ldc_i4(1)]))
            .unwrap();
        body.emit(exit, Operation::ret()).unwrap();
        let f_method = Method::builder("Game.Player", "F")
            .parameter("x", Type::Single)
            .static_()
            .module("Game")
            .body(body)
            .build();

        let mut body = Body::new();
        let block = body.new_block();
        body.emit(block, Operation::stloc(&y, ldc_i4(3))).unwrap();
        body.emit(block, Operation::call(write_line, vec![ldloc(&y)]))
            .unwrap();
        body.emit(block, Operation::ret()).unwrap();
        let g_method = Method::builder("Game.Player", "G")
            .static_()
            .module("Game")
            .body(body)
            .build();

        let mut program = Program::new("Game");
        program.add_method(update);
        program.add_method(f_method);
        program.add_method(g_method);

        let api = InputApi::default();
        let entry = program.require_method("Game.Player.Update()").unwrap();
        let result = InputAnalysis::new(&program, entry, &api).analyze().unwrap();

        assert!(result
            .input_parameters("Game.Player.F(System.Single)")
            .unwrap()
            .contains("x"));
        let f_points = result.method_result("Game.Player.F(System.Single)").unwrap();
        assert!(f_points.contains(&InstructionLocation::new(0, 0)));
        assert!(f_points.contains(&InstructionLocation::new(0, 1)));
        assert!(result.is_input_dependent("Game.Player.F(System.Single)", InstructionLocation::new(0, 1)));

        assert!(result.input_parameters("Game.Player.G()").is_none());
        assert!(result
            .method_result("Game.Player.G()")
            .map(|points| points.is_empty())
            .unwrap_or(true));
    }
}
