//! Call graph reachability from an entry point.

use crate::config::InputApi;
use crate::il;
use crate::RC;
use rustc_hash::FxHashSet;

/// Methods reachable from an entry point, in depth first pre-order.
///
/// Only bodies that should be processed (see
/// `InputApi::should_process_body`) are walked into, but every call target
/// met along the way is yielded, including input APIs and methods without a
/// definition. Each method is yielded once.
pub struct ReachableMethods<'p> {
    program: &'p il::Program,
    entry: &'p il::Method,
    input_api: &'p InputApi,
    stack: Vec<il::MethodRef>,
    visited: FxHashSet<String>,
}

impl<'p> ReachableMethods<'p> {
    pub fn new(
        program: &'p il::Program,
        entry: &'p il::Method,
        input_api: &'p InputApi,
    ) -> ReachableMethods<'p> {
        ReachableMethods {
            program,
            entry,
            input_api,
            stack: vec![entry.reference().clone()],
            visited: FxHashSet::default(),
        }
    }
}

impl<'p> Iterator for ReachableMethods<'p> {
    type Item = il::MethodRef;

    fn next(&mut self) -> Option<il::MethodRef> {
        while let Some(method) = self.stack.pop() {
            if !self.visited.insert(method.signature()) {
                continue;
            }

            if self
                .input_api
                .should_process_body(self.program, &method, self.entry)
            {
                let callees: Vec<il::MethodRef> = self
                    .program
                    .resolve(&method)
                    .and_then(|definition| definition.body())
                    .map(|body| {
                        body.locations()
                            .into_iter()
                            .filter(|(_, instruction)| !instruction.is_synthetic_branch())
                            .flat_map(|(_, instruction)| {
                                instruction
                                    .operation()
                                    .calls()
                                    .into_iter()
                                    .map(|call| call.method().clone())
                                    .collect::<Vec<il::MethodRef>>()
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                // Reversed so the first call is visited first.
                for callee in callees.into_iter().rev() {
                    if !self.visited.contains(&callee.signature()) {
                        self.stack.push(callee);
                    }
                }
            }

            return Some(method);
        }
        None
    }
}

/// The definitions of every reachable method whose body is analyzed, the
/// entry point first.
pub fn methods_to_analyze(
    program: &il::Program,
    entry: &il::Method,
    input_api: &InputApi,
) -> Vec<RC<il::Method>> {
    ReachableMethods::new(program, entry, input_api)
        .filter(|method| input_api.should_process_body(program, method, entry))
        .filter_map(|method| program.resolve(&method).cloned())
        .collect()
}

/// True if any method reachable from `entry` is an input API.
pub fn reaches_input_api(program: &il::Program, entry: &il::Method, input_api: &InputApi) -> bool {
    ReachableMethods::new(program, entry, input_api).any(|method| input_api.is_input_api(&method))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::*;

    fn caller(name: &str, callees: Vec<MethodRef>) -> Method {
        let mut body = Body::new();
        let block = body.new_block();
        for callee in callees {
            body.emit(block, Operation::call(callee, vec![])).unwrap();
        }
        body.emit(block, Operation::ret()).unwrap();
        Method::builder("Game.Player", name)
            .static_()
            .module("Game")
            .body(body)
            .build()
    }

    fn reference(name: &str) -> MethodRef {
        MethodRef::static_("Game.Player", name, vec![], Type::Void)
    }

    #[test]
    fn pre_order_without_repeats() {
        let get_key = MethodRef::static_(
            "UnityEngine.Input",
            "GetKey",
            vec![Type::String],
            Type::Boolean,
        );
        let mut program = Program::new("Game");
        program.add_method(caller("Update", vec![reference("A"), reference("B")]));
        program.add_method(caller("A", vec![reference("C"), reference("Update")]));
        program.add_method(caller("B", vec![reference("C")]));
        program.add_method(caller("C", vec![get_key]));

        let api = InputApi::default();
        let entry = program.require_method("Game.Player.Update()").unwrap().clone();
        let names: Vec<String> = ReachableMethods::new(&program, &entry, &api)
            .map(|method| method.name().to_string())
            .collect();
        assert_eq!(names, vec!["Update", "A", "C", "GetKey", "B"]);

        assert_eq!(methods_to_analyze(&program, &entry, &api).len(), 4);
        assert!(reaches_input_api(&program, &entry, &api));

        let b = program.require_method("Game.Player.B()").unwrap().clone();
        assert!(reaches_input_api(&program, &b, &api));
    }
}
