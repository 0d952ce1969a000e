//! Backward slicing of the dependence graph from the input dependent
//! instructions.

use crate::analysis::{DepGraph, DepNode, InputAnalysis, InputAnalysisResult, InstructionNode};
use crate::config::InputApi;
use crate::il;
use crate::Error;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Bytecode offsets in the slice, per method signature. A method reached
/// only through its entry is present with no offsets.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Slice {
    methods: BTreeMap<String, BTreeSet<u32>>,
}

impl Slice {
    pub fn new() -> Slice {
        Slice::default()
    }

    pub fn methods(&self) -> &BTreeMap<String, BTreeSet<u32>> {
        &self.methods
    }

    pub fn offsets(&self, signature: &str) -> Option<&BTreeSet<u32>> {
        self.methods.get(signature)
    }

    pub fn contains_method(&self, signature: &str) -> bool {
        self.methods.contains_key(signature)
    }

    pub fn contains(&self, signature: &str, offset: u32) -> bool {
        self.methods
            .get(signature)
            .map(|offsets| offsets.contains(&offset))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Union `other` into this slice.
    pub fn merge(&mut self, other: &Slice) {
        for (signature, offsets) in &other.methods {
            self.methods
                .entry(signature.clone())
                .or_default()
                .extend(offsets.iter().cloned());
        }
    }
}

/// Every node the input dependent instructions transitively depend on.
pub fn compute_slice(
    program: &il::Program,
    dep_graph: &DepGraph,
    input: &InputAnalysisResult,
) -> Result<Slice, Error> {
    let mut queue: Vec<DepNode> = Vec::new();
    for (signature, locations) in input.methods() {
        let method = program.require_method(signature)?;
        for location in locations {
            let instruction = method.instruction(*location)?;
            queue.push(DepNode::Instruction(InstructionNode::new(
                method,
                *location,
                instruction,
            )));
        }
    }

    let mut visited: FxHashSet<DepNode> = queue.iter().cloned().collect();
    let mut slice = Slice::new();

    while let Some(node) = queue.pop() {
        match &node {
            DepNode::Method(signature) => {
                slice.methods.entry(signature.clone()).or_default();
            }
            DepNode::Instruction(instruction) => {
                let method = program.require_method(instruction.method())?;
                let offsets = method.instruction(instruction.location())?.offsets();
                slice
                    .methods
                    .entry(instruction.method().to_string())
                    .or_default()
                    .extend(offsets);
            }
            DepNode::Field(_) => {}
        }

        for predecessor in dep_graph.incoming(&node) {
            if visited.insert(predecessor.clone()) {
                queue.push(predecessor.clone());
            }
        }
    }

    Ok(slice)
}

/// The input slice of one entry point.
pub fn slice_entry_point(
    program: &il::Program,
    entry: &il::Method,
    input_api: &InputApi,
) -> Result<Slice, Error> {
    let input = InputAnalysis::new(program, entry, input_api).analyze()?;
    let dep_graph = DepGraph::build(program, entry, input_api)?;
    compute_slice(program, &dep_graph, &input)
}

/// The union of the slices of every entry point.
pub fn combine<I>(slices: I) -> Slice
where
    I: IntoIterator<Item = Slice>,
{
    let mut combined = Slice::new();
    for slice in slices {
        combined.merge(&slice);
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::*;

    /// void Update() {
    ///     int a = 1;
    ///     int b = 2;
    ///     float x = Input.GetAxis("Horizontal") + a;
    ///     if (x > 0) { b = 3; }
    /// }
    fn game() -> Program {
        let get_axis = MethodRef::static_(
            "UnityEngine.Input",
            "GetAxis",
            vec![Type::String],
            Type::Single,
        );
        let a = Variable::local("a", Type::Single);
        let b = Variable::local("b", Type::Int32);
        let x = Variable::local("x", Type::Single);

        let mut body = Body::new();
        let head = body.new_block();
        let then = body.new_block();
        let done = body.new_block();
        body.emit(head, Operation::stloc(&a, ldc_f4(1.0))).unwrap();
        body.emit(head, Operation::stloc(&b, ldc_i4(2))).unwrap();
        body.emit(
            head,
            Operation::stloc(
                &x,
                add(call(get_axis, vec![ldstr("Horizontal")]), ldloc(&a)),
            ),
        )
        .unwrap();
        body.emit(
            head,
            Operation::if_(
                comp(ComparisonKind::LessThanOrEqual, ldloc(&x), ldc_f4(0.0)),
                done,
            ),
        )
        .unwrap();
        body.emit(then, Operation::stloc(&b, ldc_i4(3))).unwrap();
        body.emit(done, Operation::ret()).unwrap();

        let mut program = Program::new("Game");
        program.add_method(
            Method::builder("Game.Player", "Update")
                .module("Game")
                .body(body)
                .build(),
        );
        program
    }

    #[test]
    fn slice_follows_dependences_backward() {
        let program = game();
        let entry = program.require_method("Game.Player.Update()").unwrap();
        let slice = slice_entry_point(&program, entry, &InputApi::default()).unwrap();

        let offsets: Vec<u32> = slice
            .offsets("Game.Player.Update()")
            .unwrap()
            .iter()
            .cloned()
            .collect();
        assert_eq!(offsets, vec![0, 2, 3]);
    }

    #[test]
    fn combine_unions_offsets() {
        let mut first = Slice::new();
        first.methods.insert("A()".to_string(), vec![1, 2].into_iter().collect());
        let mut second = Slice::new();
        second.methods.insert("A()".to_string(), vec![3].into_iter().collect());
        second.methods.insert("B()".to_string(), BTreeSet::new());

        let combined = combine(vec![first, second]);
        assert!(combined.contains("A()", 1));
        assert!(combined.contains("A()", 3));
        assert!(combined.contains_method("B()"));
        assert!(!combined.contains("B()", 0));
    }
}
