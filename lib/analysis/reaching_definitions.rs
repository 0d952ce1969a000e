use crate::analysis::fixed_point;
use crate::analysis::{Cfg, CfgNode};
use crate::il;
use crate::Error;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A definition of a local variable: the variable name and the node
/// assigning it.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Definition {
    variable: String,
    node: CfgNode,
}

impl Definition {
    pub fn new<S: Into<String>>(variable: S, node: CfgNode) -> Definition {
        Definition {
            variable: variable.into(),
            node,
        }
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn node(&self) -> &CfgNode {
        &self.node
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.node, self.variable)
    }
}

/// Compute, for every node of `cfg`, the definitions reaching the point just
/// before it.
pub fn reaching_definitions(
    method: &il::Method,
    cfg: &Cfg,
) -> Result<FxHashMap<CfgNode, BTreeSet<Definition>>, Error> {
    let rda = ReachingDefinitionsAnalysis { method };
    let out_states = fixed_point::fixed_point_forward(&rda, cfg)?;

    let mut in_states = FxHashMap::default();
    for node in cfg.nodes() {
        let in_state = fixed_point::in_state(&rda, cfg, &out_states, node)?.unwrap_or_default();
        in_states.insert(node.clone(), in_state);
    }
    Ok(in_states)
}

// We require a struct to implement methods for our analysis over.
struct ReachingDefinitionsAnalysis<'m> {
    method: &'m il::Method,
}

impl<'m> fixed_point::FixedPointAnalysis<BTreeSet<Definition>> for ReachingDefinitionsAnalysis<'m> {
    fn trans(
        &self,
        node: &CfgNode,
        state: Option<BTreeSet<Definition>>,
    ) -> Result<BTreeSet<Definition>, Error> {
        let mut state = state.unwrap_or_default();

        let location = match node.location() {
            Some(location) => location,
            None => return Ok(state),
        };

        if let il::Operation::StLoc { variable, .. } = self.method.instruction(location)?.operation() {
            state.retain(|definition| definition.variable() != variable.name());
            state.insert(Definition::new(variable.name(), node.clone()));
        }

        Ok(state)
    }

    fn join(
        &self,
        mut state0: BTreeSet<Definition>,
        state1: &BTreeSet<Definition>,
    ) -> Result<BTreeSet<Definition>, Error> {
        state1.iter().for_each(|definition| {
            state0.insert(definition.clone());
        });
        Ok(state0)
    }
}

#[test]
fn reaching_definitions_test() {
    /*
    a = in
    b = 4
    if a < 10 {
        c = a
    }
    else {
        c = b
    }
    b = c
    */
    use crate::il::*;

    let input = Variable::parameter("input", 0, Type::Int32);
    let a = Variable::local("a", Type::Int32);
    let b = Variable::local("b", Type::Int32);
    let c = Variable::local("c", Type::Int32);

    let mut body = Body::new();
    let head = body.new_block();
    let lt = body.new_block();
    let gt = body.new_block();
    let tail = body.new_block();

    body.emit(head, Operation::stloc(&a, ldloc(&input))).unwrap();
    body.emit(head, Operation::stloc(&b, ldc_i4(4))).unwrap();
    body.emit(
        head,
        Operation::if_(comp(ComparisonKind::GreaterThanOrEqual, ldloc(&a), ldc_i4(10)), gt),
    )
    .unwrap();
    body.emit(lt, Operation::stloc(&c, ldloc(&a))).unwrap();
    body.emit_glue(lt, tail).unwrap();
    body.emit(gt, Operation::stloc(&c, ldloc(&b))).unwrap();
    body.emit(tail, Operation::stloc(&b, ldloc(&c))).unwrap();
    body.emit(tail, Operation::ret()).unwrap();

    let method = Method::builder("Test", "Defs")
        .parameter("input", Type::Int32)
        .body(body)
        .build();
    let cfg = Cfg::from_method(&method).unwrap();
    let rd = reaching_definitions(&method, &cfg).unwrap();

    let node = |block, index| {
        let location = InstructionLocation::new(block, index);
        CfgNode::instruction(&method, location, method.instruction(location).unwrap())
    };

    let r = &rd[&node(3, 0)];

    assert!(r.contains(&Definition::new("a", node(0, 0))));
    assert!(r.contains(&Definition::new("b", node(0, 1))));
    assert!(r.contains(&Definition::new("c", node(1, 0))));
    assert!(r.contains(&Definition::new("c", node(2, 0))));
    assert_eq!(r.len(), 4);

    let r = &rd[&node(3, 1)];
    assert!(r.contains(&Definition::new("b", node(3, 0))));
    assert!(!r.contains(&Definition::new("b", node(0, 1))));
}
