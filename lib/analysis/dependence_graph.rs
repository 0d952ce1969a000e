//! A system dependence graph over every method analyzed from an entry point.
//!
//! Edges point from what is depended upon to the dependent:
//!
//! * data flow: a `stloc` to every instruction reading the variable it
//! defines, and a method to every instruction reading one of its parameters.
//! * control dependence: a branch to every instruction whose execution it
//! decides. Instructions executed on every path depend on their method.
//! * fields: a field store to the field, the field to every instruction
//! loading it.
//! * calls: a call site to the callee, every `leave` of the callee back to the
//! call site.

use crate::analysis::{
    methods_to_analyze, reaching_definitions, Cfg, CfgNode, DominatorTree, InstructionNode,
};
use crate::config::InputApi;
use crate::graph;
use crate::il;
use crate::Error;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum DepNode {
    /// A method, by signature. Stands for its entry.
    Method(String),
    Instruction(InstructionNode),
    /// A field, by signature.
    Field(String),
}

impl DepNode {
    pub fn as_instruction(&self) -> Option<&InstructionNode> {
        match self {
            DepNode::Instruction(node) => Some(node),
            _ => None,
        }
    }
}

impl fmt::Display for DepNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DepNode::Method(signature) => write!(f, "method {}", signature),
            DepNode::Instruction(node) => write!(f, "{}: {}", node.method(), node),
            DepNode::Field(signature) => write!(f, "field {}", signature),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum DepEdgeKind {
    /// A branch decides whether the target runs.
    ControlDependenceBranch,
    /// A call site and its callee, either way.
    ControlDependenceMethodCall,
    /// The target reads a variable or parameter the source defines.
    DataDependenceVariable,
    /// A field store to the field, or the field to a load of it.
    DataDependenceField,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
struct DepVertex {
    index: usize,
    node: DepNode,
}

impl graph::Vertex for DepVertex {
    fn index(&self) -> usize {
        self.index
    }

    fn dot_label(&self) -> String {
        self.node.to_string()
    }

    fn dot_fill_color(&self) -> String {
        match self.node {
            DepNode::Method(_) => "#ccddff".to_string(),
            DepNode::Instruction(_) => "#ffddcc".to_string(),
            DepNode::Field(_) => "#ddffcc".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
struct DepEdge {
    head: usize,
    tail: usize,
    kinds: BTreeSet<DepEdgeKind>,
}

impl graph::Edge for DepEdge {
    fn head(&self) -> usize {
        self.head
    }

    fn tail(&self) -> usize {
        self.tail
    }

    fn dot_label(&self) -> String {
        String::new()
    }

    fn dot_color(&self) -> String {
        if self.kinds.len() > 1 {
            return "black".to_string();
        }
        match self.kinds.iter().next() {
            Some(DepEdgeKind::ControlDependenceBranch) => "blue".to_string(),
            Some(DepEdgeKind::ControlDependenceMethodCall) => "red".to_string(),
            Some(DepEdgeKind::DataDependenceVariable) => "green".to_string(),
            Some(DepEdgeKind::DataDependenceField) => "orange".to_string(),
            None => "black".to_string(),
        }
    }
}

/// The dependence graph. One edge joins two nodes and carries every kind of
/// dependence between them.
#[derive(Clone, Debug)]
pub struct DepGraph {
    graph: graph::Graph<DepVertex, DepEdge>,
    indices: FxHashMap<DepNode, usize>,
}

impl DepGraph {
    pub fn new() -> DepGraph {
        DepGraph {
            graph: graph::Graph::new(),
            indices: FxHashMap::default(),
        }
    }

    /// Build the dependence graph of every method analyzed from `entry`.
    pub fn build(
        program: &il::Program,
        entry: &il::Method,
        input_api: &InputApi,
    ) -> Result<DepGraph, Error> {
        let methods = methods_to_analyze(program, entry, input_api);

        // The leave instructions of every analyzed method, for return edges.
        let mut leaves: BTreeMap<String, Vec<DepNode>> = BTreeMap::new();
        for method in &methods {
            let body = method.require_body()?;
            let nodes = body
                .locations()
                .into_iter()
                .filter(|(_, instruction)| {
                    matches!(instruction.operation(), il::Operation::Leave { .. })
                })
                .map(|(location, instruction)| {
                    DepNode::Instruction(InstructionNode::new(method, location, instruction))
                })
                .collect();
            leaves.insert(method.signature(), nodes);
        }

        let mut dep_graph = DepGraph::new();
        for method in &methods {
            let cfg = Cfg::from_method(method)?;
            dep_graph.add_data_flow(method, &cfg)?;
            dep_graph.add_control_dependence(method, &cfg)?;
            dep_graph.add_fields_and_calls(method, &cfg, &leaves)?;
        }

        debug!(
            "dependence graph of {}: {} nodes, {} edges",
            entry.signature(),
            dep_graph.num_nodes(),
            dep_graph.num_edges()
        );

        Ok(dep_graph)
    }

    /// The dependence node standing for a control flow node. `Exit` has none.
    fn map_node(method: &il::Method, node: &CfgNode) -> Option<DepNode> {
        match node {
            CfgNode::Entry | CfgNode::Start => Some(DepNode::Method(method.signature())),
            CfgNode::Exit => None,
            CfgNode::Instruction(instruction) => Some(DepNode::Instruction(instruction.clone())),
        }
    }

    fn add_data_flow(&mut self, method: &il::Method, cfg: &Cfg) -> Result<(), Error> {
        let definitions = reaching_definitions(method, cfg)?;
        let method_node = DepNode::Method(method.signature());

        for node in cfg.nodes() {
            let location = match node.location() {
                Some(location) => location,
                None => continue,
            };
            let operation = method.instruction(location)?.operation();
            let target = match DepGraph::map_node(method, node) {
                Some(target) => target,
                None => continue,
            };

            // The stored variable of a stloc is a definition, not a use.
            let mut used: BTreeSet<&str> = BTreeSet::new();
            let mut reads_parameter = false;
            for expression in operation.expressions() {
                expression.walk(&mut |expr| {
                    if let il::Expression::LdLoc(variable) | il::Expression::LdLoca(variable) = expr {
                        used.insert(variable.name());
                        if variable.is_parameter() {
                            reads_parameter = true;
                        }
                    }
                });
            }

            if let Some(reaching) = definitions.get(node) {
                for definition in reaching {
                    if !used.contains(definition.variable()) {
                        continue;
                    }
                    if let Some(source) = DepGraph::map_node(method, definition.node()) {
                        self.add_edge(source, target.clone(), DepEdgeKind::DataDependenceVariable)?;
                    }
                }
            }

            if reads_parameter {
                self.add_edge(method_node.clone(), target, DepEdgeKind::DataDependenceVariable)?;
            }
        }
        Ok(())
    }

    /// Control dependence from the post-dominator tree of the graph
    /// augmented with `START -> ENTRY` and `START -> EXIT`. For every edge
    /// `m -> n` where `n` does not post-dominate `m`, each node from `n` up
    /// to, but excluding, the lowest common post-dominator of `m` and `n` is
    /// control dependent on `m`.
    fn add_control_dependence(&mut self, method: &il::Method, cfg: &Cfg) -> Result<(), Error> {
        let mut augmented = cfg.clone();
        augmented.add_edge(CfgNode::Start, CfgNode::Entry)?;
        augmented.add_edge(CfgNode::Start, CfgNode::Exit)?;
        let post_dominators = DominatorTree::new(&augmented.reverse())?;

        for (m, n) in augmented.edges() {
            // Nodes that never reach the exit, such as infinite loops, have
            // no post-dominators.
            if !post_dominators.contains(m) || !post_dominators.contains(n) {
                continue;
            }
            if post_dominators.dominates(n, m) {
                continue;
            }
            let source = match DepGraph::map_node(method, m) {
                Some(source) => source,
                None => continue,
            };
            let lca = post_dominators.lowest_common_ancestor(m, n).clone();
            let mut current = Some(n);
            while let Some(k) = current {
                if *k == lca {
                    break;
                }
                if let Some(target) = DepGraph::map_node(method, k) {
                    if target != source {
                        self.add_edge(source.clone(), target, DepEdgeKind::ControlDependenceBranch)?;
                    }
                }
                current = post_dominators.parent(k);
            }
        }
        Ok(())
    }

    fn add_fields_and_calls(
        &mut self,
        method: &il::Method,
        cfg: &Cfg,
        leaves: &BTreeMap<String, Vec<DepNode>>,
    ) -> Result<(), Error> {
        for node in cfg.nodes() {
            let location = match node.location() {
                Some(location) => location,
                None => continue,
            };
            let target = match DepGraph::map_node(method, node) {
                Some(target) => target,
                None => continue,
            };
            let operation = method.instruction(location)?.operation();

            match operation {
                il::Operation::StFld { field, .. } | il::Operation::StsFld { field, .. } => {
                    self.add_edge(
                        target.clone(),
                        DepNode::Field(field.signature()),
                        DepEdgeKind::DataDependenceField,
                    )?;
                }
                _ => {}
            }

            let mut loaded: BTreeSet<String> = BTreeSet::new();
            for expression in operation.expressions() {
                expression.walk(&mut |expr| match expr {
                    il::Expression::LdFld { field, .. } | il::Expression::LdsFld(field) => {
                        loaded.insert(field.signature());
                    }
                    _ => {}
                });
            }
            for field in loaded {
                self.add_edge(DepNode::Field(field), target.clone(), DepEdgeKind::DataDependenceField)?;
            }

            for call in operation.calls() {
                let callee = call.method().signature();
                let callee_leaves = match leaves.get(&callee) {
                    Some(callee_leaves) => callee_leaves,
                    None => continue,
                };
                self.add_edge(target.clone(), DepNode::Method(callee), DepEdgeKind::ControlDependenceMethodCall)?;
                for leave in callee_leaves {
                    self.add_edge(leave.clone(), target.clone(), DepEdgeKind::ControlDependenceMethodCall)?;
                }
            }
        }
        Ok(())
    }

    fn add_node(&mut self, node: DepNode) -> Result<usize, Error> {
        if let Some(index) = self.indices.get(&node) {
            return Ok(*index);
        }
        let index = self.indices.len();
        self.graph.insert_vertex(DepVertex {
            index,
            node: node.clone(),
        })?;
        self.indices.insert(node, index);
        Ok(index)
    }

    /// Add an edge from `source` to the node depending on it.
    pub fn add_edge(
        &mut self,
        source: DepNode,
        target: DepNode,
        kind: DepEdgeKind,
    ) -> Result<(), Error> {
        let head = self.add_node(source)?;
        let tail = self.add_node(target)?;
        if self.graph.has_edge(head, tail) {
            self.graph.edge_mut(head, tail)?.kinds.insert(kind);
        } else {
            let mut kinds = BTreeSet::new();
            kinds.insert(kind);
            self.graph.insert_edge(DepEdge { head, tail, kinds })?;
        }
        Ok(())
    }

    pub fn contains(&self, node: &DepNode) -> bool {
        self.indices.contains_key(node)
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.num_vertices()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.num_edges()
    }

    pub fn nodes(&self) -> Vec<&DepNode> {
        self.graph
            .vertices()
            .into_iter()
            .map(|vertex| &vertex.node)
            .collect()
    }

    /// The kinds of dependence of `target` on `source`. Empty when there is
    /// no edge.
    pub fn edge_kinds(&self, source: &DepNode, target: &DepNode) -> BTreeSet<DepEdgeKind> {
        match (self.indices.get(source), self.indices.get(target)) {
            (Some(head), Some(tail)) => self
                .graph
                .edge(*head, *tail)
                .map(|edge| edge.kinds.clone())
                .unwrap_or_default(),
            _ => BTreeSet::new(),
        }
    }

    pub fn has_edge_kind(&self, source: &DepNode, target: &DepNode, kind: DepEdgeKind) -> bool {
        self.edge_kinds(source, target).contains(&kind)
    }

    /// The nodes `node` depends on directly.
    pub fn incoming(&self, node: &DepNode) -> Vec<&DepNode> {
        self.indices
            .get(node)
            .and_then(|index| self.graph.predecessors(*index).ok())
            .map(|vertices| vertices.into_iter().map(|vertex| &vertex.node).collect())
            .unwrap_or_default()
    }

    pub fn dot_graph(&self) -> String {
        self.graph.dot_graph()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::*;

    /// class Player {
    ///     float speed;
    ///     void Update() {
    ///         float x = Input.GetAxis("Horizontal");
    ///         if (x <= 0) goto done;
    ///         speed = x;
    ///     done:
    ///         Log(speed);
    ///     }
    ///     void Log(float value) { return; }
    /// }
    fn game() -> Program {
        let get_axis = MethodRef::static_(
            "UnityEngine.Input",
            "GetAxis",
            vec![Type::String],
            Type::Single,
        );
        let log = MethodRef::instance("Game.Player", "Log", vec![Type::Single], Type::Void);
        let speed = FieldRef::instance("Game.Player", "speed", Type::Single);
        let this = Variable::this(Type::object("Game.Player"));
        let x = Variable::local("x", Type::Single);

        let mut body = Body::new();
        let head = body.new_block();
        let then = body.new_block();
        let done = body.new_block();
        body.emit(head, Operation::stloc(&x, call(get_axis, vec![ldstr("Horizontal")])))
            .unwrap();
        body.emit(
            head,
            Operation::if_(
                comp(ComparisonKind::LessThanOrEqual, ldloc(&x), ldc_f4(0.0)),
                done,
            ),
        )
        .unwrap();
        body.emit(then, Operation::stfld(ldloc(&this), speed.clone(), ldloc(&x)))
            .unwrap();
        body.emit(
            done,
            Operation::call(log, vec![ldloc(&this), ldfld(ldloc(&this), speed)]),
        )
        .unwrap();
        body.emit(done, Operation::ret()).unwrap();
        let update = Method::builder("Game.Player", "Update")
            .module("Game")
            .body(body)
            .build();

        let mut body = Body::new();
        let block = body.new_block();
        body.emit(block, Operation::ret()).unwrap();
        let log = Method::builder("Game.Player", "Log")
            .parameter("value", Type::Single)
            .module("Game")
            .body(body)
            .build();

        let mut program = Program::new("Game");
        program.add_method(update);
        program.add_method(log);
        program
    }

    fn node(program: &Program, signature: &str, block: usize, index: usize) -> DepNode {
        let method = program.require_method(signature).unwrap();
        let location = InstructionLocation::new(block, index);
        DepNode::Instruction(InstructionNode::new(
            method,
            location,
            method.instruction(location).unwrap(),
        ))
    }

    #[test]
    fn control_dependence() {
        let program = game();
        let entry = program.require_method("Game.Player.Update()").unwrap();
        let dep_graph = DepGraph::build(&program, entry, &InputApi::default()).unwrap();

        let update = DepNode::Method("Game.Player.Update()".to_string());
        let branch = node(&program, "Game.Player.Update()", 0, 1);
        let store = node(&program, "Game.Player.Update()", 1, 0);
        let log = node(&program, "Game.Player.Update()", 2, 0);

        use DepEdgeKind::*;
        assert!(dep_graph.has_edge_kind(&branch, &store, ControlDependenceBranch));
        assert!(dep_graph.edge_kinds(&branch, &log).is_empty());
        assert!(dep_graph.has_edge_kind(&update, &branch, ControlDependenceBranch));
        // The call reads `this` and runs on every path, so it depends on its
        // method both ways.
        let both: BTreeSet<DepEdgeKind> = vec![ControlDependenceBranch, DataDependenceVariable]
            .into_iter()
            .collect();
        assert_eq!(dep_graph.edge_kinds(&update, &log), both);
        assert!(dep_graph.has_edge_kind(&update, &store, DataDependenceVariable));
        assert!(!dep_graph.has_edge_kind(&update, &store, ControlDependenceBranch));

        let read = node(&program, "Game.Player.Update()", 0, 0);
        assert!(dep_graph.has_edge_kind(&update, &read, ControlDependenceBranch));
        assert!(dep_graph.edge_kinds(&branch, &read).is_empty());
    }

    #[test]
    fn data_field_and_call_edges() {
        let program = game();
        let entry = program.require_method("Game.Player.Update()").unwrap();
        let dep_graph = DepGraph::build(&program, entry, &InputApi::default()).unwrap();

        let read = node(&program, "Game.Player.Update()", 0, 0);
        let branch = node(&program, "Game.Player.Update()", 0, 1);
        let store = node(&program, "Game.Player.Update()", 1, 0);
        let call_site = node(&program, "Game.Player.Update()", 2, 0);
        let speed = DepNode::Field("Game.Player.speed".to_string());
        let log = DepNode::Method("Game.Player.Log(System.Single)".to_string());
        let log_leave = node(&program, "Game.Player.Log(System.Single)", 0, 0);

        use DepEdgeKind::*;
        assert!(dep_graph.has_edge_kind(&read, &branch, DataDependenceVariable));
        assert!(dep_graph.has_edge_kind(&store, &speed, DataDependenceField));
        assert!(dep_graph.has_edge_kind(&speed, &call_site, DataDependenceField));
        assert!(dep_graph.has_edge_kind(&call_site, &log, ControlDependenceMethodCall));
        assert!(dep_graph.has_edge_kind(&log_leave, &call_site, ControlDependenceMethodCall));

        let incoming = dep_graph.incoming(&branch);
        assert!(incoming.contains(&&read));
    }

    #[test]
    fn every_kind_between_two_nodes_is_kept() {
        let program = game();
        let read = node(&program, "Game.Player.Update()", 0, 0);
        let branch = node(&program, "Game.Player.Update()", 0, 1);

        let mut dep_graph = DepGraph::new();
        dep_graph
            .add_edge(read.clone(), branch.clone(), DepEdgeKind::DataDependenceVariable)
            .unwrap();
        dep_graph
            .add_edge(read.clone(), branch.clone(), DepEdgeKind::DataDependenceField)
            .unwrap();
        dep_graph
            .add_edge(read.clone(), branch.clone(), DepEdgeKind::DataDependenceVariable)
            .unwrap();

        assert_eq!(dep_graph.num_edges(), 1);
        assert!(dep_graph.has_edge_kind(&read, &branch, DepEdgeKind::DataDependenceVariable));
        assert!(dep_graph.has_edge_kind(&read, &branch, DepEdgeKind::DataDependenceField));
        assert_eq!(dep_graph.edge_kinds(&read, &branch).len(), 2);
        assert!(dep_graph.edge_kinds(&branch, &read).is_empty());
    }
}
