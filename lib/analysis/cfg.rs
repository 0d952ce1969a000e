//! An instruction level control flow graph with sentinel nodes, cheap to
//! reverse for post-dominance.

use crate::analysis::InstructionGraph;
use crate::graph;
use crate::il;
use crate::il::InstructionLocation;
use crate::Error;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An instruction as a graph node.
///
/// Nodes compare by content: the owning method signature, the location and
/// the printed instruction. Two graphs built from the same method agree on
/// every node.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct InstructionNode {
    method: String,
    location: InstructionLocation,
    text: String,
}

impl InstructionNode {
    pub fn new(
        method: &il::Method,
        location: InstructionLocation,
        instruction: &il::Instruction,
    ) -> InstructionNode {
        InstructionNode {
            method: method.signature(),
            location,
            text: instruction.to_string(),
        }
    }

    /// Signature of the method owning this instruction.
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn location(&self) -> InstructionLocation {
        self.location
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for InstructionNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum CfgNode {
    Entry,
    Exit,
    /// Only present in graphs augmented for control dependence.
    Start,
    Instruction(InstructionNode),
}

impl CfgNode {
    pub fn instruction(
        method: &il::Method,
        location: InstructionLocation,
        instruction: &il::Instruction,
    ) -> CfgNode {
        CfgNode::Instruction(InstructionNode::new(method, location, instruction))
    }

    pub fn as_instruction(&self) -> Option<&InstructionNode> {
        match self {
            CfgNode::Instruction(node) => Some(node),
            _ => None,
        }
    }

    pub fn location(&self) -> Option<InstructionLocation> {
        self.as_instruction().map(|node| node.location())
    }

    pub fn is_sentinel(&self) -> bool {
        !matches!(self, CfgNode::Instruction(_))
    }
}

impl fmt::Display for CfgNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CfgNode::Entry => write!(f, "entry"),
            CfgNode::Exit => write!(f, "exit"),
            CfgNode::Start => write!(f, "start"),
            CfgNode::Instruction(node) => write!(f, "{}", node),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
struct CfgVertex {
    index: usize,
    node: CfgNode,
}

impl graph::Vertex for CfgVertex {
    fn index(&self) -> usize {
        self.index
    }

    fn dot_label(&self) -> String {
        self.node.to_string()
    }

    fn dot_fill_color(&self) -> String {
        if self.node.is_sentinel() {
            "#ccddff".to_string()
        } else {
            "#ffddcc".to_string()
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
struct CfgEdge {
    head: usize,
    tail: usize,
}

impl graph::Edge for CfgEdge {
    fn head(&self) -> usize {
        self.head
    }

    fn tail(&self) -> usize {
        self.tail
    }

    fn dot_label(&self) -> String {
        String::new()
    }
}

/// A control flow graph over `CfgNode`s.
#[derive(Clone, Debug)]
pub struct Cfg {
    graph: graph::Graph<CfgVertex, CfgEdge>,
    indices: FxHashMap<CfgNode, usize>,
}

impl Cfg {
    pub fn new() -> Cfg {
        Cfg {
            graph: graph::Graph::new(),
            indices: FxHashMap::default(),
        }
    }

    /// Build the control flow graph of `method`.
    ///
    /// `ENTRY` leads to the first instruction, and every instruction without
    /// successors (returns, throws) leads to `EXIT`. An empty body is just
    /// `ENTRY -> EXIT`.
    pub fn from_method(method: &il::Method) -> Result<Cfg, Error> {
        let instruction_graph = InstructionGraph::new(method)?;
        Cfg::from_instruction_graph(&instruction_graph)
    }

    pub fn from_instruction_graph(instruction_graph: &InstructionGraph) -> Result<Cfg, Error> {
        let method = instruction_graph.method();
        let mut cfg = Cfg::new();

        let node = |location: InstructionLocation| -> Result<CfgNode, Error> {
            let instruction = instruction_graph.instruction(location)?;
            Ok(CfgNode::instruction(method, location, instruction))
        };

        let first = match instruction_graph.first() {
            Some(first) => first,
            None => {
                cfg.add_edge(CfgNode::Entry, CfgNode::Exit)?;
                return Ok(cfg);
            }
        };

        cfg.add_edge(CfgNode::Entry, node(first)?)?;

        for &location in instruction_graph.locations() {
            let source = node(location)?;
            let successors = instruction_graph.successors(location);
            for &successor in successors {
                let target = node(successor)?;
                if source != target {
                    cfg.add_edge(source.clone(), target)?;
                }
            }
            if successors.is_empty() {
                cfg.add_edge(source, CfgNode::Exit)?;
            }
        }

        Ok(cfg)
    }

    fn add_node(&mut self, node: CfgNode) -> Result<usize, Error> {
        if let Some(index) = self.indices.get(&node) {
            return Ok(*index);
        }
        let index = self.indices.len();
        self.graph.insert_vertex(CfgVertex {
            index,
            node: node.clone(),
        })?;
        self.indices.insert(node, index);
        Ok(index)
    }

    /// Add an edge, and its endpoints when they are new. Adding an existing
    /// edge does nothing.
    pub fn add_edge(&mut self, source: CfgNode, target: CfgNode) -> Result<(), Error> {
        let head = self.add_node(source)?;
        let tail = self.add_node(target)?;
        if !self.graph.has_edge(head, tail) {
            self.graph.insert_edge(CfgEdge { head, tail })?;
        }
        Ok(())
    }

    pub fn contains(&self, node: &CfgNode) -> bool {
        self.indices.contains_key(node)
    }

    pub fn index(&self, node: &CfgNode) -> Option<usize> {
        self.indices.get(node).cloned()
    }

    pub fn node(&self, index: usize) -> Result<&CfgNode, Error> {
        self.graph.vertex(index).map(|vertex| &vertex.node)
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.num_vertices()
    }

    /// Every node, in insertion order.
    pub fn nodes(&self) -> Vec<&CfgNode> {
        self.graph
            .vertices()
            .into_iter()
            .map(|vertex| &vertex.node)
            .collect()
    }

    /// Every edge as a (source, target) pair.
    pub fn edges(&self) -> Vec<(&CfgNode, &CfgNode)> {
        self.graph
            .edges()
            .into_iter()
            .filter_map(|edge| {
                let head = self.graph.vertex(edge.head).ok()?;
                let tail = self.graph.vertex(edge.tail).ok()?;
                Some((&head.node, &tail.node))
            })
            .collect()
    }

    pub fn successors(&self, node: &CfgNode) -> Vec<&CfgNode> {
        self.index(node)
            .and_then(|index| self.graph.successors(index).ok())
            .map(|vertices| vertices.into_iter().map(|vertex| &vertex.node).collect())
            .unwrap_or_default()
    }

    pub fn predecessors(&self, node: &CfgNode) -> Vec<&CfgNode> {
        self.index(node)
            .and_then(|index| self.graph.predecessors(index).ok())
            .map(|vertices| vertices.into_iter().map(|vertex| &vertex.node).collect())
            .unwrap_or_default()
    }

    /// The node without predecessors. Sentinels win over instructions left
    /// unreachable by the decompiler.
    ///
    /// # Panics
    /// Panics if every node has a predecessor. Graphs built by `from_method`
    /// and their reversals always have a head.
    pub fn find_head(&self) -> &CfgNode {
        let heads: Vec<&CfgNode> = self
            .graph
            .vertices_without_predecessors()
            .into_iter()
            .map(|vertex| &vertex.node)
            .collect();
        heads
            .iter()
            .find(|node| node.is_sentinel())
            .or_else(|| heads.first())
            .cloned()
            .unwrap_or_else(|| panic!("control flow graph has no head"))
    }

    /// Nodes reachable from `root`, in depth first pre-order.
    pub fn pre_order(&self, root: &CfgNode) -> Result<Vec<&CfgNode>, Error> {
        let index = self
            .index(root)
            .ok_or_else(|| Error::Custom(format!("{} is not in the graph", root)))?;
        self.graph
            .compute_pre_order(index)?
            .into_iter()
            .map(|index| self.node(index))
            .collect()
    }

    /// A copy of this graph with every edge flipped.
    pub fn reverse(&self) -> Cfg {
        Cfg {
            graph: self.graph.reversed(|edge| CfgEdge {
                head: edge.tail,
                tail: edge.head,
            }),
            indices: self.indices.clone(),
        }
    }

    pub fn dot_graph(&self) -> String {
        self.graph.dot_graph()
    }
}

impl Default for Cfg {
    fn default() -> Cfg {
        Cfg::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::*;

    fn diamond() -> Method {
        let x = Variable::parameter("x", 0, Type::Int32);
        let y = Variable::local("y", Type::Int32);
        let mut body = Body::new();
        let b0 = body.new_block();
        let b1 = body.new_block();
        let b2 = body.new_block();
        let b3 = body.new_block();
        body.emit(
            b0,
            Operation::if_(comp(ComparisonKind::LessThan, ldloc(&x), ldc_i4(0)), b2),
        )
        .unwrap();
        body.emit(b1, Operation::stloc(&y, ldc_i4(1))).unwrap();
        body.emit_glue(b1, b3).unwrap();
        body.emit(b2, Operation::stloc(&y, ldc_i4(2))).unwrap();
        body.emit(b3, Operation::leave(None)).unwrap();

        Method::builder("Game.Player", "Check")
            .parameter("x", Type::Int32)
            .body(body)
            .build()
    }

    #[test]
    fn entry_and_exit_are_wired() {
        let method = diamond();
        let cfg = Cfg::from_method(&method).unwrap();

        assert_eq!(cfg.num_nodes(), 6);
        assert_eq!(cfg.find_head(), &CfgNode::Entry);
        assert_eq!(cfg.successors(&CfgNode::Entry).len(), 1);
        assert_eq!(cfg.predecessors(&CfgNode::Exit).len(), 1);
        assert!(cfg.successors(&CfgNode::Exit).is_empty());
    }

    #[test]
    fn nodes_compare_by_content() {
        let method = diamond();
        let a = Cfg::from_method(&method).unwrap();
        let b = Cfg::from_method(&method).unwrap();
        let a_nodes: Vec<&CfgNode> = a.nodes();
        for node in a_nodes {
            assert!(b.contains(node));
        }
    }

    #[test]
    fn empty_body_is_entry_to_exit() {
        let method = Method::builder("Game.Player", "Empty").body(Body::new()).build();
        let cfg = Cfg::from_method(&method).unwrap();
        assert_eq!(cfg.edges(), vec![(&CfgNode::Entry, &CfgNode::Exit)]);
    }

    #[test]
    fn reverse_flips_edges() {
        let method = diamond();
        let cfg = Cfg::from_method(&method).unwrap();
        let reversed = cfg.reverse();
        assert_eq!(reversed.find_head(), &CfgNode::Exit);
        for (source, target) in cfg.edges() {
            assert!(reversed.successors(target).contains(&source));
        }
    }
}
