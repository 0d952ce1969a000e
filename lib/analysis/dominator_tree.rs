//! Dominator trees over `Cfg`s.
//!
//! Dominance is computed with the classic iterative data flow formulation,
//! `Dom(head) = {head}` and `Dom(n) = {n} ∪ ⋂ Dom(p)` over the predecessors
//! `p` of `n`. Built over a reversed graph, the same tree answers
//! post-dominance queries.

use crate::analysis::{Cfg, CfgNode};
use crate::Error;
use rustc_hash::{FxHashMap, FxHashSet};

/// Immediate dominators, as a parent map rooted at the head of the graph.
///
/// Nodes are stored once and referred to by index. Nodes the head cannot
/// reach are not part of the tree.
#[derive(Clone, Debug)]
pub struct DominatorTree {
    nodes: Vec<CfgNode>,
    indices: FxHashMap<CfgNode, usize>,
    parents: Vec<Option<usize>>,
}

impl DominatorTree {
    /// Compute the dominator tree of `cfg`, rooted at `cfg.find_head()`.
    pub fn new(cfg: &Cfg) -> Result<DominatorTree, Error> {
        let head = cfg.find_head().clone();
        DominatorTree::with_head(cfg, &head)
    }

    pub fn with_head(cfg: &Cfg, head: &CfgNode) -> Result<DominatorTree, Error> {
        let nodes: Vec<CfgNode> = cfg.pre_order(head)?.into_iter().cloned().collect();
        let indices: FxHashMap<CfgNode, usize> = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.clone(), index))
            .collect();

        let predecessors: Vec<Vec<usize>> = nodes
            .iter()
            .map(|node| {
                cfg.predecessors(node)
                    .into_iter()
                    .filter_map(|predecessor| indices.get(predecessor).cloned())
                    .collect()
            })
            .collect();

        let everything: FxHashSet<usize> = (0..nodes.len()).collect();
        let mut dom: Vec<FxHashSet<usize>> = (0..nodes.len())
            .map(|index| {
                if index == 0 {
                    let mut set = FxHashSet::default();
                    set.insert(0);
                    set
                } else {
                    everything.clone()
                }
            })
            .collect();

        let mut iterations = 0;
        let mut changed = true;
        while changed {
            changed = false;
            iterations += 1;
            for index in 1..nodes.len() {
                let mut new_dom: Option<FxHashSet<usize>> = None;
                for predecessor in &predecessors[index] {
                    new_dom = Some(match new_dom {
                        None => dom[*predecessor].clone(),
                        Some(set) => set.intersection(&dom[*predecessor]).cloned().collect(),
                    });
                }
                let mut new_dom = new_dom.unwrap_or_default();
                new_dom.insert(index);
                if new_dom != dom[index] {
                    dom[index] = new_dom;
                    changed = true;
                }
            }
        }
        trace!("dominators converged after {} iterations", iterations);

        // The immediate dominator of n is the strict dominator whose own
        // dominator set is every strict dominator of n.
        let mut parents = vec![None; nodes.len()];
        for index in 1..nodes.len() {
            let strict = dom[index].len() - 1;
            let idom = dom[index]
                .iter()
                .find(|&&candidate| candidate != index && dom[candidate].len() == strict)
                .cloned();
            match idom {
                Some(idom) => parents[index] = Some(idom),
                None => panic!("{} has no immediate dominator", nodes[index]),
            }
        }

        Ok(DominatorTree {
            nodes,
            indices,
            parents,
        })
    }

    pub fn root(&self) -> &CfgNode {
        &self.nodes[0]
    }

    pub fn contains(&self, node: &CfgNode) -> bool {
        self.indices.contains_key(node)
    }

    /// Every node in the tree.
    pub fn nodes(&self) -> &[CfgNode] {
        &self.nodes
    }

    /// The immediate dominator of `node`. `None` for the root and for nodes
    /// outside the tree.
    pub fn parent(&self, node: &CfgNode) -> Option<&CfgNode> {
        self.indices
            .get(node)
            .and_then(|index| self.parents[*index])
            .map(|parent| &self.nodes[parent])
    }

    /// True if `dominator` dominates `node`. Every node dominates itself.
    pub fn dominates(&self, dominator: &CfgNode, node: &CfgNode) -> bool {
        let dominator = match self.indices.get(dominator) {
            Some(index) => *index,
            None => return false,
        };
        let mut current = self.indices.get(node).cloned();
        while let Some(index) = current {
            if index == dominator {
                return true;
            }
            current = self.parents[index];
        }
        false
    }

    /// `node` followed by each of its dominators up to the root.
    fn ancestor_path(&self, node: &CfgNode) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = self.indices.get(node).cloned();
        while let Some(index) = current {
            path.push(index);
            current = self.parents[index];
        }
        path
    }

    /// The deepest node dominating both `m` and `n`.
    ///
    /// # Panics
    /// Both nodes must belong to this tree.
    pub fn lowest_common_ancestor(&self, m: &CfgNode, n: &CfgNode) -> &CfgNode {
        let m_path = self.ancestor_path(m);
        let n_path = self.ancestor_path(n);
        assert!(
            !m_path.is_empty() && !n_path.is_empty() && m_path.last() == n_path.last(),
            "{} and {} do not share a root",
            m,
            n
        );

        let mut result = m_path[m_path.len() - 1];
        for (a, b) in m_path.iter().rev().zip(n_path.iter().rev()) {
            if a != b {
                break;
            }
            result = *a;
        }
        &self.nodes[result]
    }

    /// The tree in graphviz dot format.
    pub fn dot_graph(&self) -> String {
        let mut lines = vec!["digraph domtree {".to_string()];
        for (index, parent) in self.parents.iter().enumerate() {
            if let Some(parent) = parent {
                lines.push(format!(
                    "  \"{}\" -> \"{}\";",
                    self.nodes[*parent].to_string().replace('"', "\\\""),
                    self.nodes[index].to_string().replace('"', "\\\"")
                ));
            }
        }
        lines.push("}".to_string());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::*;

    /// A loop around a two way branch.
    ///
    /// B0: stloc i(0)
    /// B1: if (i >= 10) br B5
    /// B2: if (i < 5) br B4
    /// B3: stloc x(1)
    /// B4: stloc i(i + 1); br B1
    /// B5: leave
    fn looping() -> Method {
        let i = Variable::local("i", Type::Int32);
        let x = Variable::local("x", Type::Int32);
        let mut body = Body::new();
        let blocks: Vec<usize> = (0..6).map(|_| body.new_block()).collect();
        body.emit(blocks[0], Operation::stloc(&i, ldc_i4(0))).unwrap();
        body.emit(
            blocks[1],
            Operation::if_(
                comp(ComparisonKind::GreaterThanOrEqual, ldloc(&i), ldc_i4(10)),
                blocks[5],
            ),
        )
        .unwrap();
        body.emit(
            blocks[2],
            Operation::if_(
                comp(ComparisonKind::LessThan, ldloc(&i), ldc_i4(5)),
                blocks[4],
            ),
        )
        .unwrap();
        body.emit(blocks[3], Operation::stloc(&x, ldc_i4(1))).unwrap();
        body.emit(blocks[4], Operation::stloc(&i, add(ldloc(&i), ldc_i4(1))))
            .unwrap();
        body.emit(blocks[4], Operation::branch(blocks[1])).unwrap();
        body.emit(blocks[5], Operation::ret()).unwrap();
        Method::builder("Game.Counter", "Update").body(body).build()
    }

    fn node_at(cfg: &Cfg, block: usize, index: usize) -> CfgNode {
        cfg.nodes()
            .into_iter()
            .find(|node| node.location() == Some(InstructionLocation::new(block, index)))
            .cloned()
            .unwrap()
    }

    #[test]
    fn head_dominates_everything() {
        let cfg = Cfg::from_method(&looping()).unwrap();
        let tree = DominatorTree::new(&cfg).unwrap();
        assert_eq!(tree.root(), &CfgNode::Entry);
        for node in cfg.nodes() {
            assert!(tree.dominates(&CfgNode::Entry, node));
            assert!(tree.dominates(node, node));
        }
    }

    #[test]
    fn dominance_is_transitive() {
        let cfg = Cfg::from_method(&looping()).unwrap();
        let tree = DominatorTree::new(&cfg).unwrap();
        let nodes = cfg.nodes();
        for a in &nodes {
            for b in &nodes {
                for c in &nodes {
                    if tree.dominates(a, b) && tree.dominates(b, c) {
                        assert!(tree.dominates(a, c));
                    }
                }
            }
        }
    }

    #[test]
    fn immediate_dominators() {
        let cfg = Cfg::from_method(&looping()).unwrap();
        let tree = DominatorTree::new(&cfg).unwrap();

        let header = node_at(&cfg, 1, 0);
        let inner = node_at(&cfg, 2, 0);
        let then = node_at(&cfg, 3, 0);
        let latch = node_at(&cfg, 4, 0);
        let exit = node_at(&cfg, 5, 0);

        assert_eq!(tree.parent(&inner), Some(&header));
        assert_eq!(tree.parent(&then), Some(&inner));
        assert_eq!(tree.parent(&latch), Some(&inner));
        assert_eq!(tree.parent(&exit), Some(&header));
        assert!(!tree.dominates(&then, &latch));
    }

    #[test]
    fn lowest_common_ancestor_dominates_both() {
        let cfg = Cfg::from_method(&looping()).unwrap();
        let tree = DominatorTree::new(&cfg).unwrap();
        let nodes = cfg.nodes();
        for m in &nodes {
            for n in &nodes {
                let lca = tree.lowest_common_ancestor(m, n);
                assert!(tree.dominates(lca, m));
                assert!(tree.dominates(lca, n));
                for child in &nodes {
                    if tree.parent(child) == Some(lca) {
                        assert!(!(tree.dominates(child, m) && tree.dominates(child, n)));
                    }
                }
            }
        }
    }

    #[test]
    fn post_dominance_on_reversed_graph() {
        let cfg = Cfg::from_method(&looping()).unwrap();
        let tree = DominatorTree::new(&cfg.reverse()).unwrap();
        assert_eq!(tree.root(), &CfgNode::Exit);
        let inner = node_at(&cfg, 2, 0);
        let latch = node_at(&cfg, 4, 0);
        let then = node_at(&cfg, 3, 0);
        assert!(tree.dominates(&latch, &inner));
        assert!(!tree.dominates(&then, &inner));
    }
}
