//! Implements a directed graph.
//!
//! Vertices and edges are addressed by index. Graphs built by the analyses
//! keep their payloads in the vertices, and keep every relation between
//! vertices as indices, so nothing needs a back-pointer.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::Error;

pub trait Vertex: Clone {
    // The index of this vertex.
    fn index(&self) -> usize;
    // A string to display in dot graphviz format.
    fn dot_label(&self) -> String;
    // Fill color in dot graphviz format.
    fn dot_fill_color(&self) -> String {
        "#ffddcc".to_string()
    }
    // Font color in dot graphviz format.
    fn dot_font_color(&self) -> String {
        "#000000".to_string()
    }
}

pub trait Edge: Clone {
    /// The index of the head vertex.
    fn head(&self) -> usize;
    /// The index of the tail vertex.
    fn tail(&self) -> usize;
    /// A string to display in dot graphviz format.
    fn dot_label(&self) -> String;
    // Style in dot graphviz format.
    fn dot_style(&self) -> String {
        "solid".to_string()
    }
    // Color in dot graphviz format.
    fn dot_color(&self) -> String {
        "#000000".to_string()
    }
}

/// A directed graph.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Graph<V: Vertex, E: Edge> {
    vertices: BTreeMap<usize, V>,
    edges: BTreeMap<(usize, usize), E>,
    successors: BTreeMap<usize, BTreeSet<usize>>,
    predecessors: BTreeMap<usize, BTreeSet<usize>>,
}

impl<V, E> Graph<V, E>
where
    V: Vertex,
    E: Edge,
{
    pub fn new() -> Graph<V, E> {
        Graph {
            vertices: BTreeMap::new(),
            edges: BTreeMap::new(),
            successors: BTreeMap::new(),
            predecessors: BTreeMap::new(),
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Returns true if the vertex with the given index exists in this graph
    pub fn has_vertex(&self, index: usize) -> bool {
        self.vertices.contains_key(&index)
    }

    /// Returns true if the edge with the given head and tail index exists in this graph
    pub fn has_edge(&self, head: usize, tail: usize) -> bool {
        self.edges.contains_key(&(head, tail))
    }

    /// Inserts a vertex into the graph.
    /// # Errors
    /// Error if the vertex already exists by index.
    pub fn insert_vertex(&mut self, v: V) -> Result<(), Error> {
        if self.vertices.contains_key(&v.index()) {
            return Err(Error::DuplicateVertex(v.index()));
        }
        self.successors.insert(v.index(), BTreeSet::new());
        self.predecessors.insert(v.index(), BTreeSet::new());
        self.vertices.insert(v.index(), v);
        Ok(())
    }

    /// Inserts an edge into the graph.
    /// # Errors
    /// Error if the edge already exists by indices, or if either endpoint is
    /// missing.
    pub fn insert_edge(&mut self, edge: E) -> Result<(), Error> {
        let (head, tail) = (edge.head(), edge.tail());
        if self.edges.contains_key(&(head, tail)) {
            return Err(Error::DuplicateEdge(head, tail));
        }
        if !self.vertices.contains_key(&head) {
            return Err(Error::GraphVertexNotFound(head));
        }
        if !self.vertices.contains_key(&tail) {
            return Err(Error::GraphVertexNotFound(tail));
        }

        self.edges.insert((head, tail), edge);
        self.successors
            .get_mut(&head)
            .ok_or(Error::GraphVertexNotFound(head))?
            .insert(tail);
        self.predecessors
            .get_mut(&tail)
            .ok_or(Error::GraphVertexNotFound(tail))?
            .insert(head);

        Ok(())
    }

    /// Returns all immediate successors of a vertex from the graph.
    pub fn successors(&self, index: usize) -> Result<Vec<&V>, Error> {
        self.successor_indices(index)?
            .into_iter()
            .map(|successor| self.vertex(successor))
            .collect()
    }

    /// Returns all immediate predecessors of a vertex from the graph.
    pub fn predecessors(&self, index: usize) -> Result<Vec<&V>, Error> {
        self.predecessor_indices(index)?
            .into_iter()
            .map(|predecessor| self.vertex(predecessor))
            .collect()
    }

    /// Returns the indices of all immediate successors of a vertex from the graph.
    pub fn successor_indices(&self, index: usize) -> Result<Vec<usize>, Error> {
        self.successors
            .get(&index)
            .map(|successors| successors.iter().cloned().collect())
            .ok_or(Error::GraphVertexNotFound(index))
    }

    /// Returns the indices of all immediate predecessors of a vertex from the graph.
    pub fn predecessor_indices(&self, index: usize) -> Result<Vec<usize>, Error> {
        self.predecessors
            .get(&index)
            .map(|predecessors| predecessors.iter().cloned().collect())
            .ok_or(Error::GraphVertexNotFound(index))
    }

    /// Returns all vertices which don't have any predecessors in the graph.
    pub fn vertices_without_predecessors(&self) -> Vec<&V> {
        self.vertices
            .values()
            .filter(|v| {
                self.predecessors
                    .get(&v.index())
                    .map(|predecessors| predecessors.is_empty())
                    .unwrap_or(true)
            })
            .collect()
    }

    /// Returns all vertices which don't have any successors in the graph.
    pub fn vertices_without_successors(&self) -> Vec<&V> {
        self.vertices
            .values()
            .filter(|v| {
                self.successors
                    .get(&v.index())
                    .map(|successors| successors.is_empty())
                    .unwrap_or(true)
            })
            .collect()
    }

    /// Computes the set of vertices reachable from the given index.
    pub fn reachable_vertices(&self, index: usize) -> Result<FxHashSet<usize>, Error> {
        if !self.has_vertex(index) {
            return Err(Error::GraphVertexNotFound(index));
        }

        let mut reachable_vertices: FxHashSet<usize> = FxHashSet::default();
        let mut queue: Vec<usize> = vec![index];

        reachable_vertices.insert(index);

        while let Some(vertex) = queue.pop() {
            for &successor in &self.successors[&vertex] {
                if reachable_vertices.insert(successor) {
                    queue.push(successor)
                }
            }
        }

        Ok(reachable_vertices)
    }

    /// Compute the pre order of all vertices reachable from `root`.
    pub fn compute_pre_order(&self, root: usize) -> Result<Vec<usize>, Error> {
        if !self.has_vertex(root) {
            return Err(Error::GraphVertexNotFound(root));
        }

        let mut visited: FxHashSet<usize> = FxHashSet::default();
        let mut stack: Vec<usize> = vec![root];
        let mut order: Vec<usize> = Vec::new();

        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }

            order.push(node);

            // Reversed, so the smallest successor is visited first.
            for &successor in self.successors[&node].iter().rev() {
                stack.push(successor);
            }
        }

        Ok(order)
    }

    /// A new graph with the same vertices and every edge flipped. `flip`
    /// builds the reversed edge from the original.
    pub fn reversed<F>(&self, flip: F) -> Graph<V, E>
    where
        F: Fn(&E) -> E,
    {
        let edges: BTreeMap<(usize, usize), E> = self
            .edges
            .values()
            .map(|edge| {
                let reversed = flip(edge);
                ((reversed.head(), reversed.tail()), reversed)
            })
            .collect();
        Graph {
            vertices: self.vertices.clone(),
            edges,
            successors: self.predecessors.clone(),
            predecessors: self.successors.clone(),
        }
    }

    /// Returns all vertices in the graph, ordered by index.
    pub fn vertices(&self) -> Vec<&V> {
        self.vertices.values().collect()
    }

    /// Fetches a vertex from the graph by index.
    pub fn vertex(&self, index: usize) -> Result<&V, Error> {
        self.vertices
            .get(&index)
            .ok_or(Error::GraphVertexNotFound(index))
    }

    /// Fetches an edge from the graph by head and tail
    pub fn edge(&self, head: usize, tail: usize) -> Result<&E, Error> {
        self.edges
            .get(&(head, tail))
            .ok_or(Error::GraphEdgeNotFound(head, tail))
    }

    /// Fetches a mutable edge from the graph by head and tail
    pub fn edge_mut(&mut self, head: usize, tail: usize) -> Result<&mut E, Error> {
        self.edges
            .get_mut(&(head, tail))
            .ok_or(Error::GraphEdgeNotFound(head, tail))
    }

    /// Get a reference to every `Edge` in the `Graph`.
    pub fn edges(&self) -> Vec<&E> {
        self.edges.values().collect()
    }

    /// Return all edges out for a vertex
    pub fn edges_out(&self, index: usize) -> Result<Vec<&E>, Error> {
        self.successors
            .get(&index)
            .map(|succs| succs.iter().map(|succ| &self.edges[&(index, *succ)]).collect())
            .ok_or(Error::GraphVertexNotFound(index))
    }

    /// Return all edges in for a vertex
    pub fn edges_in(&self, index: usize) -> Result<Vec<&E>, Error> {
        self.predecessors
            .get(&index)
            .map(|preds| preds.iter().map(|pred| &self.edges[&(*pred, index)]).collect())
            .ok_or(Error::GraphVertexNotFound(index))
    }

    /// Returns a string in the graphviz format
    pub fn dot_graph(&self) -> String {
        let vertices = self
            .vertices
            .values()
            .map(|v| {
                let label = v.dot_label().replace('"', "\\\"").replace('\n', "\\l");
                format!(
                    "{} [shape=\"box\", label=\"{}\", style=\"filled\", fillcolor=\"{}\", fontcolor=\"{}\"];",
                    v.index(),
                    label,
                    v.dot_fill_color(),
                    v.dot_font_color(),
                )
            })
            .collect::<Vec<String>>();

        let edges = self
            .edges
            .values()
            .map(|e| {
                let label = e.dot_label().replace('"', "\\\"").replace('\n', "\\l");
                format!(
                    "{} -> {} [label=\"{}\", style=\"{}\", color=\"{}\"];",
                    e.head(),
                    e.tail(),
                    label,
                    e.dot_style(),
                    e.dot_color()
                )
            })
            .collect::<Vec<String>>();

        let options = vec![
            "graph [fontname = \"Courier New\", splines=\"polyline\"]",
            "node [fontname = \"Courier New\"]",
            "edge [fontname = \"Courier New\"]",
        ];

        format!(
            "digraph G {{\n{}\n\n{}\n{}\n}}",
            options.join("\n"),
            vertices.join("\n"),
            edges.join("\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Vertex for usize {
        fn index(&self) -> usize {
            *self
        }

        fn dot_label(&self) -> String {
            self.to_string()
        }
    }

    impl Edge for (usize, usize) {
        fn head(&self) -> usize {
            self.0
        }

        fn tail(&self) -> usize {
            self.1
        }

        fn dot_label(&self) -> String {
            format!("{} -> {}", self.0, self.1)
        }
    }

    /**
     *           +--> 3 +-+
     *          /          \
     *         | +--> 4 +--+
     *         |/          |
     *         +           v
     * 1 +---> 2 <-------+ 5
     *         +
     *         |
     *         v
     *         6
     */
    fn create_test_graph() -> Graph<usize, (usize, usize)> {
        let mut graph = Graph::new();

        for vertex in 1..=6 {
            graph.insert_vertex(vertex).unwrap();
        }

        graph.insert_edge((1, 2)).unwrap();
        graph.insert_edge((2, 3)).unwrap();
        graph.insert_edge((2, 4)).unwrap();
        graph.insert_edge((2, 6)).unwrap();
        graph.insert_edge((3, 5)).unwrap();
        graph.insert_edge((4, 5)).unwrap();
        graph.insert_edge((5, 2)).unwrap();

        graph
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut graph = create_test_graph();
        assert!(matches!(
            graph.insert_vertex(3),
            Err(Error::DuplicateVertex(3))
        ));
        assert!(matches!(
            graph.insert_edge((2, 3)),
            Err(Error::DuplicateEdge(2, 3))
        ));
        assert!(matches!(
            graph.insert_edge((2, 9)),
            Err(Error::GraphVertexNotFound(9))
        ));
    }

    #[test]
    fn pre_order_visits_every_reachable_vertex_once() {
        let graph = create_test_graph();
        let order = graph.compute_pre_order(1).unwrap();
        assert_eq!(order, vec![1, 2, 3, 5, 4, 6]);
        assert_eq!(graph.reachable_vertices(3).unwrap().len(), 5);
        assert!(!graph.reachable_vertices(3).unwrap().contains(&1));
    }

    #[test]
    fn head_has_no_predecessors() {
        let graph = create_test_graph();
        let heads = graph.vertices_without_predecessors();
        assert_eq!(heads.len(), 1);
        assert_eq!(*heads[0], 1);
        let tails = graph.vertices_without_successors();
        assert_eq!(tails, vec![&6]);
    }

    #[test]
    fn reversed_flips_every_edge() {
        let graph = create_test_graph();
        let reversed = graph.reversed(|edge| (edge.1, edge.0));
        assert_eq!(reversed.num_edges(), graph.num_edges());
        for edge in graph.edges() {
            assert!(reversed.has_edge(edge.1, edge.0));
        }
        assert_eq!(reversed.successor_indices(2).unwrap(), vec![1, 5]);
        assert_eq!(reversed.vertices_without_predecessors(), vec![&6]);
    }
}
