//! Dependency graph: a mutable builder and a frozen, thread-safe view.
//!
//! [`MutableGraph`] is owned by the planner while it populates nodes and
//! edges; cycles are permitted transiently. [`ImmutableGraph::freeze`]
//! snapshots it once per build invocation, rejecting cyclic graphs, and
//! derives both edge directions up front so that every later query
//! (neighbor lookup, topological order, dependents-of for invalidation)
//! is a cheap read over the frozen snapshot.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};

use crate::error::CoreError;

/// A directed graph under construction.
///
/// Backed by a petgraph `StableDiGraph` plus a node-to-index map so that
/// edges can be inserted by node identity. Duplicate edges collapse.
#[derive(Debug)]
pub struct MutableGraph<T>
where
    T: Clone + Eq + Hash + Ord,
{
    graph: StableDiGraph<T, ()>,
    indices: HashMap<T, NodeIndex>,
}

impl<T> Default for MutableGraph<T>
where
    T: Clone + Eq + Hash + Ord,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MutableGraph<T>
where
    T: Clone + Eq + Hash + Ord,
{
    pub fn new() -> Self {
        MutableGraph {
            graph: StableDiGraph::new(),
            indices: HashMap::new(),
        }
    }

    /// Adds a node if not already present.
    pub fn add_node(&mut self, node: T) {
        self.index_of(node);
    }

    /// Adds a directed edge, inserting either endpoint as needed.
    pub fn add_edge(&mut self, source: T, sink: T) {
        let source_idx = self.index_of(source);
        let sink_idx = self.index_of(sink);
        self.graph.update_edge(source_idx, sink_idx, ());
    }

    /// True while no directed cycle exists. Must hold before freezing.
    pub fn is_acyclic(&self) -> bool {
        !petgraph::algo::is_cyclic_directed(&self.graph)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn index_of(&mut self, node: T) -> NodeIndex {
        if let Some(&idx) = self.indices.get(&node) {
            return idx;
        }
        let idx = self.graph.add_node(node.clone());
        self.indices.insert(node, idx);
        idx
    }
}

/// A frozen, acyclic snapshot of a [`MutableGraph`].
///
/// Holds the node set, the outgoing-edge multimap, and its exact
/// transpose, all in BTree containers for deterministic iteration.
/// Never mutated after construction; all queries are pure reads and the
/// structure is safe to share across threads.
#[derive(Debug, Clone)]
pub struct ImmutableGraph<T>
where
    T: Clone + Eq + Hash + Ord,
{
    nodes: BTreeSet<T>,
    outgoing: BTreeMap<T, BTreeSet<T>>,
    incoming: BTreeMap<T, BTreeSet<T>>,
}

impl<T> ImmutableGraph<T>
where
    T: Clone + Eq + Hash + Ord,
{
    /// Takes an independent, one-time copy of the graph.
    ///
    /// Fails with [`CoreError::NotAcyclic`] if any cycle exists.
    pub fn freeze(graph: &MutableGraph<T>) -> Result<Self, CoreError> {
        if !graph.is_acyclic() {
            return Err(CoreError::NotAcyclic);
        }

        let nodes: BTreeSet<T> = graph.graph.node_weights().cloned().collect();
        let mut outgoing: BTreeMap<T, BTreeSet<T>> = BTreeMap::new();
        let mut incoming: BTreeMap<T, BTreeSet<T>> = BTreeMap::new();
        for edge in graph.graph.edge_indices() {
            let (source_idx, sink_idx) = graph
                .graph
                .edge_endpoints(edge)
                .expect("edge index from iteration is valid");
            let source = graph.graph[source_idx].clone();
            let sink = graph.graph[sink_idx].clone();
            outgoing
                .entry(source.clone())
                .or_default()
                .insert(sink.clone());
            incoming.entry(sink).or_default().insert(source);
        }

        Ok(ImmutableGraph {
            nodes,
            outgoing,
            incoming,
        })
    }

    /// Neighbors reachable along outgoing edges. Empty for unknown nodes.
    pub fn outgoing(&self, node: &T) -> impl Iterator<Item = &T> {
        self.outgoing.get(node).into_iter().flatten()
    }

    /// Neighbors with an edge pointing at `node`. Empty for unknown nodes.
    pub fn incoming(&self, node: &T) -> impl Iterator<Item = &T> {
        self.incoming.get(node).into_iter().flatten()
    }

    /// Nodes with no incoming edges: the node set minus the
    /// incoming-multimap key set.
    pub fn sources(&self) -> BTreeSet<&T> {
        self.nodes
            .iter()
            .filter(|node| !self.incoming.contains_key(node))
            .collect()
    }

    /// Nodes with no outgoing edges: the node set minus the
    /// outgoing-multimap key set.
    pub fn sinks(&self) -> BTreeSet<&T> {
        self.nodes
            .iter()
            .filter(|node| !self.outgoing.contains_key(node))
            .collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// A topological order of the frozen graph: every edge source appears
    /// before its sink. Ties are broken by node order, so the result is
    /// identical across runs and machines.
    ///
    /// Implemented as Kahn's algorithm with an ordered ready set rather
    /// than recursion, bounding stack depth on deep graphs.
    pub fn topo_order(&self) -> Vec<T> {
        let mut remaining: BTreeMap<&T, usize> = self
            .nodes
            .iter()
            .map(|node| (node, self.incoming(node).count()))
            .collect();
        let mut ready: BTreeSet<&T> = remaining
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&node, _)| node)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(&node) = ready.iter().next() {
            ready.remove(node);
            order.push(node.clone());
            for sink in self.outgoing(node) {
                let count = remaining
                    .get_mut(sink)
                    .expect("edge sink is a known node");
                *count -= 1;
                if *count == 0 {
                    ready.insert(sink);
                }
            }
        }

        // Acyclicity was established at freeze time.
        debug_assert_eq!(order.len(), self.nodes.len());
        order
    }
}
