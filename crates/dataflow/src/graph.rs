//! Dependency graph representation, ordering and cycle analysis.
//!
//! [`DependencyGraph`] is an adjacency list keyed by component name. Node and
//! edge insertion order is preserved and is the tie-breaker for the
//! topological sort, so a given graph always yields the same order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::ComponentName;

/// Returned by [`DependencyGraph::topological_sort`] when no linear order
/// exists.
///
/// Each entry is one strongly-connected component that contains a cycle:
/// either two or more mutually reachable nodes, or one node with an edge to
/// itself. Members are listed in graph insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    /// The offending strongly-connected components.
    pub cycles: Vec<Vec<ComponentName>>,
}

/// A directed "must run before" graph over component names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DependencyGraph {
    /// Successor sets, indexed by source node.
    successors: IndexMap<ComponentName, IndexSet<ComponentName>>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Adding an existing node keeps its original position.
    pub fn add_node(&mut self, name: ComponentName) {
        self.successors.entry(name).or_default();
    }

    /// Add an edge `from → to`, inserting either endpoint that is missing.
    pub fn add_edge(&mut self, from: ComponentName, to: ComponentName) {
        self.add_node(to.clone());
        self.successors.entry(from).or_default().insert(to);
    }

    /// Add every node and edge of `other` to this graph.
    pub fn extend(&mut self, other: &DependencyGraph) {
        for (from, succs) in &other.successors {
            self.add_node(from.clone());
            for to in succs {
                self.add_edge(from.clone(), to.clone());
            }
        }
    }

    /// Remove a node together with every edge touching it.
    ///
    /// Returns `false` if the node was not present.
    pub fn remove_node(&mut self, name: &str) -> bool {
        if self.successors.shift_remove(name).is_none() {
            return false;
        }
        for succs in self.successors.values_mut() {
            succs.shift_remove(name);
        }
        true
    }

    /// Return the subgraph induced by `names`: nodes of this graph that appear
    /// in `names`, in this graph's order, and the edges between them.
    pub fn induced_subgraph(&self, names: &IndexSet<ComponentName>) -> DependencyGraph {
        let mut sub = DependencyGraph::new();
        for node in self.successors.keys().filter(|node| names.contains(*node)) {
            sub.add_node(node.clone());
        }
        for (from, succs) in &self.successors {
            if !names.contains(from) {
                continue;
            }
            for to in succs.iter().filter(|to| names.contains(*to)) {
                sub.add_edge(from.clone(), to.clone());
            }
        }
        sub
    }

    /// Whether the node is present.
    pub fn contains_node(&self, name: &str) -> bool {
        self.successors.contains_key(name)
    }

    /// Whether the edge `from → to` is present.
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.successors
            .get(from)
            .is_some_and(|succs| succs.contains(to))
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &ComponentName> {
        self.successors.keys()
    }

    /// All edges, grouped by source node in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (&ComponentName, &ComponentName)> {
        self.successors
            .iter()
            .flat_map(|(from, succs)| succs.iter().map(move |to| (from, to)))
    }

    /// Direct successors of a node.
    pub fn successors(&self, name: &str) -> impl Iterator<Item = &ComponentName> {
        self.successors.get(name).into_iter().flatten()
    }

    /// Direct predecessors of a node.
    pub fn predecessors<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ComponentName> {
        self.successors
            .iter()
            .filter(move |(_, succs)| succs.contains(name))
            .map(|(from, _)| from)
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.successors.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.successors.values().map(IndexSet::len).sum()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    /// Perform a topological sort using Kahn's algorithm.
    ///
    /// Among nodes whose predecessors have all been emitted, the one inserted
    /// earliest goes first. Every node is either emitted or, when a cycle
    /// blocks it, accounted for by the strongly-connected components in the
    /// returned [`CycleError`].
    pub fn topological_sort(&self) -> Result<Vec<ComponentName>, CycleError> {
        let count = self.node_count();
        let mut in_degree = vec![0usize; count];
        for succs in self.successors.values() {
            for to in succs {
                if let Some(idx) = self.successors.get_index_of(to) {
                    in_degree[idx] += 1;
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..count)
            .filter(|&idx| in_degree[idx] == 0)
            .map(Reverse)
            .collect();
        let mut emitted = vec![false; count];
        let mut sorted = Vec::with_capacity(count);

        while let Some(Reverse(idx)) = ready.pop() {
            emitted[idx] = true;
            sorted.push(idx);
            for succ in self.successor_indices(idx) {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.push(Reverse(succ));
                }
            }
        }

        if sorted.len() == count {
            return Ok(sorted.into_iter().map(|idx| self.name_at(idx)).collect());
        }

        // Whatever was not emitted sits on, or downstream of, a cycle.
        let residual: Vec<bool> = emitted.iter().map(|done| !done).collect();
        Err(CycleError {
            cycles: self.cyclic_components(residual),
        })
    }

    /// Return every strongly-connected component (Tarjan's algorithm), each
    /// listed in insertion order, components ordered by their first member.
    pub fn strongly_connected_components(&self) -> Vec<Vec<ComponentName>> {
        let included = vec![true; self.node_count()];
        Tarjan::run(self, included)
            .into_iter()
            .map(|scc| scc.into_iter().map(|idx| self.name_at(idx)).collect())
            .collect()
    }

    /// Strongly-connected components that contain a cycle.
    pub fn cycles(&self) -> Vec<Vec<ComponentName>> {
        self.cyclic_components(vec![true; self.node_count()])
    }

    fn cyclic_components(&self, included: Vec<bool>) -> Vec<Vec<ComponentName>> {
        Tarjan::run(self, included)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.has_self_loop(scc[0]))
            .map(|scc| scc.into_iter().map(|idx| self.name_at(idx)).collect())
            .collect()
    }

    fn has_self_loop(&self, idx: usize) -> bool {
        self.successor_indices(idx).any(|succ| succ == idx)
    }

    fn successor_indices(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.successors
            .get_index(idx)
            .into_iter()
            .flat_map(|(_, succs)| succs.iter())
            .filter_map(|to| self.successors.get_index_of(to))
    }

    fn name_at(&self, idx: usize) -> ComponentName {
        self.successors
            .get_index(idx)
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| unreachable!("node index {idx} out of bounds"))
    }
}

// ---------------------------------------------------------------------------
// Tarjan's strongly-connected components
// ---------------------------------------------------------------------------

struct Tarjan<'g> {
    graph: &'g DependencyGraph,
    included: Vec<bool>,
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next_index: usize,
    components: Vec<Vec<usize>>,
}

impl<'g> Tarjan<'g> {
    /// Runs over the nodes flagged in `included`, ignoring edges that leave
    /// that set.
    fn run(graph: &'g DependencyGraph, included: Vec<bool>) -> Vec<Vec<usize>> {
        let count = graph.node_count();
        let mut state = Tarjan {
            graph,
            included,
            index: vec![None; count],
            lowlink: vec![0; count],
            on_stack: vec![false; count],
            stack: Vec::new(),
            next_index: 0,
            components: Vec::new(),
        };
        for node in 0..count {
            if state.included[node] && state.index[node].is_none() {
                state.visit(node);
            }
        }
        let mut components = state.components;
        components.sort_unstable_by_key(|scc| scc[0]);
        components
    }

    /// Depth-first search from `root` on an explicit frame stack, so the
    /// depth of the graph never bounds the call stack.
    fn visit(&mut self, root: usize) {
        let graph = self.graph;
        let mut frames: Vec<(usize, Vec<usize>, usize)> = Vec::new();
        self.enter(root);
        frames.push((root, graph.successor_indices(root).collect(), 0));

        while let Some((node, succs, cursor)) = frames.last_mut() {
            let node = *node;
            if let Some(&succ) = succs.get(*cursor) {
                *cursor += 1;
                if !self.included[succ] {
                    continue;
                }
                match self.index[succ] {
                    None => {
                        self.enter(succ);
                        frames.push((succ, graph.successor_indices(succ).collect(), 0));
                    }
                    Some(succ_index) if self.on_stack[succ] => {
                        self.lowlink[node] = self.lowlink[node].min(succ_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            frames.pop();
            if let Some((parent, _, _)) = frames.last() {
                self.lowlink[*parent] = self.lowlink[*parent].min(self.lowlink[node]);
            }
            if self.index[node] == Some(self.lowlink[node]) {
                let mut component = Vec::new();
                while let Some(member) = self.stack.pop() {
                    self.on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                component.sort_unstable();
                self.components.push(component);
            }
        }
    }

    fn enter(&mut self, node: usize) {
        self.index[node] = Some(self.next_index);
        self.lowlink[node] = self.next_index;
        self.next_index += 1;
        self.stack.push(node);
        self.on_stack[node] = true;
    }
}
