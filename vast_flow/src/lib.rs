//! A reverse-edge data-flow graph for propagating `overload`/`underload` signals upstream
//! toward the producers that should throttle (spec.md §4.7), grounded on
//! `flow_controller.h`/`.cc`.
//!
//! The original stores `multimap<actor, actor>` reverse edges (`sink -> source`) and walks them
//! on each signal. Without an actor mailbox to deliver into, [`FlowGraph::propagate`] instead
//! returns the set of node ids that should receive the signal, letting the caller's own
//! messaging layer do the delivery.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_docs, clippy::clone_on_ref_ptr)]

use observability_deps::tracing::warn;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// A reverse-edge data-flow graph over nodes identified by `Id`.
pub struct FlowGraph<Id: Eq + Hash + Clone> {
    state: Mutex<State<Id>>,
}

struct State<Id: Eq + Hash + Clone> {
    /// `sink -> sources feeding it`, the reverse of the data-flow direction.
    reverse: HashMap<Id, HashSet<Id>>,
    deflectors: HashSet<Id>,
}

impl<Id: Eq + Hash + Clone + std::fmt::Debug> Default for FlowGraph<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: Eq + Hash + Clone + std::fmt::Debug> FlowGraph<Id> {
    /// An empty graph.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                reverse: HashMap::new(),
                deflectors: HashSet::new(),
            }),
        }
    }

    /// Register a data-flow edge `source -> sink`. A duplicate registration is rejected as a
    /// warning, not an error (spec.md §4.7).
    pub fn add_edge(&self, source: Id, sink: Id) {
        let mut state = self.state.lock();
        let inserted = state.reverse.entry(sink.clone()).or_default().insert(source.clone());
        if !inserted {
            warn!(?source, ?sink, "duplicate flow edge registration");
        }
    }

    /// Register `node` as a deflector: a node interposed between a signal's origin and the
    /// eventual data source, which absorbs the signal instead of letting it propagate further
    /// (spec.md §4.7). Rejected if `node` has no upstream edge (it would be a source) or no
    /// downstream edge (it would be a sink) — a deflector must be a strictly interior node.
    pub fn register_deflector(&self, node: Id) -> Result<(), DeflectorError> {
        let mut state = self.state.lock();
        let has_upstream = state.reverse.get(&node).is_some_and(|s| !s.is_empty());
        let has_downstream = state.reverse.values().any(|sources| sources.contains(&node));
        if !has_upstream {
            return Err(DeflectorError::WouldBeSource);
        }
        if !has_downstream {
            return Err(DeflectorError::WouldBeSink);
        }
        state.deflectors.insert(node);
        Ok(())
    }

    /// Remove every edge touching `node` and its deflector registration, used when a node
    /// terminates (spec.md §4.7: "edges are removed automatically when either endpoint
    /// terminates").
    pub fn remove_node(&self, node: &Id) {
        let mut state = self.state.lock();
        state.reverse.remove(node);
        for sources in state.reverse.values_mut() {
            sources.remove(node);
        }
        state.deflectors.remove(node);
    }

    /// Remove a single `source -> sink` edge. If `sink` was a deflector and losing this edge
    /// leaves it without an upstream or downstream edge, its deflector registration is revoked
    /// rather than left dangling on a node that's no longer a strictly interior one.
    pub fn remove_edge(&self, source: &Id, sink: &Id) {
        let mut state = self.state.lock();
        if let Some(sources) = state.reverse.get_mut(sink) {
            sources.remove(source);
        }
        if state.deflectors.contains(sink) {
            let has_upstream = state.reverse.get(sink).is_some_and(|s| !s.is_empty());
            let has_downstream = state.reverse.values().any(|sources| sources.contains(sink));
            if !has_upstream || !has_downstream {
                state.deflectors.remove(sink);
                warn!(?sink, "revoking deflector: edge removal left it no longer a strictly interior node");
            }
        }
    }

    /// Walk reverse edges from `origin` toward its sources, stopping each branch at the first
    /// deflector and otherwise continuing until a node with no upstream edge is reached
    /// (spec.md §4.7). Returns every node that should receive the signal.
    pub fn propagate(&self, origin: &Id) -> Vec<Id> {
        let state = self.state.lock();
        let mut visited = HashSet::new();
        let mut results = Vec::new();
        walk(&state, origin, true, &mut visited, &mut results);
        results
    }
}

fn walk<Id: Eq + Hash + Clone>(
    state: &State<Id>,
    node: &Id,
    is_origin: bool,
    visited: &mut HashSet<Id>,
    results: &mut Vec<Id>,
) {
    if !visited.insert(node.clone()) {
        return;
    }
    if !is_origin && state.deflectors.contains(node) {
        results.push(node.clone());
        return;
    }
    match state.reverse.get(node) {
        Some(sources) if !sources.is_empty() => {
            for source in sources {
                walk(state, source, false, visited, results);
            }
        }
        _ => results.push(node.clone()),
    }
}

/// Why a node could not be registered as a deflector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeflectorError {
    /// The node has no upstream edge, so it is itself a data source.
    WouldBeSource,
    /// The node has no downstream edge, so it is itself a data sink.
    WouldBeSink,
}

impl std::fmt::Display for DeflectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeflectorError::WouldBeSource => write!(f, "node has no upstream edge, cannot be a deflector"),
            DeflectorError::WouldBeSink => write!(f, "node has no downstream edge, cannot be a deflector"),
        }
    }
}

impl std::error::Error for DeflectorError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propagates_to_terminal_source_through_chain() {
        let graph: FlowGraph<&str> = FlowGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        graph.add_edge("c", "d");
        assert_eq!(graph.propagate(&"d"), vec!["a"]);
    }

    #[test]
    fn stops_at_deflector() {
        let graph: FlowGraph<&str> = FlowGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        graph.add_edge("c", "d");
        graph.register_deflector("b").unwrap();
        assert_eq!(graph.propagate(&"d"), vec!["b"]);
    }

    #[test]
    fn deflector_must_be_interior_node() {
        let graph: FlowGraph<&str> = FlowGraph::new();
        graph.add_edge("a", "b");
        assert_eq!(graph.register_deflector("a"), Err(DeflectorError::WouldBeSource));
        assert_eq!(graph.register_deflector("b"), Err(DeflectorError::WouldBeSink));
    }

    #[test]
    fn removing_a_node_drops_its_edges() {
        let graph: FlowGraph<&str> = FlowGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        graph.remove_node(&"b");
        assert_eq!(graph.propagate(&"c"), vec!["c"]);
    }

    #[test]
    fn removing_an_edge_revokes_a_deflector_left_without_a_downstream() {
        let graph: FlowGraph<&str> = FlowGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        graph.register_deflector("b").unwrap();
        graph.remove_edge(&"b", &"c");
        // b no longer has a downstream edge, so it should no longer deflect.
        assert_eq!(graph.propagate(&"b"), vec!["a"]);
    }

    #[test]
    fn removing_an_unrelated_edge_leaves_a_deflector_intact() {
        let graph: FlowGraph<&str> = FlowGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        graph.add_edge("a2", "b");
        graph.register_deflector("b").unwrap();
        graph.remove_edge(&"a2", &"b");
        assert_eq!(graph.propagate(&"c"), vec!["b"]);
    }

    #[test]
    fn fans_out_to_multiple_sources() {
        let graph: FlowGraph<&str> = FlowGraph::new();
        graph.add_edge("a1", "b");
        graph.add_edge("a2", "b");
        let mut hits = graph.propagate(&"b");
        hits.sort();
        assert_eq!(hits, vec!["a1", "a2"]);
    }
}
