//! Caller/callee indices over a set of [`CallGraphEdge`]s.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{CallGraphEdge, Signature};

/// Global edge set stored both ways.
///
/// Insertion is a set union, so merging partial graphs in any order and any
/// number of times yields the same result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallGraph {
    callees: BTreeMap<Signature, BTreeSet<Signature>>,
    callers: BTreeMap<Signature, BTreeSet<Signature>>,
    edge_count: usize,
}

static NO_EDGES: BTreeSet<Signature> = BTreeSet::new();

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the edge was not present before.
    pub fn add_edge(&mut self, caller: Signature, callee: Signature) -> bool {
        let inserted = self
            .callees
            .entry(caller.clone())
            .or_default()
            .insert(callee.clone());
        if inserted {
            self.callers.entry(callee).or_default().insert(caller);
            self.edge_count += 1;
        }
        inserted
    }

    pub fn extend<I>(&mut self, edges: I)
    where
        I: IntoIterator<Item = CallGraphEdge>,
    {
        for edge in edges {
            self.add_edge(edge.caller, edge.callee);
        }
    }

    pub fn merge(&mut self, other: &CallGraph) {
        for (caller, callees) in &other.callees {
            for callee in callees {
                self.add_edge(caller.clone(), callee.clone());
            }
        }
    }

    pub fn callees_of(&self, caller: &Signature) -> &BTreeSet<Signature> {
        self.callees.get(caller).unwrap_or(&NO_EDGES)
    }

    pub fn callers_of(&self, callee: &Signature) -> &BTreeSet<Signature> {
        self.callers.get(callee).unwrap_or(&NO_EDGES)
    }

    pub fn contains_edge(&self, caller: &Signature, callee: &Signature) -> bool {
        self.callees
            .get(caller)
            .is_some_and(|callees| callees.contains(callee))
    }

    /// Edges in (caller, callee) order.
    pub fn edges(&self) -> impl Iterator<Item = (&Signature, &Signature)> {
        self.callees
            .iter()
            .flat_map(|(caller, callees)| callees.iter().map(move |callee| (caller, callee)))
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn is_empty(&self) -> bool {
        self.edge_count == 0
    }

    /// Every signature that appears on either end of an edge.
    pub fn nodes(&self) -> BTreeSet<&Signature> {
        self.callees.keys().chain(self.callers.keys()).collect()
    }

    pub fn caller_count(&self) -> usize {
        self.callees.len()
    }

    /// Adjacency view used by the persisted artifact.
    pub fn adjacency(&self) -> &BTreeMap<Signature, BTreeSet<Signature>> {
        &self.callees
    }
}

impl FromIterator<CallGraphEdge> for CallGraph {
    fn from_iter<I: IntoIterator<Item = CallGraphEdge>>(iter: I) -> Self {
        let mut graph = CallGraph::new();
        graph.extend(iter);
        graph
    }
}
