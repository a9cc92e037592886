//! Bounded traversal over a [`CallGraph`].

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::str::FromStr;

use crate::errors::CallGraphError;
use crate::graph::CallGraph;
use crate::models::Signature;

pub const MAX_WALK_DEPTH: usize = 16;
pub const MAX_GRAPH_VISITED: usize = 20_000;
pub const MAX_GRAPH_EDGES: usize = 50_000;

pub fn clamp_depth(value: usize) -> usize {
    value.clamp(1, MAX_WALK_DEPTH)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Callers,
    Callees,
}

impl FromStr for Direction {
    type Err = CallGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "callers" => Ok(Direction::Callers),
            "callees" => Ok(Direction::Callees),
            other => Err(CallGraphError::Config(format!(
                "Invalid walk direction: {other}"
            ))),
        }
    }
}

/// A single traversal step produced by [`walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub from: Signature,
    pub to: Signature,
    pub depth: usize,
}

/// Breadth-first walk from `start`, stopping at `max_depth` hops or when the
/// visited/edge guards trip. Each node is reported once, at its shallowest
/// depth.
pub fn walk(graph: &CallGraph, start: &Signature, direction: Direction, max_depth: usize) -> Vec<WalkEntry> {
    let max_depth = clamp_depth(max_depth);
    let mut results = Vec::new();
    let mut visited: HashSet<&Signature> = HashSet::new();
    visited.insert(start);

    let mut queue: VecDeque<(&Signature, usize)> = VecDeque::new();
    queue.push_back((start, 0));

    while let Some((current, depth)) = queue.pop_front() {
        if results.len() >= MAX_GRAPH_EDGES || visited.len() >= MAX_GRAPH_VISITED {
            break;
        }
        if depth >= max_depth {
            continue;
        }
        let next = match direction {
            Direction::Callees => graph.callees_of(current),
            Direction::Callers => graph.callers_of(current),
        };
        for neighbor in next {
            if results.len() >= MAX_GRAPH_EDGES || visited.len() >= MAX_GRAPH_VISITED {
                break;
            }
            if !visited.insert(neighbor) {
                continue;
            }
            results.push(WalkEntry {
                from: current.clone(),
                to: neighbor.clone(),
                depth: depth + 1,
            });
            queue.push_back((neighbor, depth + 1));
        }
    }
    results
}

/// Every signature reachable from the framework root marker.
pub fn reachable_from_root(graph: &CallGraph) -> BTreeSet<Signature> {
    let root = Signature::framework_root();
    let mut seen: BTreeSet<Signature> = BTreeSet::new();
    let mut queue: VecDeque<&Signature> = VecDeque::new();
    queue.push_back(&root);
    while let Some(current) = queue.pop_front() {
        for callee in graph.callees_of(current) {
            if seen.insert(callee.clone()) {
                queue.push_back(callee);
            }
        }
    }
    seen
}

/// Candidates that no path from the root reaches, in sorted order.
pub fn unreachable<'a, I>(graph: &CallGraph, candidates: I) -> Vec<Signature>
where
    I: IntoIterator<Item = &'a Signature>,
{
    let reached = reachable_from_root(graph);
    candidates
        .into_iter()
        .filter(|sig| !sig.is_framework_root() && !reached.contains(*sig))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(text: &str) -> Signature {
        Signature::decode(text).unwrap()
    }

    fn chain() -> CallGraph {
        let mut graph = CallGraph::new();
        graph.add_edge(Signature::framework_root(), sig("a.A:main()V"));
        graph.add_edge(sig("a.A:main()V"), sig("a.A:b()V"));
        graph.add_edge(sig("a.A:b()V"), sig("a.A:c()V"));
        graph.add_edge(sig("a.A:c()V"), sig("a.A:b()V"));
        graph.add_edge(sig("a.A:dead()V"), sig("a.A:c()V"));
        graph
    }

    #[test]
    fn test_walk_respects_depth_and_cycles() {
        let graph = chain();
        let one = walk(&graph, &sig("a.A:main()V"), Direction::Callees, 1);
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].to, sig("a.A:b()V"));

        let all = walk(&graph, &sig("a.A:main()V"), Direction::Callees, 10);
        let reached: Vec<String> = all.iter().map(|e| e.to.encode()).collect();
        assert_eq!(reached, vec!["a.A:b()V", "a.A:c()V"]);
        assert_eq!(all[1].depth, 2);
    }

    #[test]
    fn test_walk_callers() {
        let graph = chain();
        let callers = walk(&graph, &sig("a.A:c()V"), Direction::Callers, 1);
        let names: BTreeSet<String> = callers.iter().map(|e| e.to.encode()).collect();
        assert!(names.contains("a.A:b()V"));
        assert!(names.contains("a.A:dead()V"));
    }

    #[test]
    fn test_unreachable_methods() {
        let graph = chain();
        let nodes: Vec<Signature> = graph.nodes().into_iter().cloned().collect();
        let dead = unreachable(&graph, nodes.iter());
        assert_eq!(dead, vec![sig("a.A:dead()V")]);
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("callers".parse::<Direction>().unwrap(), Direction::Callers);
        assert!("sideways".parse::<Direction>().is_err());
        assert_eq!(clamp_depth(0), 1);
        assert_eq!(clamp_depth(500), MAX_WALK_DEPTH);
    }
}
