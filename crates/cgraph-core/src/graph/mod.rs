//! The merged call graph, its traversal queries, and the JSON artifact.

pub mod callgraph;
pub mod persist;
pub mod query;

pub use callgraph::CallGraph;
