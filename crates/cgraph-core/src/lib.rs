//! cgraph core library: whole-program call graph construction for Java
//! sources.
//!
//! The pipeline indexes the class hierarchy and member catalog once, then
//! infers receiver types per compilation unit in parallel and resolves every
//! call site against the frozen indices. Built as an rlib for the `cgraph`
//! CLI and, with the `python` feature, as an extension module.

pub mod analysis;
pub mod config;
pub mod errors;
pub mod graph;
pub mod indexer;
pub mod library;
pub mod models;

#[cfg(feature = "python")]
mod python;

pub use config::AnalysisConfig;
pub use errors::{CallGraphError, CgResult};
pub use graph::CallGraph;
pub use indexer::filesystem::SourceModel;
pub use indexer::pipeline::{build_call_graph, AnalysisOptions, IndexStats};
pub use library::LibrarySpec;
pub use models::Signature;
