//! JSON artifact for a finished run.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::CgResult;
use crate::graph::CallGraph;
use crate::indexer::pipeline::IndexStats;
use crate::models::Signature;

pub const SCHEMA_VERSION: u32 = 1;

/// Same-second runs get `-1`, `-2`, ... suffixes up to this many.
const MAX_ARTIFACT_SUFFIX: u32 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub schema_version: u32,
    pub generated_at: u64,
    pub source_root: String,
    pub stats: IndexStats,
    pub graph: BTreeMap<Signature, BTreeSet<Signature>>,
}

impl GraphDocument {
    pub fn new(graph: &CallGraph, source_root: &Path, stats: IndexStats, generated_at: u64) -> Self {
        GraphDocument {
            schema_version: SCHEMA_VERSION,
            generated_at,
            source_root: source_root.to_string_lossy().replace('\\', "/"),
            stats,
            graph: graph.adjacency().clone(),
        }
    }

    pub fn to_graph(&self) -> CallGraph {
        let mut graph = CallGraph::new();
        for (caller, callees) in &self.graph {
            for callee in callees {
                graph.add_edge(caller.clone(), callee.clone());
            }
        }
        graph
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Creates a fresh artifact file; existing artifacts are never overwritten.
fn create_artifact(output_dir: &Path, generated_at: u64) -> CgResult<(PathBuf, File)> {
    for suffix in 0..=MAX_ARTIFACT_SUFFIX {
        let name = match suffix {
            0 => format!("callgraph-{generated_at}.json"),
            n => format!("callgraph-{generated_at}-{n}.json"),
        };
        let path = output_dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("too many artifacts for timestamp {generated_at} in {}", output_dir.display()),
    )
    .into())
}

/// Writes `<output_dir>/callgraph-<unix-seconds>.json` and returns its path.
pub fn write_graph(
    output_dir: &Path,
    source_root: &Path,
    graph: &CallGraph,
    stats: IndexStats,
) -> CgResult<PathBuf> {
    write_graph_at(output_dir, source_root, graph, stats, unix_now())
}

/// [`write_graph`] with an explicit timestamp.
pub fn write_graph_at(
    output_dir: &Path,
    source_root: &Path,
    graph: &CallGraph,
    stats: IndexStats,
    generated_at: u64,
) -> CgResult<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let document = GraphDocument::new(graph, source_root, stats, generated_at);
    let (path, file) = create_artifact(output_dir, generated_at)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &document)?;
    writer.flush()?;
    info!(path = %path.display(), edges = graph.edge_count(), "call graph written");
    Ok(path)
}

pub fn read_graph(path: &Path) -> CgResult<GraphDocument> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(text: &str) -> Signature {
        Signature::decode(text).unwrap()
    }

    #[test]
    fn test_write_then_read_restores_graph() {
        let dir = tempfile::tempdir().unwrap();
        let mut graph = CallGraph::new();
        graph.add_edge(Signature::framework_root(), sig("a.A:run()V"));
        graph.add_edge(sig("a.A:run()V"), sig("a.B:go(I[Qjava.lang.String;)V"));

        let stats = IndexStats {
            edges: graph.edge_count(),
            ..IndexStats::default()
        };
        let path = write_graph(dir.path(), Path::new("/src"), &graph, stats).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("callgraph-") && name.ends_with(".json"));

        let document = read_graph(&path).unwrap();
        assert_eq!(document.schema_version, SCHEMA_VERSION);
        assert_eq!(document.source_root, "/src");
        assert_eq!(document.stats.edges, 2);
        assert_eq!(document.to_graph(), graph);
    }

    #[test]
    fn test_same_second_runs_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = CallGraph::new();
        first.add_edge(sig("a.A:f()V"), sig("a.B:g()V"));
        let mut second = CallGraph::new();
        second.add_edge(sig("a.A:f()V"), sig("a.C:h()V"));

        let one = write_graph_at(dir.path(), Path::new("src"), &first, IndexStats::default(), 42).unwrap();
        let two = write_graph_at(dir.path(), Path::new("src"), &second, IndexStats::default(), 42).unwrap();
        assert_ne!(one, two);
        assert!(one.ends_with("callgraph-42.json"));
        assert!(two.ends_with("callgraph-42-1.json"));
        assert_eq!(read_graph(&one).unwrap().to_graph(), first);
        assert_eq!(read_graph(&two).unwrap().to_graph(), second);
    }

    #[test]
    fn test_document_layout_uses_encoded_signatures() {
        let mut graph = CallGraph::new();
        graph.add_edge(sig("a.A:f()V"), sig("a.B:g()V"));
        graph.add_edge(sig("a.A:f()V"), sig("a.B:g()V"));
        let document = GraphDocument::new(&graph, Path::new("src"), IndexStats::default(), 7);
        let value = serde_json::to_value(&document).unwrap();
        assert_eq!(value["generated_at"], 7);
        assert_eq!(value["graph"]["a.A:f()V"], serde_json::json!(["a.B:g()V"]));
    }

    #[test]
    fn test_read_rejects_bad_signature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r#"{"schema_version":1,"generated_at":0,"source_root":"","stats":{},"graph":{"nonsense":[]}}"#,
        )
        .unwrap();
        assert!(read_graph(&path).is_err());
    }
}
