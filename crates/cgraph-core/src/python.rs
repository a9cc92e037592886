//! Python extension module `_cgraph_core`.

use std::path::Path;

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::errors::CgResult;
use crate::indexer::filesystem::SourceModel;
use crate::indexer::pipeline::{self, AnalysisOutcome, AnalysisOptions};
use crate::library::LibrarySpec;
use crate::models::Signature;

fn analyze(source_root: &str, options: AnalysisOptions) -> CgResult<AnalysisOutcome> {
    let model = SourceModel::scan(Path::new(source_root), &[], &[])?;
    let library = LibrarySpec::builtin()?;
    pipeline::build_call_graph(&model, &library, &options)
}

/// Analyze `source_root` and return `{"graph": {caller: [callee]}, "stats": {...}}`.
#[pyfunction]
#[pyo3(signature = (source_root, workers=0, main_methods_as_roots=true))]
fn build_call_graph(
    py: Python<'_>,
    source_root: &str,
    workers: usize,
    main_methods_as_roots: bool,
) -> PyResult<PyObject> {
    let options = AnalysisOptions {
        workers,
        main_methods_as_roots,
        ..AnalysisOptions::default()
    };
    let outcome = py.allow_threads(|| analyze(source_root, options))?;

    let graph = PyDict::new(py);
    for (caller, callees) in outcome.graph.adjacency() {
        let encoded: Vec<String> = callees.iter().map(Signature::encode).collect();
        graph.set_item(caller.encode(), PyList::new(py, encoded)?)?;
    }
    let stats = PyDict::new(py);
    stats.set_item("files_seen", outcome.stats.files_seen)?;
    stats.set_item("units", outcome.stats.units)?;
    stats.set_item("units_failed", outcome.stats.units_failed)?;
    stats.set_item("types", outcome.stats.types)?;
    stats.set_item("bodies", outcome.stats.bodies)?;
    stats.set_item("roots", outcome.stats.roots)?;
    stats.set_item("edges", outcome.stats.edges)?;
    stats.set_item("elapsed_ms", outcome.stats.elapsed_ms)?;

    let result = PyDict::new(py);
    result.set_item("graph", graph)?;
    result.set_item("stats", stats)?;
    Ok(result.into())
}

/// Split an encoded signature into `(declaring, name, [params], return)`.
#[pyfunction]
fn decode_signature(text: &str) -> PyResult<(String, String, Vec<String>, String)> {
    let sig = Signature::decode(text)?;
    Ok((
        sig.declaring().to_string(),
        sig.name().to_string(),
        sig.params().iter().map(|p| p.encode()).collect(),
        sig.ret().encode(),
    ))
}

/// Canonical re-encoding; raises `ValueError` on malformed input.
#[pyfunction]
fn normalize_signature(text: &str) -> PyResult<String> {
    Ok(Signature::decode(text)?.encode())
}

#[pymodule]
fn _cgraph_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("ROOT_SIGNATURE", Signature::framework_root().encode())?;
    m.add_function(wrap_pyfunction!(build_call_graph, m)?)?;
    m.add_function(wrap_pyfunction!(decode_signature, m)?)?;
    m.add_function(wrap_pyfunction!(normalize_signature, m)?)?;
    Ok(())
}
