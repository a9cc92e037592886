//! Error types for the call graph engine.

#[cfg(feature = "python")]
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
#[cfg(feature = "python")]
use pyo3::PyErr;

/// Top-level error enum for the call graph engine.
///
/// Configuration-class variants abort a run before Phase B starts; per-unit
/// problems never surface here, they are contained by the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum CallGraphError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source root does not exist: {0}")]
    SourceRootMissing(String),

    #[error("No analyzable source files under {0}")]
    NoSourceFiles(String),

    #[error("Library spec error: {0}")]
    Library(String),

    #[error("Hierarchy cycle involving: {}", .0.join(", "))]
    HierarchyCycle(Vec<String>),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid signature '{text}': {reason}")]
    Signature { text: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),
}

impl CallGraphError {
    pub(crate) fn signature(text: &str, reason: impl Into<String>) -> Self {
        CallGraphError::Signature {
            text: text.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "python")]
impl From<CallGraphError> for PyErr {
    fn from(err: CallGraphError) -> PyErr {
        match &err {
            CallGraphError::Io(_) => PyIOError::new_err(err.to_string()),
            CallGraphError::Signature { .. }
            | CallGraphError::Json(_)
            | CallGraphError::Regex(_)
            | CallGraphError::Config(_) => PyValueError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

pub type CgResult<T> = Result<T, CallGraphError>;
