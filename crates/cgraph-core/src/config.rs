//! Run configuration loaded from a JSON file, with environment overrides.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{CallGraphError, CgResult};
use crate::indexer::hierarchy::CyclePolicy;
use crate::indexer::pipeline::AnalysisOptions;
use crate::library::LibrarySpec;

pub const WORKERS_ENV: &str = "CGRAPH_WORKERS";

/// Upper bound on explicitly requested worker threads.
pub const MAX_WORKERS: usize = 512;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// 0 selects one worker per available core.
    #[serde(default)]
    pub workers: usize,
    /// Regexes over `/`-separated paths relative to `source_root`.
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Extra library types and callbacks merged over the embedded set.
    #[serde(default)]
    pub library_spec: Option<PathBuf>,
    #[serde(default)]
    pub cycle_policy: CyclePolicy,
    #[serde(default = "default_main_methods_as_roots")]
    pub main_methods_as_roots: bool,
}

fn default_source_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("cgraph-out")
}

fn default_main_methods_as_roots() -> bool {
    true
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            source_root: default_source_root(),
            output_dir: default_output_dir(),
            workers: 0,
            include: Vec::new(),
            exclude: Vec::new(),
            library_spec: None,
            cycle_policy: CyclePolicy::default(),
            main_methods_as_roots: default_main_methods_as_roots(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_path(path: &Path) -> CgResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| CallGraphError::Config(format!("{}: {e}", path.display())))
    }

    pub fn apply_env(&mut self) -> CgResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> CgResult<()> {
        if let Some(raw) = lookup(WORKERS_ENV) {
            let value = raw.trim();
            self.workers = value.parse().map_err(|_| {
                CallGraphError::Config(format!("{WORKERS_ENV} must be a non-negative integer, got '{value}'"))
            })?;
            debug!(workers = self.workers, "worker count from environment");
        }
        Ok(())
    }

    /// Checks everything that can be checked before touching sources.
    pub fn validate(&self) -> CgResult<()> {
        if !self.source_root.exists() {
            return Err(CallGraphError::SourceRootMissing(self.source_root.display().to_string()));
        }
        if !self.source_root.is_dir() {
            return Err(CallGraphError::Config(format!(
                "source_root is not a directory: {}",
                self.source_root.display()
            )));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(CallGraphError::Config("output_dir must not be empty".to_string()));
        }
        if self.workers > MAX_WORKERS {
            return Err(CallGraphError::Config(format!(
                "workers must be at most {MAX_WORKERS}, got {}",
                self.workers
            )));
        }
        for pattern in self.include.iter().chain(&self.exclude) {
            Regex::new(pattern)?;
        }
        if let Some(path) = &self.library_spec {
            if !path.is_file() {
                return Err(CallGraphError::Config(format!(
                    "library_spec not found: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    pub fn options(&self) -> AnalysisOptions {
        AnalysisOptions {
            workers: self.workers,
            cycle_policy: self.cycle_policy,
            main_methods_as_roots: self.main_methods_as_roots,
        }
    }

    /// The embedded library, extended by `library_spec` when set.
    pub fn load_library(&self) -> CgResult<LibrarySpec> {
        let mut library = LibrarySpec::builtin()?;
        if let Some(path) = &self.library_spec {
            library.merge(LibrarySpec::from_path(path)?);
        }
        Ok(library)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: AnalysisConfig = serde_json::from_str(r#"{"workers": 3}"#).unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.source_root, PathBuf::from("."));
        assert_eq!(config.cycle_policy, CyclePolicy::Degrade);
        assert!(config.main_methods_as_roots);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cgraph.json");
        std::fs::write(&path, r#"{"wrkers": 3}"#).unwrap();
        assert!(matches!(AnalysisConfig::from_path(&path), Err(CallGraphError::Config(_))));
    }

    #[test]
    fn test_cycle_policy_parses_lowercase() {
        let config: AnalysisConfig = serde_json::from_str(r#"{"cycle_policy": "fail"}"#).unwrap();
        assert_eq!(config.options().cycle_policy, CyclePolicy::Fail);
    }

    #[test]
    fn test_env_override() {
        let mut config = AnalysisConfig::default();
        config
            .apply_env_from(|key| (key == WORKERS_ENV).then(|| " 6 ".to_string()))
            .unwrap();
        assert_eq!(config.workers, 6);
        assert!(config.apply_env_from(|_| Some("many".to_string())).is_err());
    }

    #[test]
    fn test_validate_reports_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AnalysisConfig {
            source_root: dir.path().join("absent"),
            ..AnalysisConfig::default()
        };
        assert!(matches!(config.validate(), Err(CallGraphError::SourceRootMissing(_))));

        config.source_root = dir.path().to_path_buf();
        assert!(config.validate().is_ok());

        config.exclude = vec!["[".to_string()];
        assert!(matches!(config.validate(), Err(CallGraphError::Regex(_))));

        config.exclude.clear();
        config.library_spec = Some(dir.path().join("missing.json"));
        assert!(matches!(config.validate(), Err(CallGraphError::Config(_))));
    }

    #[test]
    fn test_library_spec_extends_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.json");
        std::fs::write(
            &path,
            r#"{"types": {"org.app.Plugin": {"kind": "interface", "methods": ["void start()"]}},
                "callbacks": {"org.app.Plugin": ["start"]}}"#,
        )
        .unwrap();
        let config = AnalysisConfig {
            library_spec: Some(path),
            ..AnalysisConfig::default()
        };
        let library = config.load_library().unwrap();
        assert!(library.types.contains_key("org.app.Plugin"));
        assert!(library.types.contains_key("java.lang.Object"));
        assert!(library.callbacks["org.app.Plugin"].contains("start"));
    }
}
