//! Analysis settings, read from JSON.

use std::path::{Path, PathBuf};

use ferrite_hir::{Edition, FileSystem, join_path};
use ferrite_mbe::{DEFAULT_EXPANSION_DEPTH, ExpansionHost};
use ferrite_types::InferenceConfig;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown edition '{0}'")]
    InvalidEdition(String),
}

/// Limits and environment of one analysis session. Missing keys take their
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Nesting limit for macro calls inside builtin arguments
    pub macro_expansion_depth: usize,
    pub autoderef_limit: usize,
    pub trait_solver_depth: u32,
    pub fulfillment_rounds: usize,
    /// Edition of crates added without one
    pub default_edition: String,
    /// Variables visible to `env!` and `option_env!`
    pub env: FxHashMap<String, String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let limits = InferenceConfig::default();
        Self {
            macro_expansion_depth: DEFAULT_EXPANSION_DEPTH,
            autoderef_limit: limits.autoderef_limit,
            trait_solver_depth: limits.solver_depth,
            fulfillment_rounds: limits.fulfillment_rounds,
            default_edition: "2021".to_string(),
            env: FxHashMap::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = serde_json::from_str(text)?;
        config.edition()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn edition(&self) -> Result<Edition, ConfigError> {
        Edition::parse(&self.default_edition).ok_or_else(|| ConfigError::InvalidEdition(self.default_edition.clone()))
    }

    pub fn inference_config(&self) -> InferenceConfig {
        InferenceConfig {
            autoderef_limit: self.autoderef_limit,
            solver_depth: self.trait_solver_depth,
            fulfillment_rounds: self.fulfillment_rounds,
        }
    }
}

/// Environment and files seen by builtin macros expanded in one file
pub(crate) struct SessionHost<'a> {
    pub(crate) env: &'a FxHashMap<String, String>,
    pub(crate) files: &'a dyn FileSystem,
    /// Directory of the invoking file
    pub(crate) dir: &'a str,
}

impl ExpansionHost for SessionHost<'_> {
    fn env_var(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }

    fn read_file(&self, path: &str) -> Option<String> {
        self.files.read_file(&join_path(self.dir, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrite_hir::MemoryFileSystem;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = AnalysisConfig::from_json("{}").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.macro_expansion_depth, 128);
        assert_eq!(config.inference_config(), InferenceConfig::default());
        assert_eq!(config.edition().unwrap(), Edition::E2021);
    }

    #[test]
    fn test_partial_config_overrides_named_keys() {
        let config = AnalysisConfig::from_json(
            r#"{ "autoderef_limit": 3, "default_edition": "2018", "env": { "OUT_DIR": "/out" } }"#,
        )
        .unwrap();
        assert_eq!(config.autoderef_limit, 3);
        assert_eq!(config.trait_solver_depth, 32);
        assert_eq!(config.edition().unwrap(), Edition::E2018);
        assert_eq!(config.env.get("OUT_DIR").map(String::as_str), Some("/out"));
        assert_eq!(config.inference_config().autoderef_limit, 3);
    }

    #[test]
    fn test_bad_json_and_bad_edition_are_errors() {
        assert!(matches!(AnalysisConfig::from_json("{ not json"), Err(ConfigError::Json(_))));
        assert!(matches!(
            AnalysisConfig::from_json(r#"{ "autoderef_limt": 3 }"#),
            Err(ConfigError::Json(_))
        ));
        match AnalysisConfig::from_json(r#"{ "default_edition": "2030" }"#) {
            Err(ConfigError::InvalidEdition(edition)) => assert_eq!(edition, "2030"),
            other => panic!("expected an edition error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = AnalysisConfig::load("/nonexistent/ferrite.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/ferrite.json"));
    }

    #[test]
    fn test_host_reads_relative_to_invoking_file() {
        let mut files = MemoryFileSystem::new();
        files.insert("/app/src/gen/table.rs", "[1, 2]");
        let env = FxHashMap::from_iter([("PROFILE".to_string(), "debug".to_string())]);
        let host = SessionHost {
            env: &env,
            files: &files,
            dir: "/app/src",
        };
        assert_eq!(host.read_file("gen/table.rs").as_deref(), Some("[1, 2]"));
        assert_eq!(host.read_file("table.rs"), None);
        assert_eq!(host.env_var("PROFILE").as_deref(), Some("debug"));
        assert_eq!(host.env_var("HOME"), None);
    }
}
