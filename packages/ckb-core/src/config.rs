//! Response budgets and backend limits, loaded from `.ckb/config.json`.
//!
//! Both structs are plain data with `Default` impls; a missing config file
//! (or a missing field within one) is not an error — callers fall back to
//! documented defaults field by field, not wholesale.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{CkbError, Result};

/// Bounds on how much a single query response may contain before the
/// response-shaping pipeline starts truncating and summarizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResponseBudget {
    pub max_modules: usize,
    pub max_symbols_per_module: usize,
    pub max_impact_items: usize,
    pub max_drilldowns: usize,
    pub estimated_max_tokens: usize,
}

impl Default for ResponseBudget {
    fn default() -> Self {
        Self {
            max_modules: 20,
            max_symbols_per_module: 50,
            max_impact_items: 100,
            max_drilldowns: 5,
            estimated_max_tokens: 8_000,
        }
    }
}

/// Bounds on how much work a single query may do against the backend before
/// it is cut off and returned as partial/timed-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackendLimits {
    pub max_refs_per_query: usize,
    pub max_symbols_per_search: usize,
    pub max_files_scanned: usize,
    pub max_file_size_bytes: u64,
    pub max_union_mode_time_ms: u64,
    pub max_scip_index_size_mb: u64,
}

impl Default for BackendLimits {
    fn default() -> Self {
        Self {
            max_refs_per_query: 500,
            max_symbols_per_search: 200,
            max_files_scanned: 10_000,
            max_file_size_bytes: 5 * 1024 * 1024,
            max_union_mode_time_ms: 2_000,
            max_scip_index_size_mb: 512,
        }
    }
}

/// Top-level config file shape. Every field is optional; an absent or
/// partially-populated file still loads successfully.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub response_budget: ResponseBudget,
    pub backend_limits: BackendLimits,
}

impl Config {
    /// Load `<repoRoot>/.ckb/config.json`. A missing file yields
    /// `Config::default()`; a present-but-malformed file is an error, since
    /// that signals the user wrote something they expect to take effect.
    pub fn load(repo_root: impl AsRef<Path>) -> Result<Self> {
        let path = repo_root.as_ref().join(".ckb").join("config.json");
        match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                CkbError::invalid_parameter(format!(
                    "malformed config at {}: {e}",
                    path.display()
                ))
                .with_source(e)
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(CkbError::internal(format!(
                "failed to read config at {}: {e}",
                path.display()
            ))
            .with_source(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_file_fills_missing_fields_from_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".ckb")).unwrap();
        std::fs::write(
            dir.path().join(".ckb").join("config.json"),
            r#"{"responseBudget": {"maxModules": 5}}"#,
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.response_budget.max_modules, 5);
        assert_eq!(
            config.response_budget.max_symbols_per_module,
            ResponseBudget::default().max_symbols_per_module
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".ckb")).unwrap();
        std::fs::write(dir.path().join(".ckb").join("config.json"), "{not json").unwrap();
        assert!(Config::load(dir.path()).is_err());
    }
}
