//! Orchestrator configuration
//!
//! Loaded from the bootstrap TOML file (see `speval_common::config` for path
//! resolution). Every key is optional; missing keys take the defaults below.
//!
//! ```toml
//! root_folder = "/var/lib/speval"
//! port = 5790
//!
//! [logging]
//! level = "info"
//!
//! [database]
//! pool_size = 16
//!
//! [orchestrator]
//! worker_count = 4
//! stale_component_timeout_secs = 900
//! finalization_policy = "lenient"
//!
//! [analyzers]
//! transcription = "http://127.0.0.1:8001/transcribe"
//! grammar = "http://127.0.0.1:8002/grammar"
//! ```

use serde::{Deserialize, Serialize};
use speval_common::config::{load_toml_file, DatabaseConfig, LoggingConfig};
use speval_common::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::ComponentKind;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5790;

/// What the final summarizer does when some components did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalizationPolicy {
    /// Summarize whatever completed; missing kinds leave their fields empty
    #[default]
    Lenient,
    /// Refuse to summarize unless every component completed
    Strict,
}

/// `[orchestrator]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Concurrent jobs executed by the in-process worker pool
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Jobs buffered between dispatcher and worker pool
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Dispatched components idle longer than this are failed; 0 disables
    #[serde(default = "default_stale_component_timeout_secs")]
    pub stale_component_timeout_secs: u64,

    #[serde(default)]
    pub finalization_policy: FinalizationPolicy,

    /// Run the completion aggregator right after each component report
    #[serde(default)]
    pub evaluate_on_report: bool,

    /// Finished parent tasks older than this are purged; outcomes are kept
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,

    /// Request timeout for HTTP analyzers
    #[serde(default = "default_analyzer_timeout_secs")]
    pub analyzer_timeout_secs: u64,

    /// PENDING parents older than this at startup are failed
    #[serde(default = "default_interrupted_grace_secs")]
    pub interrupted_grace_secs: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            stale_component_timeout_secs: default_stale_component_timeout_secs(),
            finalization_policy: FinalizationPolicy::default(),
            evaluate_on_report: false,
            retention_days: default_retention_days(),
            purge_interval_secs: default_purge_interval_secs(),
            analyzer_timeout_secs: default_analyzer_timeout_secs(),
            interrupted_grace_secs: default_interrupted_grace_secs(),
        }
    }
}

impl OrchestratorSettings {
    pub fn stale_component_timeout(&self) -> Option<Duration> {
        (self.stale_component_timeout_secs > 0).then(|| Duration::from_secs(self.stale_component_timeout_secs))
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

fn default_worker_count() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

fn default_stale_component_timeout_secs() -> u64 {
    900
}

fn default_retention_days() -> u32 {
    7
}

fn default_purge_interval_secs() -> u64 {
    3600
}

fn default_analyzer_timeout_secs() -> u64 {
    120
}

fn default_interrupted_grace_secs() -> u64 {
    60
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Bootstrap TOML file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Analyzer endpoint URL per component kind
    #[serde(default)]
    pub analyzers: BTreeMap<ComponentKind, String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: DEFAULT_PORT,
            logging: LoggingConfig::default(),
            database: DatabaseConfig::default(),
            orchestrator: OrchestratorSettings::default(),
            analyzers: BTreeMap::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Load from `path`, or built-in defaults when no file is configured
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => load_toml_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Kinds without a configured analyzer endpoint
    pub fn unconfigured_kinds(&self) -> Vec<ComponentKind> {
        ComponentKind::ALL
            .into_iter()
            .filter(|k| !self.analyzers.contains_key(k))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: OrchestratorConfig = toml::from_str("").unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.orchestrator.worker_count, 4);
        assert_eq!(config.orchestrator.retention_days, 7);
        assert_eq!(config.orchestrator.finalization_policy, FinalizationPolicy::Lenient);
        assert!(!config.orchestrator.evaluate_on_report);
        assert_eq!(
            config.orchestrator.stale_component_timeout(),
            Some(Duration::from_secs(900))
        );
        assert_eq!(config.unconfigured_kinds().len(), ComponentKind::COUNT);
    }

    #[test]
    fn test_full_file_parses() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("speval.toml");
        std::fs::write(
            &path,
            r#"
            root_folder = "/data/speval"
            port = 6000

            [logging]
            level = "debug"

            [orchestrator]
            worker_count = 8
            stale_component_timeout_secs = 0
            finalization_policy = "strict"
            evaluate_on_report = true

            [analyzers]
            transcription = "http://localhost:9000/transcribe"
            content_comparison = "http://localhost:9000/content"
            "#,
        )
        .unwrap();

        let config = OrchestratorConfig::load(Some(&path)).unwrap();
        assert_eq!(config.root_folder, Some(PathBuf::from("/data/speval")));
        assert_eq!(config.port, 6000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.orchestrator.worker_count, 8);
        assert_eq!(config.orchestrator.stale_component_timeout(), None);
        assert_eq!(config.orchestrator.finalization_policy, FinalizationPolicy::Strict);
        assert!(config.orchestrator.evaluate_on_report);
        assert_eq!(
            config.analyzers.get(&ComponentKind::ContentComparison).map(String::as_str),
            Some("http://localhost:9000/content")
        );
        assert_eq!(config.unconfigured_kinds().len(), 6);
    }

    #[test]
    fn test_unknown_analyzer_kind_is_rejected() {
        let result: std::result::Result<OrchestratorConfig, _> =
            toml::from_str("[analyzers]\nspelling = \"http://x\"");
        assert!(result.is_err());
    }
}
