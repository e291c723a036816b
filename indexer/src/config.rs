//! Indexer configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use coda_rpc::ClientConfig;

use crate::logging::LogFormat;
use crate::IndexerError;

/// Configuration for the chain mirror indexer.
///
/// Can be loaded from a TOML file via [`IndexerConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Every field has a default, so an
/// empty file is a valid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// GraphQL endpoint of the upstream daemon.
    #[serde(default = "default_node_url")]
    pub node_url: String,

    /// SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Tail depth of the first pass after startup.
    #[serde(default = "default_startup_lookback")]
    pub startup_lookback: usize,

    /// Tail depth of every later pass.
    #[serde(default = "default_lookback")]
    pub lookback: usize,

    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,

    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,

    /// Orphaned blocks deeper than this many heights below the tip are
    /// physically removed. Pruning is off when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orphan_retention: Option<u64>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Capacity of the queue between the subscription and the scheduler.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_node_url() -> String {
    "http://localhost:3085/graphql".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./coda_mirror.db")
}

fn default_startup_lookback() -> usize {
    1000
}

fn default_lookback() -> usize {
    10
}

fn default_reconcile_interval_secs() -> u64 {
    60
}

fn default_status_interval_secs() -> u64 {
    600
}

fn default_prune_interval_secs() -> u64 {
    3600
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_notification_capacity() -> usize {
    16
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl IndexerConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, IndexerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| IndexerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, IndexerError> {
        toml::from_str(s).map_err(|e| IndexerError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, IndexerError> {
        toml::to_string_pretty(self).map_err(|e| IndexerError::Config(e.to_string()))
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.node_url.trim().is_empty() {
            return Err(IndexerError::Config("node_url must not be empty".into()));
        }
        if self.lookback == 0 || self.startup_lookback == 0 {
            return Err(IndexerError::Config("lookback depths must be at least 1".into()));
        }
        if self.reconcile_interval_secs == 0
            || self.status_interval_secs == 0
            || self.prune_interval_secs == 0
        {
            return Err(IndexerError::Config("intervals must be at least 1 second".into()));
        }
        if self.notification_capacity == 0 {
            return Err(IndexerError::Config(
                "notification_capacity must be at least 1".into(),
            ));
        }
        self.log_format()?;
        Ok(())
    }

    pub fn log_format(&self) -> Result<LogFormat, IndexerError> {
        self.log_format.parse()
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }

    /// Connection settings for the node client.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            node_url: self.node_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            notification_capacity: self.notification_capacity,
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            node_url: default_node_url(),
            database_path: default_database_path(),
            startup_lookback: default_startup_lookback(),
            lookback: default_lookback(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            status_interval_secs: default_status_interval_secs(),
            prune_interval_secs: default_prune_interval_secs(),
            orphan_retention: None,
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            notification_capacity: default_notification_capacity(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = IndexerConfig {
            orphan_retention: Some(290),
            ..IndexerConfig::default()
        };
        let toml_str = config.to_toml_string().unwrap();
        let parsed = IndexerConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = IndexerConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config, IndexerConfig::default());
        assert_eq!(config.startup_lookback, 1000);
        assert_eq!(config.lookback, 10);
        assert_eq!(config.reconcile_interval(), Duration::from_secs(60));
        assert_eq!(config.status_interval(), Duration::from_secs(600));
        assert_eq!(config.orphan_retention, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            node_url = "http://10.0.0.5:3085/graphql"
            lookback = 25
            orphan_retention = 100
        "#;
        let config = IndexerConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.node_url, "http://10.0.0.5:3085/graphql");
        assert_eq!(config.lookback, 25);
        assert_eq!(config.orphan_retention, Some(100));
        assert_eq!(config.log_format, "human"); // default
    }

    #[test]
    fn client_config_carries_timeouts() {
        let config = IndexerConfig {
            request_timeout_secs: 3,
            connect_timeout_secs: 1,
            ..IndexerConfig::default()
        };
        let client = config.client_config();
        assert_eq!(client.request_timeout, Duration::from_secs(3));
        assert_eq!(client.connect_timeout, Duration::from_secs(1));
        assert_eq!(client.notification_capacity, 16);
    }

    #[test]
    fn zero_lookback_is_invalid() {
        let config = IndexerConfig {
            lookback: 0,
            ..IndexerConfig::default()
        };
        assert!(matches!(config.validate(), Err(IndexerError::Config(_))));
    }

    #[test]
    fn unknown_log_format_is_invalid() {
        let config = IndexerConfig {
            log_format: "xml".into(),
            ..IndexerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = IndexerConfig::from_toml_file(Path::new("/nonexistent/coda.toml"));
        assert!(matches!(result, Err(IndexerError::Config(_))));
    }
}
