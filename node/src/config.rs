//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use presence_types::PresenceParams;

use crate::NodeError;

/// Where the node keeps its tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process tables; everything is lost on restart.
    Memory,
    /// LMDB environment under `data_dir`.
    Lmdb,
}

/// Configuration for a presence node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory for LMDB storage.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_store_backend")]
    pub store_backend: StoreBackend,

    /// LMDB map size in bytes.
    #[serde(default = "default_lmdb_map_size")]
    pub lmdb_map_size: usize,

    /// Whether to enable the RPC server.
    #[serde(default = "default_true")]
    pub enable_rpc: bool,

    /// RPC port (if enabled).
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// Whether to enable the WebSocket server.
    #[serde(default)]
    pub enable_websocket: bool,

    /// WebSocket port (if enabled).
    #[serde(default = "default_ws_port")]
    pub websocket_port: u16,

    /// Whether `/metrics` reports the node's counters. When off the endpoint
    /// still answers, with an empty body.
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between sweeps of expired challenges.
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,

    /// Seconds between sweeps of overdue recovery requests.
    #[serde(default = "default_recovery_sweep_interval_secs")]
    pub recovery_sweep_interval_secs: u64,

    /// Shared secret for admin routes, sent as `x-admin-token`. Admin routes
    /// are open when unset.
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Deadlines, TTLs and the recovery quorum.
    #[serde(default)]
    pub params: PresenceParams,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./presence_data")
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Lmdb
}

fn default_lmdb_map_size() -> usize {
    1 << 30
}

fn default_true() -> bool {
    true
}

fn default_rpc_port() -> u16 {
    7077
}

fn default_ws_port() -> u16 {
    7078
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_prune_interval_secs() -> u64 {
    60
}

fn default_recovery_sweep_interval_secs() -> u64 {
    30
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(format!("{path}: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Reject settings the node cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        let mut problems = self.params.problems();
        if self.prune_interval_secs == 0 {
            problems.push("prune_interval_secs must be greater than zero".to_owned());
        }
        if self.recovery_sweep_interval_secs == 0 {
            problems.push("recovery_sweep_interval_secs must be greater than zero".to_owned());
        }
        if self.log_format.parse::<crate::LogFormat>().is_err() {
            problems.push(format!("unknown log_format {:?}", self.log_format));
        }
        if self.admin_token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            problems.push("admin_token must not be blank when set".to_owned());
        }
        if self.enable_rpc && self.enable_websocket && self.rpc_port == self.websocket_port {
            problems.push("rpc_port and websocket_port must differ".to_owned());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(NodeError::Config(problems.join("; ")))
        }
    }

    /// An in-memory node with servers off. Used by tests.
    pub fn ephemeral() -> Self {
        Self {
            store_backend: StoreBackend::Memory,
            enable_rpc: false,
            enable_websocket: false,
            ..Self::default()
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            store_backend: default_store_backend(),
            lmdb_map_size: default_lmdb_map_size(),
            enable_rpc: default_true(),
            rpc_port: default_rpc_port(),
            enable_websocket: false,
            websocket_port: default_ws_port(),
            enable_metrics: default_true(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            prune_interval_secs: default_prune_interval_secs(),
            recovery_sweep_interval_secs: default_recovery_sweep_interval_secs(),
            admin_token: None,
            params: PresenceParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.rpc_port, config.rpc_port);
        assert_eq!(parsed.params, config.params);
        assert_eq!(parsed.store_backend, StoreBackend::Lmdb);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.rpc_port, 7077);
        assert_eq!(config.params.handshake_deadline_ms, 1_500);
        assert_eq!(config.params.challenge_ttl_ms, 300_000);
        assert_eq!(config.log_format, "human");
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            rpc_port = 9999
            store_backend = "memory"
            admin_token = "s3cret"

            [params]
            required_approvals = 2
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.rpc_port, 9999);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.admin_token.as_deref(), Some("s3cret"));
        assert_eq!(config.params.required_approvals, 2);
        assert_eq!(config.params.recovery_ttl_ms, 86_400_000);
    }

    #[test]
    fn invalid_settings_are_reported_together() {
        let toml = r#"
            prune_interval_secs = 0
            log_format = "xml"

            [params]
            required_approvals = 0
        "#;
        let Err(NodeError::Config(msg)) = NodeConfig::from_toml_str(toml) else {
            panic!("expected a config error");
        };
        assert!(msg.contains("prune_interval_secs"));
        assert!(msg.contains("log_format"));
        assert!(msg.contains("required_approvals"));
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/presence.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
