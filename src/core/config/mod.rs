use serde::{Deserialize, Serialize};

pub mod loader;
pub mod validation;

pub use loader::{find_workspace_root, ConfigLoader, ConfigOverrides, CONFIG_DIR};
pub use validation::ConfigValidator;

/// Flowlens configuration loaded from `.flowlens/config.toml`.
///
/// The `[logging]` table of the same file is read separately by the logging module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FlowlensConfig {
    /// Execution engine endpoints
    #[serde(default)]
    pub engine: EngineConfig,

    /// Session timing and fetch sizes
    #[serde(default)]
    pub session: SessionConfig,

    /// Identity attached to approval decisions
    #[serde(default)]
    pub approval: ApprovalConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_http_url")]
    pub http_url: String,

    #[serde(default = "default_ws_url")]
    pub ws_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Duration timer period while a run is active
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Background history polling; 0 disables it
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Runs requested per history fetch
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_approver")]
    pub approver: String,

    #[serde(default = "default_source")]
    pub source: String,
}

fn default_http_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_ws_url() -> String {
    "ws://localhost:8080".to_string()
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_history_limit() -> usize {
    50
}

fn default_approver() -> String {
    "operator".to_string()
}

fn default_source() -> String {
    "flowlens".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            http_url: default_http_url(),
            ws_url: default_ws_url(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            tick_interval_ms: default_tick_interval_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        ApprovalConfig {
            approver: default_approver(),
            source: default_source(),
        }
    }
}
