#![allow(clippy::result_large_err)]

use super::{ConfigValidator, FlowlensConfig};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::{Path, PathBuf};

/// Directory that marks a flowlens workspace.
pub const CONFIG_DIR: &str = ".flowlens";
const CONFIG_FILE: &str = "config.toml";

/// Values supplied on the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub http_url: Option<String>,
    pub ws_url: Option<String>,
    pub approver: Option<String>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config with precedence defaults < `.flowlens/config.toml` < env < CLI, then validate.
    pub fn load(
        workspace_root: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<FlowlensConfig, AppError> {
        let mut config = match workspace_root {
            Some(root) => Self::load_from_workspace(root)?,
            None => {
                let mut config = FlowlensConfig::default();
                Self::apply_env_overrides(&mut config);
                config
            }
        };
        Self::apply_cli_overrides(&mut config, overrides);
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Load `<workspace>/.flowlens/config.toml` with environment overrides applied.
    /// A missing file yields defaults.
    pub fn load_from_workspace(workspace_path: &Path) -> Result<FlowlensConfig, AppError> {
        let config_path = workspace_path.join(CONFIG_DIR).join(CONFIG_FILE);
        let mut config = Self::load_from_file(&config_path)?.unwrap_or_default();
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Returns Ok(None) if the file doesn't exist.
    pub fn load_from_file(path: &Path) -> Result<Option<FlowlensConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: FlowlensConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_code("FL-CONFIG-001")
        })?;

        Ok(Some(config))
    }

    fn apply_env_overrides(config: &mut FlowlensConfig) {
        if let Ok(http_url) = env::var("FLOWLENS_HTTP_URL") {
            config.engine.http_url = http_url;
        }

        if let Ok(ws_url) = env::var("FLOWLENS_WS_URL") {
            config.engine.ws_url = ws_url;
        }

        if let Ok(approver) = env::var("FLOWLENS_APPROVER") {
            config.approval.approver = approver;
        }

        if let Ok(source) = env::var("FLOWLENS_APPROVAL_SOURCE") {
            config.approval.source = source;
        }

        if let Ok(raw) = env::var("FLOWLENS_TICK_INTERVAL_MS") {
            match raw.parse::<u64>() {
                Ok(value) => config.session.tick_interval_ms = value,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid FLOWLENS_TICK_INTERVAL_MS"),
            }
        }

        if let Ok(raw) = env::var("FLOWLENS_POLL_INTERVAL_SECS") {
            match raw.parse::<u64>() {
                Ok(value) => config.session.poll_interval_secs = value,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid FLOWLENS_POLL_INTERVAL_SECS"),
            }
        }

        if let Ok(raw) = env::var("FLOWLENS_HISTORY_LIMIT") {
            match raw.parse::<usize>() {
                Ok(value) => config.session.history_limit = value,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid FLOWLENS_HISTORY_LIMIT"),
            }
        }
    }

    fn apply_cli_overrides(config: &mut FlowlensConfig, overrides: &ConfigOverrides) {
        if let Some(http_url) = &overrides.http_url {
            config.engine.http_url = http_url.clone();
        }
        if let Some(ws_url) = &overrides.ws_url {
            config.engine.ws_url = ws_url.clone();
        }
        if let Some(approver) = &overrides.approver {
            config.approval.approver = approver.clone();
        }
    }

    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "FLOWLENS_HTTP_URL - Override engine HTTP base URL (default: http://localhost:8080)",
            "FLOWLENS_WS_URL - Override engine WebSocket base URL (default: ws://localhost:8080)",
            "FLOWLENS_APPROVER - Override approver identity sent with decisions",
            "FLOWLENS_APPROVAL_SOURCE - Override approval source tag (default: flowlens)",
            "FLOWLENS_TICK_INTERVAL_MS - Override duration timer period (default: 1000)",
            "FLOWLENS_POLL_INTERVAL_SECS - Override history poll interval, 0 disables (default: 30)",
            "FLOWLENS_HISTORY_LIMIT - Override runs per history fetch (default: 50)",
            "FLOWLENS_LOG_CONSOLE - Console log sink: stdout, stderr or none",
            "OTEL_EXPORTER_OTLP_ENDPOINT - Enable OpenTelemetry export to this endpoint",
            "OTEL_SERVICE_NAME - Service name reported with exported spans (default: flowlens)",
        ]
    }
}

/// Nearest ancestor of `current_dir` (inclusive) that contains a `.flowlens` directory.
pub fn find_workspace_root(current_dir: &Path) -> Option<PathBuf> {
    current_dir
        .ancestors()
        .find(|path| path.join(CONFIG_DIR).is_dir())
        .map(Path::to_path_buf)
}
