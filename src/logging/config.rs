//! `[logging]` table of `.flowlens/config.toml`.
use crate::core::config::CONFIG_DIR;
use crate::logging::layers::console::ConsoleOutput;
use crate::Result;
use anyhow::{bail, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::filter::Directive;
use url::Url;

/// Line format of the file sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// How often the file sink starts a new file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Relative paths are anchored at the workspace root, else the home directory.
    pub log_dir: Option<PathBuf>,
    pub default_level: String,
    pub enable_file: bool,
    pub file_format: LogFormat,
    pub rotation: LogRotation,
    /// `None` lets the execution context decide.
    pub console_output: Option<ConsoleOutput>,
    pub opentelemetry: OpenTelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenTelemetryConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub service_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_dir: None,
            default_level: "info".to_string(),
            enable_file: true,
            file_format: LogFormat::Text,
            rotation: LogRotation::Never,
            console_output: None,
            opentelemetry: OpenTelemetryConfig::default(),
        }
    }
}

impl Default for OpenTelemetryConfig {
    fn default() -> Self {
        OpenTelemetryConfig {
            enabled: false,
            endpoint: None,
            service_name: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

/// The shared config file; every table but `[logging]` belongs to `FlowlensConfig`.
#[derive(Debug, Default, Deserialize)]
struct SharedConfigFile {
    #[serde(default)]
    logging: LoggingConfig,
}

impl LoggingConfig {
    /// Defaults, then the workspace file, then environment overrides; validated.
    pub fn load(workspace_root: Option<&Path>) -> Result<Self> {
        let mut config = match workspace_root {
            Some(root) => Self::read(&root.join(CONFIG_DIR).join("config.toml"))?,
            None => LoggingConfig::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(LoggingConfig::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read logging config {}", path.display()))?;
        let shared: SharedConfigFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse [logging] in {}", path.display()))?;
        Ok(shared.logging)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(endpoint) = non_empty_var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            self.opentelemetry.endpoint = Some(endpoint);
            self.opentelemetry.enabled = true;
        }
        if let Some(service_name) = non_empty_var("OTEL_SERVICE_NAME") {
            self.opentelemetry.service_name = service_name;
        }
        if let Some(raw) = non_empty_var("FLOWLENS_LOG_CONSOLE") {
            let output = ConsoleOutput::from_str(&raw).map_err(anyhow::Error::msg)?;
            self.console_output = Some(output);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for directive in self.default_level.split(',').filter(|d| !d.trim().is_empty()) {
            if Directive::from_str(directive.trim()).is_err() {
                bail!(
                    "logging.default_level '{}' is not a valid tracing directive",
                    self.default_level
                );
            }
        }

        let otel = &self.opentelemetry;
        match (&otel.endpoint, otel.enabled) {
            (Some(endpoint), _) => {
                Url::parse(endpoint)
                    .with_context(|| format!("invalid logging.opentelemetry.endpoint '{}'", endpoint))?;
            }
            (None, true) => {
                bail!("logging.opentelemetry.endpoint is required when opentelemetry is enabled")
            }
            (None, false) => {}
        }
        if otel.enabled && otel.service_name.trim().is_empty() {
            bail!("logging.opentelemetry.service_name cannot be empty");
        }
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
