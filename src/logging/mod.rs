//! Process-wide tracing setup: env filter, file sink, console sink and optional OTLP export.
pub mod config;
pub mod context;
pub mod layers;

pub use context::{detect_context, ExecutionContext};
pub use layers::console::ConsoleOutput;

use crate::core::config::find_workspace_root;
use crate::logging::config::LoggingConfig;
use crate::logging::layers::opentelemetry::{OpenTelemetryGuard, OtlpExport};
use crate::logging::layers::{console, file, BoxLayer};
use crate::{cli::Command, Result};
use anyhow::{bail, Context};
use std::env;
use std::path::PathBuf;
use std::sync::Once;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

static INIT: Once = Once::new();

/// Keeps the logging sinks alive; dropping it flushes them.
pub struct LoggingGuard {
    _file: Option<file::FileSink>,
    _otel: Option<OpenTelemetryGuard>,
    console_output: ConsoleOutput,
    log_file_path: Option<PathBuf>,
}

impl LoggingGuard {
    pub fn console_output(&self) -> ConsoleOutput {
        self.console_output
    }

    /// `None` when the file sink is disabled.
    pub fn log_file_path(&self) -> Option<&PathBuf> {
        self.log_file_path.as_ref()
    }
}

/// Initialize logging for `command`. Fails when called twice in one process.
pub fn init(command: &Command) -> Result<LoggingGuard> {
    let mut first = false;
    INIT.call_once(|| first = true);
    if !first {
        bail!("logging already initialized");
    }

    let workspace_root = env::current_dir()
        .ok()
        .and_then(|cwd| find_workspace_root(&cwd));
    let config = LoggingConfig::load(workspace_root.as_deref())?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_level))
        .context("failed to configure tracing level")?;

    let mut layers: Vec<BoxLayer<Registry>> = Vec::new();

    let file_sink = match file::file_layer(&config, workspace_root.as_deref())? {
        Some((layer, sink)) => {
            layers.push(layer);
            Some(sink)
        }
        None => None,
    };
    let log_file_path = match file_sink {
        Some(_) => Some(file::log_file_path(&config, workspace_root.as_deref())?),
        None => None,
    };

    let console_output = console::select_console_output(detect_context(command), config.console_output);
    layers.extend(console::console_layer(console_output));

    // Export problems must not stop the command; they are reported once logging is up.
    let (otel_guard, otel_warning) = match OtlpExport::from_config(&config.opentelemetry)
        .and_then(|export| export.map(|export| export.install()).transpose())
    {
        Ok(Some((layer, guard))) => {
            layers.push(layer);
            (Some(guard), None)
        }
        Ok(None) => (None, None),
        Err(err) => (None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("failed to install tracing subscriber")?;

    if let Some(err) = otel_warning {
        tracing::warn!("OpenTelemetry export disabled: {:#}", err);
    }
    tracing::debug!(
        log_file = ?log_file_path,
        console = %console_output,
        "logging initialized"
    );

    Ok(LoggingGuard {
        _file: file_sink,
        _otel: otel_guard,
        console_output,
        log_file_path,
    })
}
