use crate::core::config::CONFIG_DIR;
use crate::logging::config::{LogFormat, LogRotation, LoggingConfig};
use crate::logging::layers::BoxLayer;
use crate::Result;
use anyhow::{anyhow, bail, Context};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::registry::Registry;
use tracing_subscriber::Layer;

const LOG_FILE_PREFIX: &str = "flowlens";
const LOG_FILE_SUFFIX: &str = "log";

/// Root that relative log directories resolve against.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogAnchor {
    Workspace(PathBuf),
    Home(PathBuf),
}

impl LogAnchor {
    fn find(workspace_root: Option<&Path>) -> Result<Self> {
        match workspace_root {
            Some(root) => Ok(LogAnchor::Workspace(root.to_path_buf())),
            None => dirs_next::home_dir()
                .map(LogAnchor::Home)
                .ok_or_else(|| anyhow!("no workspace and $HOME is unavailable; cannot place log file")),
        }
    }

    fn path(&self) -> &Path {
        match self {
            LogAnchor::Workspace(path) | LogAnchor::Home(path) => path,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            LogAnchor::Workspace(_) => "workspace",
            LogAnchor::Home(_) => "home directory",
        }
    }
}

/// Open file sink: where it writes and the guard that flushes it.
pub struct FileSink {
    pub directory: PathBuf,
    pub guard: WorkerGuard,
}

/// Directory holding the log files, `<anchor>/.flowlens/logs` unless configured.
pub fn log_directory(config: &LoggingConfig, workspace_root: Option<&Path>) -> Result<PathBuf> {
    match &config.log_dir {
        Some(custom) if custom.is_absolute() => Ok(custom.clone()),
        Some(custom) => {
            let anchor = LogAnchor::find(workspace_root)?;
            let resolved = normalize(&anchor.path().join(custom));
            if !resolved.starts_with(normalize(anchor.path())) {
                bail!(
                    "logging.log_dir '{}' resolves outside the {} {}",
                    custom.display(),
                    anchor.describe(),
                    anchor.path().display()
                );
            }
            Ok(resolved)
        }
        None => Ok(LogAnchor::find(workspace_root)?
            .path()
            .join(CONFIG_DIR)
            .join("logs")),
    }
}

/// Path of the current log file. Rotated sinks add a date stamp before the suffix.
pub fn log_file_path(config: &LoggingConfig, workspace_root: Option<&Path>) -> Result<PathBuf> {
    Ok(log_directory(config, workspace_root)?.join(format!("{}.{}", LOG_FILE_PREFIX, LOG_FILE_SUFFIX)))
}

/// Build the file layer; `None` when the file sink is disabled.
pub fn file_layer(
    config: &LoggingConfig,
    workspace_root: Option<&Path>,
) -> Result<Option<(BoxLayer<Registry>, FileSink)>> {
    if !config.enable_file {
        return Ok(None);
    }
    let directory = log_directory(config, workspace_root)?;
    fs::create_dir_all(&directory)
        .with_context(|| format!("failed to create log directory {}", directory.display()))?;

    let rotation = match config.rotation {
        LogRotation::Never => Rotation::NEVER,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
    };
    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .build(&directory)
        .with_context(|| format!("failed to open log file in {}", directory.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let base = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);
    let layer = match config.file_format {
        LogFormat::Text => base.boxed(),
        LogFormat::Json => base.json().with_current_span(true).boxed(),
    };
    Ok(Some((layer, FileSink { directory, guard })))
}

/// Lexical normalization; `..` never climbs above the root.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
