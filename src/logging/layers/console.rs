use crate::logging::context::ExecutionContext;
use crate::logging::layers::BoxLayer;
use serde::Deserialize;
use std::fmt;
use std::io::{self, IsTerminal};
use std::str::FromStr;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::Layer;

/// Where console logs should be emitted.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleOutput {
    Stdout,
    #[default]
    Stderr,
    None,
}

impl ConsoleOutput {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsoleOutput::Stdout => "stdout",
            ConsoleOutput::Stderr => "stderr",
            ConsoleOutput::None => "none",
        }
    }
}

impl fmt::Display for ConsoleOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsoleOutput {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [ConsoleOutput::Stdout, ConsoleOutput::Stderr, ConsoleOutput::None]
            .into_iter()
            .find(|output| output.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                format!(
                    "invalid console output '{}'; supported values are stdout, stderr, none",
                    value
                )
            })
    }
}

/// Pick the console sink for a command.
///
/// `watch` renders its view on stdout, so it only logs to the console when
/// stderr was asked for explicitly.
pub fn select_console_output(
    context: ExecutionContext,
    configured: Option<ConsoleOutput>,
) -> ConsoleOutput {
    match (context, configured) {
        (ExecutionContext::Interactive, Some(ConsoleOutput::Stderr)) => ConsoleOutput::Stderr,
        (ExecutionContext::Interactive, _) => ConsoleOutput::None,
        (ExecutionContext::OneShot, configured) => configured.unwrap_or_default(),
    }
}

/// Compact console layer; `None` when the console sink is off.
pub fn console_layer(output: ConsoleOutput) -> Option<BoxLayer<Registry>> {
    let base = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    match output {
        ConsoleOutput::Stdout => Some(
            base.with_ansi(io::stdout().is_terminal())
                .with_writer(io::stdout)
                .boxed(),
        ),
        ConsoleOutput::Stderr => Some(
            base.with_ansi(io::stderr().is_terminal())
                .with_writer(io::stderr)
                .boxed(),
        ),
        ConsoleOutput::None => None,
    }
}
