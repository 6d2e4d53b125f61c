use crate::core::approval::ApprovalDecision;
use crate::core::error::AppError;
use crate::core::runs::{FetchTicket, RunRecord};
use crate::session::message::LiveMessage;
use serde::Serialize;
use std::str::FromStr;

/// Everything the session actor consumes, in arrival order.
#[derive(Debug)]
pub enum SessionEvent {
    /// Frame from the engine's push channel.
    Live(LiveMessage),
    /// WebSocket connection status change.
    Connection(ConnectionStatus),
    /// Command issued by the user.
    Command(UserCommand),
    HistoryFetched {
        ticket: FetchTicket,
        result: Result<Vec<RunRecord>, AppError>,
    },
    RunFetched {
        run_id: String,
        result: Result<RunRecord, AppError>,
    },
    ApprovalCompleted {
        token: u64,
        result: Result<(), AppError>,
    },
}

/// Line commands accepted by the `watch` session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    ShowLive,
    ShowHistory,
    ShowWaiting,
    Select(String),
    /// Open the approval dialog for a waiting run.
    Approve(String),
    Submit(ApprovalDecision),
    Dismiss,
    Refresh,
    Quit,
}

impl FromStr for UserCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or_else(|| "empty command".to_string())?;
        let arg = parts.next().map(str::to_string);

        let with_run = |arg: Option<String>, verb: &str| {
            arg.ok_or_else(|| format!("'{}' needs a run id", verb))
        };

        match verb.to_ascii_lowercase().as_str() {
            "live" | "current" => Ok(UserCommand::ShowLive),
            "history" => Ok(UserCommand::ShowHistory),
            "waiting" | "pending" => Ok(UserCommand::ShowWaiting),
            "select" | "show" => with_run(arg, verb).map(UserCommand::Select),
            "approve" | "open" => with_run(arg, verb).map(UserCommand::Approve),
            "resume" => Ok(UserCommand::Submit(ApprovalDecision::Resume)),
            "reject" => Ok(UserCommand::Submit(ApprovalDecision::Reject)),
            "dismiss" | "close" => Ok(UserCommand::Dismiss),
            "refresh" => Ok(UserCommand::Refresh),
            "quit" | "exit" | "q" => Ok(UserCommand::Quit),
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}

/// Current connection health for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub detail: Option<String>,
}

impl ConnectionStatus {
    pub fn new(state: ConnectionState, detail: impl Into<String>) -> Self {
        ConnectionStatus {
            state,
            detail: Some(detail.into()),
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        ConnectionStatus {
            state: ConnectionState::Connecting,
            detail: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}
