//! Human-in-the-loop approval gate for paused runs.
#![allow(clippy::result_large_err)]

use crate::core::error::{AppError, Notice};
use crate::core::runs::{RunHistory, RunRecord, RunStatus};
use serde::Serialize;
use std::str::FromStr;

pub const DEFAULT_INSTRUCTIONS: &str =
    "Review the pending step and choose to resume or reject this run.";

/// A run record known to be in `waiting` status.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitingRun(RunRecord);

impl WaitingRun {
    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn record(&self) -> &RunRecord {
        &self.0
    }

    /// Text from the first `wait_info` entry carrying `instructions`.
    pub fn instructions(&self) -> String {
        self.0
            .wait_info()
            .and_then(|info| info.values().next())
            .and_then(|entry| entry.get("instructions"))
            .and_then(|value| value.as_str())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string())
    }
}

impl TryFrom<RunRecord> for WaitingRun {
    type Error = RunRecord;

    fn try_from(record: RunRecord) -> Result<Self, Self::Error> {
        if record.status == RunStatus::Waiting {
            Ok(WaitingRun(record))
        } else {
            Err(record)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Resume,
    Reject,
}

impl ApprovalDecision {
    /// Path segment of the engine endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalDecision::Resume => "resume",
            ApprovalDecision::Reject => "reject",
        }
    }
}

impl std::fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalDecision {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resume" | "approve" => Ok(ApprovalDecision::Resume),
            "reject" | "deny" => Ok(ApprovalDecision::Reject),
            other => Err(AppError::validation(format!(
                "unknown approval decision '{}': expected resume or reject",
                other
            ))),
        }
    }
}

/// Identity attached to every approval action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Approver {
    #[serde(rename = "approver")]
    pub id: String,
    pub source: String,
}

impl Approver {
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Approver {
            id: id.into(),
            source: source.into(),
        }
    }
}

/// The open approval dialog.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRequest {
    pub run: WaitingRun,
    pub instructions: String,
    pub decision: Option<ApprovalDecision>,
    pub submitting: bool,
    pub last_error: Option<Notice>,
    token: u64,
}

impl ApprovalRequest {
    pub fn token(&self) -> u64 {
        self.token
    }
}

/// The remote call the session must perform for a submitted decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalAction {
    pub flow_id: String,
    pub run_id: String,
    pub decision: ApprovalDecision,
    pub approver: Approver,
    pub token: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalOutcome {
    /// Engine accepted the decision; the dialog is closed and history should be refreshed.
    Resolved {
        run_id: String,
        decision: ApprovalDecision,
    },
    /// Engine rejected or was unreachable; the dialog stays open for a manual retry.
    Failed(Notice),
    /// Completion for a request that was discarded in the meantime.
    Stale { succeeded: bool },
}

pub struct ApprovalGateway {
    flow_id: String,
    approver: Approver,
    current: Option<ApprovalRequest>,
    next_token: u64,
}

impl ApprovalGateway {
    pub fn new(flow_id: impl Into<String>, approver: Approver) -> Self {
        ApprovalGateway {
            flow_id: flow_id.into(),
            approver,
            current: None,
            next_token: 0,
        }
    }

    /// Open a dialog for `run`, discarding any request already open.
    pub fn open(&mut self, run: WaitingRun) -> &ApprovalRequest {
        if let Some(previous) = self.current.take() {
            tracing::debug!(run_id = %previous.run.id(), "discarding open approval request");
        }
        self.next_token += 1;
        let instructions = run.instructions();
        tracing::info!(run_id = %run.id(), "approval requested");
        self.current.insert(ApprovalRequest {
            run,
            instructions,
            decision: None,
            submitting: false,
            last_error: None,
            token: self.next_token,
        })
    }

    pub fn dismiss(&mut self) -> Option<ApprovalRequest> {
        self.current.take()
    }

    pub fn current(&self) -> Option<&ApprovalRequest> {
        self.current.as_ref()
    }

    /// Move the open request to `submitting` and return the action to send.
    pub fn begin_submit(&mut self, decision: ApprovalDecision) -> Result<ApprovalAction, AppError> {
        let request = self.current.as_mut().ok_or_else(|| {
            AppError::validation("no approval request is open").with_code("FL-APPROVAL-001")
        })?;
        if request.submitting {
            let mut error = AppError::validation("approval decision already being submitted")
                .with_code("FL-APPROVAL-002");
            error.add_context("run_id", request.run.id());
            return Err(error);
        }
        request.submitting = true;
        request.decision = Some(decision);
        request.last_error = None;
        Ok(ApprovalAction {
            flow_id: self.flow_id.clone(),
            run_id: request.run.id().to_string(),
            decision,
            approver: self.approver.clone(),
            token: request.token,
        })
    }

    /// Apply the engine's answer for the request identified by `token`.
    pub fn complete_submit(&mut self, token: u64, result: Result<(), AppError>) -> ApprovalOutcome {
        let is_current = self
            .current
            .as_ref()
            .is_some_and(|request| request.token == token && request.submitting);
        if !is_current {
            tracing::debug!(token, "discarding stale approval completion");
            return ApprovalOutcome::Stale {
                succeeded: result.is_ok(),
            };
        }

        match result {
            Ok(()) => {
                let Some(request) = self.current.take() else {
                    return ApprovalOutcome::Stale { succeeded: true };
                };
                let decision = request.decision.unwrap_or(ApprovalDecision::Resume);
                tracing::info!(run_id = %request.run.id(), %decision, "approval decision accepted");
                ApprovalOutcome::Resolved {
                    run_id: request.run.id().to_string(),
                    decision,
                }
            }
            Err(error) => {
                let notice = Notice::from_error(&error);
                if let Some(request) = self.current.as_mut() {
                    tracing::warn!(run_id = %request.run.id(), error = %error.message, "approval submit failed");
                    request.submitting = false;
                    request.last_error = Some(notice.clone());
                }
                ApprovalOutcome::Failed(notice)
            }
        }
    }

    pub fn waiting_runs(history: &RunHistory) -> Vec<WaitingRun> {
        history
            .waiting()
            .cloned()
            .filter_map(|record| WaitingRun::try_from(record).ok())
            .collect()
    }
}
