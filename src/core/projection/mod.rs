//! Per-step status projection: the types every view is expressed in, plus the
//! resolver that derives them from raw run payloads.

pub mod matchers;
pub mod resolver;

use crate::core::graph::GraphModel;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use matchers::{MatchStrategy, TRIGGER_ALIASES};
pub use resolver::{parse_payload, resolve, resolve_run};

/// Ordered map of node id to result, in graph declaration order.
pub type StepResults = IndexMap<String, StepResult>;

/// Status of one step within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Error,
    Skipped,
    Waiting,
    Rejected,
}

impl StepStatus {
    /// Parse a raw engine status; `None` means "no recognisable status".
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => Some(StepStatus::Pending),
            "running" | "in_progress" | "started" => Some(StepStatus::Running),
            "success" | "completed" | "succeeded" | "ok" => Some(StepStatus::Success),
            "error" | "failed" | "failure" => Some(StepStatus::Error),
            "skipped" => Some(StepStatus::Skipped),
            "waiting" | "paused" => Some(StepStatus::Waiting),
            "rejected" => Some(StepStatus::Rejected),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Success => "success",
            StepStatus::Error => "error",
            StepStatus::Skipped => "skipped",
            StepStatus::Waiting => "waiting",
            StepStatus::Rejected => "rejected",
        }
    }

    /// `running` and `waiting` mark a step the engine is still working on.
    pub fn is_active(self) -> bool {
        matches!(self, StepStatus::Running | StepStatus::Waiting)
    }

    /// Terminal statuses are immutable once written for a run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Success | StepStatus::Error | StepStatus::Skipped | StepStatus::Rejected
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub node_id: String,
    pub status: StepStatus,
    pub output: Value,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn new(node_id: impl Into<String>, status: StepStatus) -> Self {
        StepResult {
            node_id: node_id.into(),
            status,
            output: Value::Null,
            duration_ms: 0,
        }
    }

    pub fn pending(node_id: impl Into<String>) -> Self {
        StepResult::new(node_id, StepStatus::Pending)
    }

    pub fn skipped(node_id: impl Into<String>) -> Self {
        StepResult::new(node_id, StepStatus::Skipped)
    }
}

/// Header-level summary of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunSummary {
    Idle,
    Running,
    Error,
    Success,
}

impl RunSummary {
    /// Running pre-empts error, which pre-empts success.
    pub fn of(results: &StepResults) -> Self {
        let statuses = || results.values().map(|result| result.status);
        if statuses().any(StepStatus::is_active) {
            RunSummary::Running
        } else if statuses().any(|status| status == StepStatus::Error) {
            RunSummary::Error
        } else if statuses().any(|status| status == StepStatus::Success) {
            RunSummary::Success
        } else {
            RunSummary::Idle
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunSummary::Idle => "idle",
            RunSummary::Running => "running",
            RunSummary::Error => "error",
            RunSummary::Success => "success",
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expand a sparse map into a total one over the graph, filling gaps as `pending`.
pub fn complete_with_pending(graph: &GraphModel, partial: &StepResults) -> StepResults {
    graph
        .nodes()
        .iter()
        .map(|node| {
            let result = partial
                .get(&node.id)
                .cloned()
                .unwrap_or_else(|| StepResult::pending(node.id.clone()));
            (node.id.clone(), result)
        })
        .collect()
}
