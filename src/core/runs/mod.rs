//! Run records mirrored from the execution engine, and the store that holds them.
#![allow(clippy::result_large_err)]

pub mod store;

use crate::core::error::AppError;
use crate::core::projection::StepStatus;
use crate::core::types::ErrorCategory;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

pub use store::{FetchOutcome, FetchTicket, LiveApply, RunStore};

/// Run-level lifecycle status as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Success,
    Error,
    Failed,
    Waiting,
    /// Unrecognised status kept verbatim.
    Other(String),
}

impl RunStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" | "in_progress" => RunStatus::Running,
            "success" | "completed" | "succeeded" => RunStatus::Success,
            "error" => RunStatus::Error,
            "failed" | "failure" => RunStatus::Failed,
            "waiting" | "paused" => RunStatus::Waiting,
            _ => RunStatus::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
            RunStatus::Failed => "failed",
            RunStatus::Waiting => "waiting",
            RunStatus::Other(raw) => raw,
        }
    }

    /// `running` or `waiting`: the record may still change.
    pub fn is_live(&self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Waiting)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RunStatus::Error | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RunStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One execution of the workflow as recorded by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: String,
    pub status: RunStatus,
    /// Raw heterogeneous payload; an object or a JSON-encoded string.
    pub result_payload: Value,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_context: Option<Value>,
}

impl RunRecord {
    /// Build a record from an engine JSON object, accepting camelCase and snake_case keys.
    pub fn from_value(value: Value) -> Result<Self, AppError> {
        let id = string_field(&value, &["id", "runId", "run_id"]).ok_or_else(|| {
            AppError::new(ErrorCategory::SerializationError, "run record missing id")
        })?;
        let status = string_field(&value, &["status", "state"])
            .map(|raw| RunStatus::parse(&raw))
            .unwrap_or_else(|| RunStatus::Other("unknown".to_string()));
        let result_payload = first_present(&value, &["resultPayload", "result_payload", "result"])
            .cloned()
            .unwrap_or(Value::Null);
        let created_at = timestamp_field(&value, &["createdAt", "created_at", "timestamp"])
            .unwrap_or_else(|| {
                tracing::debug!(run_id = %id, "run record without createdAt; using now");
                Utc::now()
            });
        let current_context = first_present(&value, &["currentContext", "current_context"])
            .filter(|ctx| !ctx.is_null())
            .cloned();

        Ok(RunRecord {
            id,
            status,
            result_payload,
            created_at,
            current_context,
        })
    }

    /// `wait_info` from the paused run's context, if any.
    pub fn wait_info(&self) -> Option<&serde_json::Map<String, Value>> {
        self.current_context
            .as_ref()
            .and_then(|ctx| ctx.get("wait_info"))
            .and_then(Value::as_object)
    }
}

impl<'de> Deserialize<'de> for RunRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        RunRecord::from_value(value).map_err(|e| serde::de::Error::custom(e.message))
    }
}

/// A per-step update pushed by the engine for the in-flight run.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveStepUpdate {
    pub node_id: String,
    pub status: StepStatus,
    pub output: Option<Value>,
    pub duration_ms: Option<u64>,
    pub run_id: Option<String>,
}

impl LiveStepUpdate {
    pub fn new(node_id: impl Into<String>, status: StepStatus) -> Self {
        LiveStepUpdate {
            node_id: node_id.into(),
            status,
            output: None,
            duration_ms: None,
            run_id: None,
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn for_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

/// Newest-first list of run records, replaced wholesale on every fetch.
#[derive(Debug, Clone, Default)]
pub struct RunHistory {
    records: Vec<RunRecord>,
}

impl RunHistory {
    pub fn new(records: Vec<RunRecord>) -> Self {
        let mut history = RunHistory::default();
        history.replace(records);
        history
    }

    /// Replace the contents, ordering by `created_at` descending (stable).
    pub fn replace(&mut self, mut records: Vec<RunRecord>) {
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.records = records;
    }

    pub fn latest(&self) -> Option<&RunRecord> {
        self.records.first()
    }

    pub fn get(&self, run_id: &str) -> Option<&RunRecord> {
        self.records.iter().find(|record| record.id == run_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunRecord> {
        self.records.iter()
    }

    /// Records currently paused for approval, newest first.
    pub fn waiting(&self) -> impl Iterator<Item = &RunRecord> {
        self.records
            .iter()
            .filter(|record| record.status == RunStatus::Waiting)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub(crate) fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(*key))
        .and_then(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
}

pub(crate) fn first_present<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| value.get(*key))
}

fn timestamp_field(value: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    let raw = first_present(value, keys)?;
    if let Some(ts) = raw.as_str() {
        if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    if let Some(ts_num) = raw.as_i64() {
        if let Some(dt) = Utc.timestamp_opt(ts_num, 0).single() {
            return Some(dt);
        }
    }
    None
}
