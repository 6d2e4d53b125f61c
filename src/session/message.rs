use crate::core::projection::StepStatus;
use crate::core::runs::{first_present, string_field, LiveStepUpdate};
use anyhow::anyhow;
use serde::Deserialize;
use serde_json::Value;

/// Structured representation of frames pushed on the engine's event socket.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveMessage {
    /// Incremental per-step update for the in-flight run.
    Step(LiveStepUpdate),
    RunStarted { run_id: Option<String> },
    RunFinished { run_id: Option<String> },
}

impl LiveMessage {
    pub fn parse(text: &str) -> crate::Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        parse_message(value)
    }

    pub fn run_id(&self) -> Option<&str> {
        match self {
            LiveMessage::Step(update) => update.run_id.as_deref(),
            LiveMessage::RunStarted { run_id } | LiveMessage::RunFinished { run_id } => {
                run_id.as_deref()
            }
        }
    }
}

impl<'de> Deserialize<'de> for LiveMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        parse_message(value).map_err(serde::de::Error::custom)
    }
}

fn parse_message(value: Value) -> crate::Result<LiveMessage> {
    if !value.is_object() {
        return Err(anyhow!("live message must be a JSON object"));
    }
    let run_id = string_field(&value, &["runId", "run_id", "executionId"]);
    let kind = string_field(&value, &["type", "event"]).unwrap_or_else(|| "step".to_string());

    match kind.to_ascii_lowercase().as_str() {
        "run_started" | "run-started" | "runstarted" => Ok(LiveMessage::RunStarted { run_id }),
        "run_finished" | "run-finished" | "runfinished" | "run_completed" => {
            Ok(LiveMessage::RunFinished { run_id })
        }
        "step" | "step_update" | "node" => {
            let node_id = string_field(&value, &["nodeId", "node_id", "stepId", "step_id"])
                .ok_or_else(|| anyhow!("missing nodeId"))?;
            let raw_status =
                string_field(&value, &["status"]).ok_or_else(|| anyhow!("missing status"))?;
            let status = StepStatus::parse(&raw_status)
                .ok_or_else(|| anyhow!("unknown step status '{}'", raw_status))?;

            let output = first_present(&value, &["output", "data"]).cloned();
            let duration_ms = first_present(&value, &["durationMs", "duration_ms", "duration"])
                .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0).round() as u64)));

            Ok(LiveMessage::Step(LiveStepUpdate {
                node_id,
                status,
                output,
                duration_ms,
                run_id,
            }))
        }
        other => Err(anyhow!("unsupported live message type '{}'", other)),
    }
}
