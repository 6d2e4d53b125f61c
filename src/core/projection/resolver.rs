//! Total, side-effect free mapping from a raw run payload to per-node results.

use super::matchers::first_match;
use super::{StepResult, StepResults, StepStatus};
use crate::core::graph::GraphModel;
use crate::core::runs::{RunRecord, RunStatus};
use serde_json::{Map, Value};
use std::borrow::Cow;

const DURATION_KEYS: &[&str] = &["durationMs", "duration_ms", "duration"];

/// Interpret a payload that is either an object or a JSON-encoded string.
///
/// Anything that does not yield an object (malformed JSON, arrays, scalars)
/// becomes an empty object.
pub fn parse_payload(raw: &Value) -> Cow<'_, Map<String, Value>> {
    match raw {
        Value::Object(map) => Cow::Borrowed(map),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Cow::Owned(map),
            Ok(_) => Cow::Owned(Map::new()),
            Err(err) => {
                tracing::debug!(error = %err, "malformed run payload treated as empty");
                Cow::Owned(Map::new())
            }
        },
        Value::Null => Cow::Owned(Map::new()),
        other => {
            tracing::debug!(kind = value_kind(other), "non-object run payload treated as empty");
            Cow::Owned(Map::new())
        }
    }
}

/// Resolve one `StepResult` per graph node. Never fails; the worst case is all `skipped`.
pub fn resolve(graph: &GraphModel, payload: &Value) -> StepResults {
    let payload = parse_payload(payload);
    graph
        .nodes()
        .iter()
        .map(|node| {
            let result = match first_match(node, &payload) {
                Some((strategy, record)) => {
                    tracing::trace!(node_id = %node.id, strategy = strategy.name(), "matched step record");
                    step_from_record(&node.id, record)
                }
                None => StepResult::skipped(node.id.clone()),
            };
            (node.id.clone(), result)
        })
        .collect()
}

/// Resolve a historical run, finalizing steps the payload still reports as active
/// when the run itself is no longer live.
///
/// A step only shows as waiting while its run waits; inside a running run it shows as running.
pub fn resolve_run(graph: &GraphModel, record: &RunRecord) -> StepResults {
    let mut results = resolve(graph, &record.result_payload);
    if record.status == RunStatus::Running {
        for result in results.values_mut() {
            if result.status == StepStatus::Waiting {
                result.status = StepStatus::Running;
            }
        }
    }
    if record.status.is_live() {
        return results;
    }
    let failed = record.status.is_failure();
    for result in results.values_mut() {
        result.status = match (result.status, failed) {
            (StepStatus::Running, true) => StepStatus::Error,
            (StepStatus::Waiting, true) => StepStatus::Rejected,
            (status, _) if status.is_active() => StepStatus::Skipped,
            (status, _) => status,
        };
    }
    results
}

fn step_from_record(node_id: &str, record: &Value) -> StepResult {
    let Some(fields) = record.as_object() else {
        return StepResult {
            node_id: node_id.to_string(),
            status: StepStatus::Success,
            output: record.clone(),
            duration_ms: 0,
        };
    };

    let status = fields
        .get("status")
        .and_then(Value::as_str)
        .and_then(StepStatus::parse)
        .unwrap_or(StepStatus::Success);

    let output = ["data", "output"]
        .iter()
        .find_map(|key| fields.get(*key).filter(|value| !value.is_null()))
        .unwrap_or(record)
        .clone();

    StepResult {
        node_id: node_id.to_string(),
        status,
        output,
        duration_ms: duration_field(fields),
    }
}

fn duration_field(fields: &Map<String, Value>) -> u64 {
    DURATION_KEYS
        .iter()
        .find_map(|key| fields.get(*key))
        .and_then(|value| {
            value
                .as_u64()
                .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v.round() as u64))
        })
        .unwrap_or(0)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
