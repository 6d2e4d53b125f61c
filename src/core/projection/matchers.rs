//! Key-matching strategies used to locate a node's record inside a run payload.
//!
//! Engine payloads are keyed inconsistently depending on step type. The
//! strategies are tried in `MatchStrategy::ORDER`; the first hit wins. The
//! order is a best-match heuristic kept stable for compatibility with existing
//! payloads.

use crate::core::graph::Node;
use serde_json::{Map, Value};

/// Payload keys historically used for the workflow's entry step, in lookup order.
pub const TRIGGER_ALIASES: &[&str] = &[
    "schedule",
    "new-email",
    "new-row",
    "webhook",
    "trigger",
    "form",
    "run-agent",
    "http-webhook",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// The node id itself.
    ExactId,
    /// Well-known trigger keys; only applies to the trigger node.
    TriggerAlias,
    /// `metadata.actionId`.
    ActionId,
    /// `metadata.appName`.
    AppName,
    /// `appName_actionId`, then `appName-actionId`.
    CombinedKey,
    /// `metadata.label`.
    Label,
}

impl MatchStrategy {
    pub const ORDER: [MatchStrategy; 6] = [
        MatchStrategy::ExactId,
        MatchStrategy::TriggerAlias,
        MatchStrategy::ActionId,
        MatchStrategy::AppName,
        MatchStrategy::CombinedKey,
        MatchStrategy::Label,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MatchStrategy::ExactId => "exact_id",
            MatchStrategy::TriggerAlias => "trigger_alias",
            MatchStrategy::ActionId => "action_id",
            MatchStrategy::AppName => "app_name",
            MatchStrategy::CombinedKey => "combined_key",
            MatchStrategy::Label => "label",
        }
    }

    /// Look up this strategy's key(s) for `node` in `payload`.
    pub fn find<'a>(self, node: &Node, payload: &'a Map<String, Value>) -> Option<&'a Value> {
        let metadata = &node.metadata;
        match self {
            MatchStrategy::ExactId => payload.get(&node.id),
            MatchStrategy::TriggerAlias => {
                if !node.is_trigger() {
                    return None;
                }
                TRIGGER_ALIASES.iter().find_map(|alias| payload.get(*alias))
            }
            MatchStrategy::ActionId => lookup(payload, metadata.action_id.as_deref()),
            MatchStrategy::AppName => lookup(payload, metadata.app_name.as_deref()),
            MatchStrategy::CombinedKey => {
                let (app, action) = (
                    metadata.app_name.as_deref()?,
                    metadata.action_id.as_deref()?,
                );
                payload
                    .get(&format!("{}_{}", app, action))
                    .or_else(|| payload.get(&format!("{}-{}", app, action)))
            }
            MatchStrategy::Label => lookup(payload, metadata.label.as_deref()),
        }
    }
}

fn lookup<'a>(payload: &'a Map<String, Value>, key: Option<&str>) -> Option<&'a Value> {
    key.filter(|key| !key.is_empty())
        .and_then(|key| payload.get(key))
}

/// Run the strategies in order and return the first match with the strategy that found it.
pub fn first_match<'a>(
    node: &Node,
    payload: &'a Map<String, Value>,
) -> Option<(MatchStrategy, &'a Value)> {
    MatchStrategy::ORDER
        .iter()
        .find_map(|strategy| strategy.find(node, payload).map(|value| (*strategy, value)))
}
