//! Immutable view of a workflow graph as supplied by the external editor.
#![allow(clippy::result_large_err)]

pub mod layout;

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub use layout::{visual_steps, ROW_TOLERANCE};

/// Identifier editors historically assign to the entry step.
pub const FIRST_NODE_ID: &str = "1";

/// Kind of a workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Trigger,
    #[default]
    Action,
    Condition,
    End,
    Placeholder,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Trigger => "trigger",
            NodeKind::Action => "action",
            NodeKind::Condition => "condition",
            NodeKind::End => "end",
            NodeKind::Placeholder => "placeholder",
        }
    }

    fn from_type(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trigger" => NodeKind::Trigger,
            "condition" => NodeKind::Condition,
            "end" => NodeKind::End,
            "placeholder" => NodeKind::Placeholder,
            _ => NodeKind::Action,
        }
    }
}

impl<'de> Deserialize<'de> for NodeKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(NodeKind::from_type(&raw))
    }
}

/// Declared metadata the resolver keys on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    #[serde(default, alias = "app_name", skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(default, alias = "action_id", skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Layout coordinates assigned by the editor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default, alias = "type")]
    pub kind: NodeKind,
    #[serde(default, alias = "data")]
    pub metadata: NodeMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Node {
            id: id.into(),
            kind,
            metadata: NodeMetadata::default(),
            position: None,
        }
    }

    pub fn with_metadata(mut self, metadata: NodeMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    /// Whether the trigger-alias matcher applies to this node.
    pub fn is_trigger(&self) -> bool {
        self.kind == NodeKind::Trigger || self.id == FIRST_NODE_ID
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == NodeKind::Placeholder
    }

    /// Label for display, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.metadata.label.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Deserialize)]
struct GraphDocument {
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

/// Validated, read-only workflow graph.
#[derive(Debug, Clone)]
pub struct GraphModel {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index: HashMap<String, usize>,
    cyclic: bool,
}

impl GraphModel {
    /// Build a graph, rejecting duplicate node ids and dangling edges.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, AppError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            if node.id.trim().is_empty() {
                return Err(AppError::validation("graph node id cannot be empty")
                    .with_code("FL-GRAPH-001"));
            }
            if index.insert(node.id.clone(), position).is_some() {
                return Err(AppError::validation(format!(
                    "duplicate node id '{}' in graph",
                    node.id
                ))
                .with_code("FL-GRAPH-002"));
            }
        }

        let mut digraph: DiGraph<(), ()> = DiGraph::new();
        let handles: Vec<NodeIndex> = nodes.iter().map(|_| digraph.add_node(())).collect();
        for edge in &edges {
            let (Some(&from), Some(&to)) = (index.get(&edge.source), index.get(&edge.target))
            else {
                return Err(AppError::validation(format!(
                    "edge {} -> {} references an unknown node",
                    edge.source, edge.target
                ))
                .with_code("FL-GRAPH-003"));
            };
            digraph.add_edge(handles[from], handles[to], ());
        }

        let cyclic = is_cyclic_directed(&digraph);
        if cyclic {
            tracing::warn!(
                nodes = nodes.len(),
                "graph contains a loop; visual step order cannot represent loop-backs"
            );
        }

        Ok(GraphModel {
            nodes,
            edges,
            index,
            cyclic,
        })
    }

    /// Parse a graph from JSON text (`{"nodes": [...], "edges": [...]}`).
    pub fn from_json_str(content: &str) -> Result<Self, AppError> {
        let document: GraphDocument = serde_json::from_str(content).map_err(|e| {
            AppError::new(
                ErrorCategory::SerializationError,
                format!("invalid graph JSON: {}", e),
            )
        })?;
        GraphModel::new(document.nodes, document.edges)
    }

    /// Load a graph file; `.yaml`/`.yml` is parsed as YAML, anything else as JSON.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to read graph file {}: {}", path.display(), e),
            )
        })?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext, "yaml" | "yml"))
            .unwrap_or(false);
        if is_yaml {
            let document: GraphDocument = serde_yaml::from_str(&content).map_err(|e| {
                AppError::new(
                    ErrorCategory::SerializationError,
                    format!("invalid graph YAML {}: {}", path.display(), e),
                )
            })?;
            GraphModel::new(document.nodes, document.edges)
        } else {
            GraphModel::from_json_str(&content)
                .map_err(|e| e.with_context(path.display().to_string()))
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&position| &self.nodes[position])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_cyclic(&self) -> bool {
        self.cyclic
    }
}
