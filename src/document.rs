//! YAML snapshots of a workflow graph, for export and import.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::{GraphModel, WorkflowRecord, WorkflowStatus};

fn default_version() -> String {
    "0.1".to_string()
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to parse graph document YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Self-contained description of one workflow's graph. Node ids in a
/// document are only meaningful within it; imports mint fresh ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GraphDocument {
    #[serde(default = "default_version")]
    pub version: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub status: WorkflowStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<DocumentNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<DocumentEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DocumentNode {
    pub id: String,
    pub node_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DocumentEdge {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub condition: String,
}

impl GraphDocument {
    pub fn from_yaml_str(input: &str) -> Result<Self, DocumentError> {
        Ok(serde_yaml::from_str(input)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, DocumentError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Snapshot the model (plus workflow metadata, when loaded) into a
    /// document. Nodes are ordered by id so output is deterministic.
    pub fn capture(model: &GraphModel, workflow: Option<&WorkflowRecord>) -> Self {
        let mut nodes: Vec<DocumentNode> = model
            .nodes()
            .map(|node| DocumentNode {
                id: node.id.to_string(),
                node_type: node.kind.tag().to_string(),
                name: node.name.clone(),
                description: node.description.clone(),
                config: node.config.clone(),
                x: node.x,
                y: node.y,
            })
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let edges = model
            .edges()
            .iter()
            .map(|edge| DocumentEdge {
                source: edge.source.to_string(),
                target: edge.target.to_string(),
                condition: edge.condition.clone(),
            })
            .collect();

        GraphDocument {
            version: default_version(),
            name: workflow.map(|w| w.name.clone()).unwrap_or_else(|| "untitled".to_string()),
            description: workflow.map(|w| w.description.clone()).unwrap_or_default(),
            status: workflow.map(|w| w.status).unwrap_or(WorkflowStatus::Draft),
            nodes,
            edges,
        }
    }
}
