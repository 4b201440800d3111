//! Wire representations exchanged with the workflow backend.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Active,
    Paused,
    Archived,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Draft => write!(f, "draft"),
            WorkflowStatus::Active => write!(f, "active"),
            WorkflowStatus::Paused => write!(f, "paused"),
            WorkflowStatus::Archived => write!(f, "archived"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted node. The `config` object is opaque to the backend: keys
/// are defined per node type and echoed back without validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NodeRecord {
    pub id: String,
    pub workflow_id: String,
    pub node_type: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    pub position_x: i32,
    pub position_y: i32,
    pub created_at: DateTime<Utc>,
}

/// Create body for a node; the backend assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NodeDraft {
    pub workflow_id: String,
    pub node_type: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    pub position_x: i32,
    pub position_y: i32,
    pub created_at: DateTime<Utc>,
}

/// Partial node update. Absent fields are left untouched by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_x: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_y: Option<i32>,
}

impl NodePatch {
    pub fn position(x: i32, y: i32) -> Self {
        NodePatch {
            position_x: Some(x),
            position_y: Some(y),
            ..NodePatch::default()
        }
    }

    pub fn meta(name: impl Into<String>, description: impl Into<String>) -> Self {
        NodePatch {
            name: Some(name.into()),
            description: Some(description.into()),
            ..NodePatch::default()
        }
    }

    pub fn config(values: BTreeMap<String, String>) -> Self {
        NodePatch {
            config: Some(values),
            ..NodePatch::default()
        }
    }

    /// Fold a later patch into this one, later fields winning. Used when
    /// the sync queue coalesces updates queued behind an in-flight call.
    pub fn absorb(&mut self, later: NodePatch) {
        if later.name.is_some() {
            self.name = later.name;
        }
        if later.description.is_some() {
            self.description = later.description;
        }
        if later.config.is_some() {
            self.config = later.config;
        }
        if later.position_x.is_some() {
            self.position_x = later.position_x;
        }
        if later.position_y.is_some() {
            self.position_y = later.position_y;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EdgeRecord {
    pub id: String,
    pub workflow_id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(default)]
    pub condition: String,
}

/// Create body for an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EdgeDraft {
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(default)]
    pub condition: String,
}

/// Opaque handle for a server-side run of the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionHandle {
    pub id: String,
}
