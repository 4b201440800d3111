//! In-memory graph for one open workflow.
//!
//! The model is the single authority on nodes and edges during an editing
//! session. It owns its maps, never ambient state, so several
//! sessions (or tests) can hold independent models. Persistence and
//! rendering live elsewhere; every operation here is synchronous and
//! infallible at the I/O level.

mod records;

pub use records::{
    EdgeDraft, EdgeRecord, ExecutionHandle, NodeDraft, NodePatch, NodeRecord, WorkflowRecord,
    WorkflowStatus,
};

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ids::EntityId;
use crate::registry::NodeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSide {
    Input,
    Output,
}

impl std::fmt::Display for PortSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortSide::Input => write!(f, "input"),
            PortSide::Output => write!(f, "output"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("unknown node type tag `{0}`")]
    UnknownKind(String),

    #[error("unknown node {0}")]
    UnknownNode(EntityId),

    #[error("{kind} node {node} exposes no {side} port")]
    PortArity {
        node: EntityId,
        kind: NodeKind,
        side: PortSide,
    },

    #[error("edge {src} -> {target} already exists")]
    DuplicateEdge { src: EntityId, target: EntityId },
}

/// A typed unit of work placed on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: EntityId,
    pub workflow_id: String,
    pub kind: NodeKind,
    pub name: String,
    pub description: String,
    pub config: BTreeMap<String, String>,
    pub x: i32,
    pub y: i32,
    pub created_at: DateTime<Utc>,
}

impl Node {
    /// Rebuild a node from its persisted record. Fails on tags this build
    /// of the editor does not know.
    pub fn from_record(record: &NodeRecord) -> Result<Self, GraphError> {
        let kind = NodeKind::parse(&record.node_type)
            .ok_or_else(|| GraphError::UnknownKind(record.node_type.clone()))?;
        Ok(Node {
            id: EntityId::assigned(record.id.clone()),
            workflow_id: record.workflow_id.clone(),
            kind,
            name: record.name.clone(),
            description: record.description.clone(),
            config: record.config.clone(),
            x: record.position_x,
            y: record.position_y,
            created_at: record.created_at,
        })
    }

    pub fn to_draft(&self) -> NodeDraft {
        NodeDraft {
            workflow_id: self.workflow_id.clone(),
            node_type: self.kind.tag().to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            config: self.config.clone(),
            position_x: self.x,
            position_y: self.y,
            created_at: self.created_at,
        }
    }

    /// Value of one configuration field, tolerating keys the stored
    /// payload never had. Missing reads as empty.
    pub fn config_value(&self, field: &str) -> &str {
        self.config.get(field).map(String::as_str).unwrap_or("")
    }
}

/// A directed connection between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EntityId,
    pub workflow_id: String,
    pub source: EntityId,
    pub target: EntityId,
    pub condition: String,
}

impl Edge {
    pub fn from_record(record: &EdgeRecord) -> Self {
        Edge {
            id: EntityId::assigned(record.id.clone()),
            workflow_id: record.workflow_id.clone(),
            source: EntityId::assigned(record.source_node_id.clone()),
            target: EntityId::assigned(record.target_node_id.clone()),
            condition: record.condition.clone(),
        }
    }
}

/// Node and edge maps for the currently open workflow.
#[derive(Debug)]
pub struct GraphModel {
    workflow_id: String,
    nodes: HashMap<EntityId, Node>,
    edges: Vec<Edge>,
    node_seq: u64,
    edge_seq: u64,
}

impl GraphModel {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        GraphModel {
            workflow_id: workflow_id.into(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            node_seq: 0,
            edge_seq: 0,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn node(&self, id: &EntityId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &EntityId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Place a new node. The id is provisional until the backend
    /// acknowledges the create; the default name uses a per-session
    /// counter that is never reused, even across deletes.
    pub fn add_node(&mut self, kind: NodeKind, x: i32, y: i32) -> Node {
        self.node_seq += 1;
        let id = EntityId::Provisional(self.node_seq);
        let node = Node {
            id: id.clone(),
            workflow_id: self.workflow_id.clone(),
            kind,
            name: format!("{} {}", kind.label(), self.node_seq),
            description: String::new(),
            config: BTreeMap::new(),
            x,
            y,
            created_at: Utc::now(),
        };
        self.nodes.insert(id, node.clone());
        node
    }

    /// Tag-based entry point used when the kind arrives as a string
    /// (palette metadata, persisted records). Unknown tags are a logged
    /// no-op.
    pub fn add_node_tagged(&mut self, tag: &str, x: i32, y: i32) -> Option<Node> {
        match NodeKind::parse(tag) {
            Some(kind) => Some(self.add_node(kind, x, y)),
            None => {
                match NodeKind::suggest(tag) {
                    Some(near) => {
                        tracing::warn!(tag, suggestion = near.tag(), "unknown node type tag")
                    }
                    None => tracing::warn!(tag, "unknown node type tag"),
                }
                None
            }
        }
    }

    /// Insert a node that already exists elsewhere (backend load, document
    /// import). Replaces any entry under the same id.
    pub fn insert_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn insert_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Connect two nodes. Both endpoints must be known to the model at
    /// call time, the source must expose an output port, the target an
    /// input port, and the ordered pair must not already be connected.
    pub fn add_edge(&mut self, source: &EntityId, target: &EntityId) -> Result<Edge, GraphError> {
        let src = self.nodes.get(source).ok_or_else(|| {
            tracing::warn!(%source, "edge rejected: unknown source node");
            GraphError::UnknownNode(source.clone())
        })?;
        let dst = self.nodes.get(target).ok_or_else(|| {
            tracing::warn!(%target, "edge rejected: unknown target node");
            GraphError::UnknownNode(target.clone())
        })?;
        if src.kind.ports().outputs == 0 {
            tracing::warn!(%source, kind = src.kind.tag(), "edge rejected: source has no output port");
            return Err(GraphError::PortArity {
                node: source.clone(),
                kind: src.kind,
                side: PortSide::Output,
            });
        }
        if dst.kind.ports().inputs == 0 {
            tracing::warn!(%target, kind = dst.kind.tag(), "edge rejected: target has no input port");
            return Err(GraphError::PortArity {
                node: target.clone(),
                kind: dst.kind,
                side: PortSide::Input,
            });
        }
        if self
            .edges
            .iter()
            .any(|e| e.source == *source && e.target == *target)
        {
            tracing::warn!(%source, %target, "edge rejected: duplicate");
            return Err(GraphError::DuplicateEdge {
                src: source.clone(),
                target: target.clone(),
            });
        }

        self.edge_seq += 1;
        let edge = Edge {
            id: EntityId::Provisional(self.edge_seq),
            workflow_id: self.workflow_id.clone(),
            source: source.clone(),
            target: target.clone(),
            condition: String::new(),
        };
        self.edges.push(edge.clone());
        Ok(edge)
    }

    pub fn set_edge_condition(
        &mut self,
        id: &EntityId,
        condition: impl Into<String>,
    ) -> Option<()> {
        let edge = self.edges.iter_mut().find(|e| e.id == *id)?;
        edge.condition = condition.into();
        Some(())
    }

    /// Remove the first edge matching the ordered pair, if any.
    pub fn remove_edge_between(&mut self, source: &EntityId, target: &EntityId) -> Option<Edge> {
        let idx = self
            .edges
            .iter()
            .position(|e| e.source == *source && e.target == *target)?;
        Some(self.edges.remove(idx))
    }

    pub fn remove_edge_by_id(&mut self, id: &EntityId) -> Option<Edge> {
        let idx = self.edges.iter().position(|e| e.id == *id)?;
        Some(self.edges.remove(idx))
    }

    /// Every edge whose source or target is the given node.
    pub fn edges_touching(&self, id: &EntityId) -> Vec<Edge> {
        self.edges
            .iter()
            .filter(|e| e.source == *id || e.target == *id)
            .cloned()
            .collect()
    }

    /// Remove a node and, with it, every edge touching it. Returns the
    /// node together with the cascaded edges so callers can tear down
    /// their remote counterparts.
    pub fn remove_node(&mut self, id: &EntityId) -> Option<(Node, Vec<Edge>)> {
        let node = self.nodes.remove(id)?;
        let mut cascaded = Vec::new();
        self.edges.retain(|e| {
            if e.source == *id || e.target == *id {
                cascaded.push(e.clone());
                false
            } else {
                true
            }
        });
        Some((node, cascaded))
    }

    /// Overwrite a node's configuration. Only keys that belong to the
    /// node kind's field catalog are written; anything else the caller
    /// passed is discarded.
    pub fn update_node_config(
        &mut self,
        id: &EntityId,
        values: BTreeMap<String, String>,
    ) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
        let fields = node.kind.config_fields();
        node.config = values
            .into_iter()
            .filter(|(key, _)| fields.iter().any(|f| f.name == key.as_str()))
            .collect();
        Ok(())
    }

    pub fn update_node_position(&mut self, id: &EntityId, x: i32, y: i32) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
        node.x = x;
        node.y = y;
        Ok(())
    }

    pub fn update_node_meta(
        &mut self,
        id: &EntityId,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
        node.name = name.into();
        node.description = description.into();
        Ok(())
    }

    /// Swap a provisional node id for the server-assigned one, rewriting
    /// every edge endpoint that referenced it. Returns the new id so the
    /// rendering surface can rebind its element.
    pub fn confirm_node(&mut self, old: &EntityId, record: &NodeRecord) -> Option<EntityId> {
        let mut node = self.nodes.remove(old)?;
        let new = EntityId::assigned(record.id.clone());
        node.id = new.clone();
        node.created_at = record.created_at;
        self.nodes.insert(new.clone(), node);
        for edge in &mut self.edges {
            if edge.source == *old {
                edge.source = new.clone();
            }
            if edge.target == *old {
                edge.target = new.clone();
            }
        }
        Some(new)
    }

    pub fn confirm_edge(&mut self, old: &EntityId, record: &EdgeRecord) -> Option<EntityId> {
        let edge = self.edges.iter_mut().find(|e| e.id == *old)?;
        let new = EntityId::assigned(record.id.clone());
        edge.id = new.clone();
        Some(new)
    }

    /// Sweep for edges referencing nodes that no longer exist, the
    /// recovery path after a cascade delete was interrupted partway.
    pub fn reconcile(&mut self) -> Vec<Edge> {
        let nodes = &self.nodes;
        let mut dangling = Vec::new();
        self.edges.retain(|e| {
            if nodes.contains_key(&e.source) && nodes.contains_key(&e.target) {
                true
            } else {
                tracing::warn!(edge = %e.id, "removing edge with missing endpoint");
                dangling.push(e.clone());
                false
            }
        });
        dangling
    }
}
