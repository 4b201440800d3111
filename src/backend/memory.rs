//! Id-assigning in-memory backend.
//!
//! Stands in for the real persistence service in tests, demos, and the
//! dev server binary. Behaves like the REST surface: assigns ids on
//! create, echoes config payloads opaquely, 404s on unknown entities,
//! and never cascades; edge cleanup is the client's job.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::backend::WorkflowBackend;
use crate::error::EditorError;
use crate::graph::{
    EdgeDraft, EdgeRecord, ExecutionHandle, NodeDraft, NodePatch, NodeRecord, WorkflowRecord,
    WorkflowStatus,
};

/// Per-operation call counters, for asserting how chatty the client was.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCalls {
    pub node_creates: u32,
    pub node_updates: u32,
    pub node_deletes: u32,
    pub edge_creates: u32,
    pub edge_deletes: u32,
    pub workflow_updates: u32,
    pub executes: u32,
}

#[derive(Debug, Default)]
struct Store {
    workflows: HashMap<String, WorkflowRecord>,
    nodes: HashMap<String, NodeRecord>,
    edges: HashMap<String, EdgeRecord>,
    seq: u64,
    calls: BackendCalls,
}

impl Store {
    fn next_id(&mut self) -> String {
        self.seq += 1;
        self.seq.to_string()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    inner: Mutex<Store>,
}

fn not_found(what: &str, id: &str) -> EditorError {
    EditorError::Backend {
        status: 404,
        message: format!("{what} {id} not found"),
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-seeded with one draft workflow; returns its id.
    pub fn with_workflow(name: impl Into<String>, description: impl Into<String>) -> (Self, String) {
        let backend = Self::new();
        let record = backend.create_workflow(name, description);
        let id = record.id;
        (backend, id)
    }

    pub fn create_workflow(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> WorkflowRecord {
        let mut store = self.lock();
        let now = Utc::now();
        let record = WorkflowRecord {
            id: store.next_id(),
            name: name.into(),
            description: description.into(),
            status: WorkflowStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        store.workflows.insert(record.id.clone(), record.clone());
        record
    }

    pub fn list_workflows(&self) -> Vec<WorkflowRecord> {
        let store = self.lock();
        let mut workflows: Vec<_> = store.workflows.values().cloned().collect();
        workflows.sort_by(|a, b| a.id.cmp(&b.id));
        workflows
    }

    pub fn calls(&self) -> BackendCalls {
        self.lock().calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl WorkflowBackend for InMemoryBackend {
    async fn fetch_workflow(&self, workflow_id: &str) -> Result<WorkflowRecord, EditorError> {
        let store = self.lock();
        store
            .workflows
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| not_found("workflow", workflow_id))
    }

    async fn update_workflow(
        &self,
        record: &WorkflowRecord,
    ) -> Result<WorkflowRecord, EditorError> {
        let mut store = self.lock();
        store.calls.workflow_updates += 1;
        if !store.workflows.contains_key(&record.id) {
            return Err(not_found("workflow", &record.id));
        }
        let mut updated = record.clone();
        updated.updated_at = Utc::now();
        store.workflows.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    async fn list_nodes(&self, workflow_id: &str) -> Result<Vec<NodeRecord>, EditorError> {
        let store = self.lock();
        if !store.workflows.contains_key(workflow_id) {
            return Err(not_found("workflow", workflow_id));
        }
        let mut nodes: Vec<_> = store
            .nodes
            .values()
            .filter(|n| n.workflow_id == workflow_id)
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    async fn create_node(
        &self,
        workflow_id: &str,
        draft: &NodeDraft,
    ) -> Result<NodeRecord, EditorError> {
        let mut store = self.lock();
        store.calls.node_creates += 1;
        if !store.workflows.contains_key(workflow_id) {
            return Err(not_found("workflow", workflow_id));
        }
        let record = NodeRecord {
            id: store.next_id(),
            workflow_id: workflow_id.to_string(),
            node_type: draft.node_type.clone(),
            name: draft.name.clone(),
            description: draft.description.clone(),
            config: draft.config.clone(),
            position_x: draft.position_x,
            position_y: draft.position_y,
            created_at: Utc::now(),
        };
        store.nodes.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_node(
        &self,
        workflow_id: &str,
        node_id: &str,
        patch: &NodePatch,
    ) -> Result<NodeRecord, EditorError> {
        let mut store = self.lock();
        store.calls.node_updates += 1;
        let node = match store.nodes.get_mut(node_id) {
            Some(node) if node.workflow_id == workflow_id => node,
            _ => return Err(not_found("node", node_id)),
        };
        if let Some(name) = &patch.name {
            node.name = name.clone();
        }
        if let Some(description) = &patch.description {
            node.description = description.clone();
        }
        if let Some(config) = &patch.config {
            node.config = config.clone();
        }
        if let Some(x) = patch.position_x {
            node.position_x = x;
        }
        if let Some(y) = patch.position_y {
            node.position_y = y;
        }
        Ok(node.clone())
    }

    async fn delete_node(&self, workflow_id: &str, node_id: &str) -> Result<(), EditorError> {
        let mut store = self.lock();
        store.calls.node_deletes += 1;
        match store.nodes.get(node_id) {
            Some(node) if node.workflow_id == workflow_id => {
                store.nodes.remove(node_id);
                Ok(())
            }
            _ => Err(not_found("node", node_id)),
        }
    }

    async fn list_edges(&self, workflow_id: &str) -> Result<Vec<EdgeRecord>, EditorError> {
        let store = self.lock();
        if !store.workflows.contains_key(workflow_id) {
            return Err(not_found("workflow", workflow_id));
        }
        let mut edges: Vec<_> = store
            .edges
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(edges)
    }

    async fn create_edge(
        &self,
        workflow_id: &str,
        draft: &EdgeDraft,
    ) -> Result<EdgeRecord, EditorError> {
        let mut store = self.lock();
        store.calls.edge_creates += 1;
        if !store.workflows.contains_key(workflow_id) {
            return Err(not_found("workflow", workflow_id));
        }
        let record = EdgeRecord {
            id: store.next_id(),
            workflow_id: workflow_id.to_string(),
            source_node_id: draft.source_node_id.clone(),
            target_node_id: draft.target_node_id.clone(),
            condition: draft.condition.clone(),
        };
        store.edges.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn delete_edge(&self, workflow_id: &str, edge_id: &str) -> Result<(), EditorError> {
        let mut store = self.lock();
        store.calls.edge_deletes += 1;
        match store.edges.get(edge_id) {
            Some(edge) if edge.workflow_id == workflow_id => {
                store.edges.remove(edge_id);
                Ok(())
            }
            _ => Err(not_found("edge", edge_id)),
        }
    }

    async fn execute(&self, workflow_id: &str) -> Result<ExecutionHandle, EditorError> {
        let mut store = self.lock();
        store.calls.executes += 1;
        if !store.workflows.contains_key(workflow_id) {
            return Err(not_found("workflow", workflow_id));
        }
        let id = store.next_id();
        Ok(ExecutionHandle {
            id: format!("exec-{id}"),
        })
    }
}
