//! The persistence seam.
//!
//! Everything the editor needs from storage goes through
//! [`WorkflowBackend`]; the HTTP client talks to the real REST surface
//! and the in-memory implementation backs tests and the dev server.

pub mod http;
pub mod memory;

pub use http::{HttpBackend, HttpBackendConfig};
pub use memory::{BackendCalls, InMemoryBackend};

use async_trait::async_trait;

use crate::error::EditorError;
use crate::graph::{
    EdgeDraft, EdgeRecord, ExecutionHandle, NodeDraft, NodePatch, NodeRecord, WorkflowRecord,
};

#[async_trait]
pub trait WorkflowBackend: Send + Sync {
    async fn fetch_workflow(&self, workflow_id: &str) -> Result<WorkflowRecord, EditorError>;

    /// Persist workflow-level metadata. The full record is sent; the
    /// backend answers with its authoritative copy.
    async fn update_workflow(
        &self,
        record: &WorkflowRecord,
    ) -> Result<WorkflowRecord, EditorError>;

    async fn list_nodes(&self, workflow_id: &str) -> Result<Vec<NodeRecord>, EditorError>;

    async fn create_node(
        &self,
        workflow_id: &str,
        draft: &NodeDraft,
    ) -> Result<NodeRecord, EditorError>;

    async fn update_node(
        &self,
        workflow_id: &str,
        node_id: &str,
        patch: &NodePatch,
    ) -> Result<NodeRecord, EditorError>;

    async fn delete_node(&self, workflow_id: &str, node_id: &str) -> Result<(), EditorError>;

    async fn list_edges(&self, workflow_id: &str) -> Result<Vec<EdgeRecord>, EditorError>;

    async fn create_edge(
        &self,
        workflow_id: &str,
        draft: &EdgeDraft,
    ) -> Result<EdgeRecord, EditorError>;

    async fn delete_edge(&self, workflow_id: &str, edge_id: &str) -> Result<(), EditorError>;

    /// Kick off a server-side run of the persisted graph. Fire-and-forget
    /// from the editor's perspective; only the handle comes back.
    async fn execute(&self, workflow_id: &str) -> Result<ExecutionHandle, EditorError>;
}
