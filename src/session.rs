//! One open workflow in the editor.
//!
//! The session glues the pieces together: it owns the graph model, the
//! drawing surface, the viewport, the selection, and the sync queue, and
//! it translates interaction-layer gestures into model operations plus
//! persistence submissions. Nothing here blocks interaction on the
//! network; only explicit cascade deletes and execution wait for the
//! backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::backend::WorkflowBackend;
use crate::canvas::{DragState, Surface, Viewport};
use crate::document::GraphDocument;
use crate::error::EditorError;
use crate::graph::{
    Edge, ExecutionHandle, GraphError, GraphModel, Node, NodePatch, WorkflowRecord,
};
use crate::ids::EntityId;
use crate::registry::NodeKind;
use crate::sync::{Mutation, SyncEvent, SyncQueue};

/// Bounded wait for the drawing engine: poll up to this many times...
pub const READINESS_ATTEMPTS: u32 = 10;
/// ...at this interval, then give up visibly instead of hanging.
pub const READINESS_INTERVAL: Duration = Duration::from_millis(300);

/// Something the user should see once. Background failures never become
/// notices; they are logged and swallowed.
#[derive(Debug, Clone)]
pub enum SessionNotice {
    SyncFailed { what: String, error: String },
}

impl std::fmt::Display for SessionNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionNotice::SyncFailed { what, error } => {
                write!(f, "failed to {what}: {error}")
            }
        }
    }
}

fn lock(model: &Mutex<GraphModel>) -> MutexGuard<'_, GraphModel> {
    match model.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct EditorSession {
    workflow_id: String,
    model: Arc<Mutex<GraphModel>>,
    backend: Arc<dyn WorkflowBackend>,
    surface: Box<dyn Surface>,
    queue: SyncQueue,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    viewport: Viewport,
    selection: Option<EntityId>,
    drag: Option<DragState>,
    workflow: Option<WorkflowRecord>,
    /// Provisional → assigned ids, mirrored from confirmations so stale
    /// ids held by the interaction layer keep resolving.
    aliases: HashMap<EntityId, EntityId>,
    pending: Vec<SessionNotice>,
}

impl EditorSession {
    /// Must be called within a tokio runtime; the sync worker is spawned
    /// immediately.
    pub fn new(
        workflow_id: impl Into<String>,
        backend: Arc<dyn WorkflowBackend>,
        surface: Box<dyn Surface>,
    ) -> Self {
        let workflow_id = workflow_id.into();
        let model = Arc::new(Mutex::new(GraphModel::new(workflow_id.clone())));
        let (queue, events) = SyncQueue::spawn(Arc::clone(&backend), Arc::clone(&model));
        EditorSession {
            workflow_id,
            model,
            backend,
            surface,
            queue,
            events,
            viewport: Viewport::default(),
            selection: None,
            drag: None,
            workflow: None,
            aliases: HashMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn workflow(&self) -> Option<&WorkflowRecord> {
        self.workflow.as_ref()
    }

    pub fn workflow_mut(&mut self) -> Option<&mut WorkflowRecord> {
        self.workflow.as_mut()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn with_model<R>(&self, f: impl FnOnce(&GraphModel) -> R) -> R {
        f(&lock(&self.model))
    }

    fn resolve(&self, id: &EntityId) -> EntityId {
        self.aliases.get(id).cloned().unwrap_or_else(|| id.clone())
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                SyncEvent::NodeConfirmed { old, new } => {
                    if self.selection.as_ref() == Some(&old) {
                        self.selection = Some(new.clone());
                    }
                    if let Some(drag) = &mut self.drag {
                        if drag.node == old {
                            drag.node = new.clone();
                        }
                    }
                    self.surface.rebind_node(&old, &new);
                    self.aliases.insert(old, new);
                }
                SyncEvent::EdgeConfirmed { old, new } => {
                    self.aliases.insert(old, new);
                }
                SyncEvent::Failed { what, error } => {
                    self.pending.push(SessionNotice::SyncFailed { what, error });
                }
            }
        }
    }

    /// Apply queued confirmations and hand back anything the user should
    /// see. Interaction layers call this once per tick.
    pub fn poll_events(&mut self) -> Vec<SessionNotice> {
        self.drain_events();
        std::mem::take(&mut self.pending)
    }

    /// Wait until every submitted mutation has settled, then apply the
    /// resulting confirmations.
    pub async fn flush(&mut self) {
        self.queue.flush().await;
        self.drain_events();
    }

    /// Poll the drawing engine's readiness, bounded. Node and edge
    /// loading registers visual endpoints immediately, so nothing may be
    /// loaded before this resolves.
    pub async fn wait_until_ready(&self) -> Result<(), EditorError> {
        for attempt in 1..=READINESS_ATTEMPTS {
            if self.surface.is_ready() {
                return Ok(());
            }
            tracing::debug!(attempt, "drawing surface not ready, waiting");
            tokio::time::sleep(READINESS_INTERVAL).await;
        }
        Err(EditorError::SurfaceTimeout(READINESS_ATTEMPTS))
    }

    /// Fetch the stored graph and replay it. Connectors for persisted
    /// edges are re-drawn without re-issuing create calls.
    pub async fn load(&mut self) -> Result<(), EditorError> {
        self.wait_until_ready().await?;

        let record = self.backend.fetch_workflow(&self.workflow_id).await?;
        self.workflow = Some(record);

        let nodes = self.backend.list_nodes(&self.workflow_id).await?;
        let edges = self.backend.list_edges(&self.workflow_id).await?;

        let mut model = lock(&self.model);
        for record in &nodes {
            match Node::from_record(record) {
                Ok(node) => {
                    self.surface.mount_node(&node);
                    model.insert_node(node);
                }
                Err(GraphError::UnknownKind(tag)) => match NodeKind::suggest(&tag) {
                    Some(near) => tracing::warn!(
                        node = %record.id,
                        %tag,
                        suggestion = near.tag(),
                        "skipping node with unknown type"
                    ),
                    None => {
                        tracing::warn!(node = %record.id, %tag, "skipping node with unknown type")
                    }
                },
                Err(other) => tracing::warn!(node = %record.id, error = %other, "skipping node"),
            }
        }
        for record in &edges {
            let edge = Edge::from_record(record);
            if !model.contains_node(&edge.source) || !model.contains_node(&edge.target) {
                tracing::warn!(edge = %record.id, "skipping edge with missing endpoint");
                continue;
            }
            self.surface.draw_connector(&edge.source, &edge.target);
            model.insert_edge(edge);
        }
        Ok(())
    }

    /// Place a node at canvas coordinates. The local insert is optimistic;
    /// the create call is queued and the provisional id is swapped once
    /// the backend answers.
    pub fn add_node(&mut self, kind: NodeKind, x: i32, y: i32) -> Node {
        let node = lock(&self.model).add_node(kind, x, y);
        self.surface.mount_node(&node);
        self.queue.submit(Mutation::CreateNode {
            id: node.id.clone(),
            draft: node.to_draft(),
        });
        self.selection = Some(node.id.clone());
        node
    }

    /// Palette drop: translate screen coordinates through the viewport
    /// first.
    pub fn drop_from_palette(&mut self, kind: NodeKind, screen_x: f32, screen_y: f32) -> Node {
        let (x, y) = self.viewport.to_canvas(screen_x, screen_y);
        self.add_node(kind, x, y)
    }

    /// Tag-based entry point; unknown tags are a logged no-op.
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

    /// User-drawn connection between two ports.
    pub fn connect(&mut self, source: &EntityId, target: &EntityId) -> Result<Edge, EditorError> {
        self.connect_with_condition(source, target, String::new())
    }

    pub fn connect_with_condition(
        &mut self,
        source: &EntityId,
        target: &EntityId,
        condition: String,
    ) -> Result<Edge, EditorError> {
        let source = self.resolve(source);
        let target = self.resolve(target);
        let mut edge = {
            let mut model = lock(&self.model);
            let edge = model.add_edge(&source, &target)?;
            if !condition.is_empty() {
                model.set_edge_condition(&edge.id, condition.clone());
            }
            edge
        };
        edge.condition = condition;
        self.surface.draw_connector(&edge.source, &edge.target);
        self.queue.submit(Mutation::CreateEdge {
            id: edge.id.clone(),
            source: edge.source.clone(),
            target: edge.target.clone(),
            condition: edge.condition.clone(),
        });
        Ok(edge)
    }

    /// User detached a connection. No-ops when no edge matches.
    pub fn disconnect(&mut self, source: &EntityId, target: &EntityId) {
        let source = self.resolve(source);
        let target = self.resolve(target);
        let removed = lock(&self.model).remove_edge_between(&source, &target);
        match removed {
            Some(edge) => {
                self.surface.erase_connector(&edge.source, &edge.target);
                self.queue.submit(Mutation::DeleteEdge { id: edge.id });
            }
            None => tracing::warn!(%source, %target, "no edge to detach"),
        }
    }

    /// Single-selection: picking a node replaces the previous pick.
    pub fn select(&mut self, id: &EntityId) -> Option<Node> {
        let id = self.resolve(id);
        let node = lock(&self.model).node(&id).cloned();
        if node.is_some() {
            self.selection = Some(id);
        }
        node
    }

    /// Click on empty canvas.
    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn selection(&self) -> Option<&EntityId> {
        self.selection.as_ref()
    }

    pub fn selected_node(&self) -> Option<Node> {
        let id = self.selection.clone()?;
        lock(&self.model).node(&id).cloned()
    }

    /// Drag start: remember the grab offset so the node does not snap its
    /// corner under the pointer. Also selects the node.
    pub fn begin_drag(&mut self, id: &EntityId, screen_x: f32, screen_y: f32) {
        let id = self.resolve(id);
        let (cx, cy) = self.viewport.to_canvas(screen_x, screen_y);
        let Some(node) = lock(&self.model).node(&id).cloned() else {
            tracing::warn!(%id, "drag start on unknown node");
            return;
        };
        self.selection = Some(id.clone());
        self.drag = Some(DragState {
            node: id,
            grab_x: cx - node.x,
            grab_y: cy - node.y,
        });
    }

    /// Drag stop: store the new position, repaint the node's connector
    /// endpoints, and queue a background position update. Failures there
    /// are logged, never surfaced; they happen continuously during
    /// drags.
    pub fn end_drag(&mut self, screen_x: f32, screen_y: f32) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        let (cx, cy) = self.viewport.to_canvas(screen_x, screen_y);
        let x = (cx - drag.grab_x).max(0);
        let y = (cy - drag.grab_y).max(0);
        if let Err(error) = lock(&self.model).update_node_position(&drag.node, x, y) {
            tracing::warn!(%error, "position update dropped");
            return;
        }
        self.surface.repaint(&drag.node);
        self.queue.submit(Mutation::UpdateNode {
            id: drag.node,
            patch: NodePatch::position(x, y),
            interactive: false,
        });
    }

    pub fn cancel_drag(&mut self) {
        self.drag = None;
    }

    pub fn dragging(&self) -> Option<&DragState> {
        self.drag.as_ref()
    }

    /// Overwrite a node's name and description.
    pub fn update_node_meta(
        &mut self,
        id: &EntityId,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<(), EditorError> {
        let id = self.resolve(id);
        let name = name.into();
        let description = description.into();
        lock(&self.model).update_node_meta(&id, name.clone(), description.clone())?;
        self.queue.submit(Mutation::UpdateNode {
            id,
            patch: NodePatch::meta(name, description),
            interactive: true,
        });
        Ok(())
    }

    /// Overwrite a node's configuration payload (the mapping a
    /// [`crate::forms::ConfigForm`] save produces).
    pub fn update_node_config(
        &mut self,
        id: &EntityId,
        values: std::collections::BTreeMap<String, String>,
    ) -> Result<(), EditorError> {
        let id = self.resolve(id);
        let stored = {
            let mut model = lock(&self.model);
            model.update_node_config(&id, values)?;
            model.node(&id).map(|n| n.config.clone()).unwrap_or_default()
        };
        self.queue.submit(Mutation::UpdateNode {
            id,
            patch: NodePatch::config(stored),
            interactive: true,
        });
        Ok(())
    }

    /// Two-phase cascade: settle the queue, delete every dependent edge
    /// with acknowledgment, then the node. A failure partway leaves the
    /// remainder for [`EditorSession::reconcile`].
    pub async fn delete_node(&mut self, id: &EntityId) -> Result<(), EditorError> {
        self.flush().await;
        let id = self.resolve(id);

        let touching = lock(&self.model).edges_touching(&id);
        for edge in touching {
            if let Some(edge_id) = edge.id.as_assigned() {
                self.backend.delete_edge(&self.workflow_id, edge_id).await?;
            }
            lock(&self.model).remove_edge_by_id(&edge.id);
            self.surface.erase_connector(&edge.source, &edge.target);
        }

        if let Some(node_id) = id.as_assigned() {
            self.backend.delete_node(&self.workflow_id, node_id).await?;
        }
        if lock(&self.model).remove_node(&id).is_some() {
            self.surface.unmount_node(&id);
        }
        if self.selection.as_ref() == Some(&id) {
            self.selection = None;
        }
        Ok(())
    }

    /// Remove every node (and with them, every edge). First failure is
    /// reported after the sweep finishes what it can.
    pub async fn clear_canvas(&mut self) -> Result<(), EditorError> {
        let ids: Vec<EntityId> = self.with_model(|m| m.nodes().map(|n| n.id.clone()).collect());
        let mut first_error = None;
        for id in ids {
            if let Err(error) = self.delete_node(&id).await {
                tracing::error!(%id, %error, "clear canvas: node delete failed");
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Drop edges whose endpoints vanished (interrupted cascade) and
    /// queue their remote deletion.
    pub fn reconcile(&mut self) {
        let dangling = lock(&self.model).reconcile();
        for edge in dangling {
            self.surface.erase_connector(&edge.source, &edge.target);
            self.queue.submit(Mutation::DeleteEdge { id: edge.id });
        }
    }

    /// Persist workflow-level metadata.
    pub async fn save_workflow(&mut self) -> Result<WorkflowRecord, EditorError> {
        let record = self.workflow.clone().ok_or(EditorError::NotLoaded)?;
        let updated = self.backend.update_workflow(&record).await?;
        self.workflow = Some(updated.clone());
        Ok(updated)
    }

    /// Ask the backend to run the persisted graph. The queue is settled
    /// first so the run sees what the user sees.
    pub async fn execute(&mut self) -> Result<ExecutionHandle, EditorError> {
        self.flush().await;
        self.backend.execute(&self.workflow_id).await
    }

    pub fn zoom_in(&mut self) -> f32 {
        let zoom = self.viewport.zoom_in();
        self.surface.set_zoom(zoom);
        zoom
    }

    pub fn zoom_out(&mut self) -> f32 {
        let zoom = self.viewport.zoom_out();
        self.surface.set_zoom(zoom);
        zoom
    }

    pub fn reset_zoom(&mut self) -> f32 {
        let zoom = self.viewport.reset();
        self.surface.set_zoom(zoom);
        zoom
    }

    /// Snapshot the current graph as a portable document.
    pub fn export_document(&self) -> GraphDocument {
        let model = lock(&self.model);
        GraphDocument::capture(&model, self.workflow.as_ref())
    }

    /// Recreate a document's nodes and edges in this session. Everything
    /// is minted fresh; document ids never leak into the model.
    pub fn import_document(&mut self, document: &GraphDocument) -> Result<(), EditorError> {
        let mut id_map: HashMap<&str, EntityId> = HashMap::new();
        for entry in &document.nodes {
            let kind = NodeKind::parse(&entry.node_type)
                .ok_or_else(|| GraphError::UnknownKind(entry.node_type.clone()))?;
            let node = self.add_node(kind, entry.x, entry.y);
            self.update_node_meta(&node.id, entry.name.clone(), entry.description.clone())?;
            if !entry.config.is_empty() {
                self.update_node_config(&node.id, entry.config.clone())?;
            }
            id_map.insert(entry.id.as_str(), node.id);
        }
        for entry in &document.edges {
            let (Some(source), Some(target)) = (
                id_map.get(entry.source.as_str()),
                id_map.get(entry.target.as_str()),
            ) else {
                tracing::warn!(
                    source = %entry.source,
                    target = %entry.target,
                    "skipping document edge with unknown endpoint"
                );
                continue;
            };
            let source = source.clone();
            let target = target.clone();
            self.connect_with_condition(&source, &target, entry.condition.clone())?;
        }
        Ok(())
    }
}
