//! Per-entity single-flight persistence queue.
//!
//! Every graph mutation becomes a [`Mutation`] submitted here. The worker
//! keeps at most one request in flight per entity; anything submitted
//! while an entity is busy queues behind it, and consecutive queued
//! updates coalesce (later fields win). Requests for different entities
//! run concurrently. This replaces unordered fire-and-forget calls with
//! a defined policy: per-entity order is submission order, so the final
//! persisted state matches the final local state regardless of network
//! reordering.
//!
//! Id assignment flows back through the worker: when a create completes,
//! the provisional id is confirmed in the model, queued mutations are
//! re-keyed, and an event is emitted so the rendering surface can rebind.
//! Edges drawn against still-provisional nodes are parked until both
//! endpoints are acknowledged.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, oneshot};

use crate::backend::WorkflowBackend;
use crate::error::EditorError;
use crate::graph::{EdgeDraft, EdgeRecord, GraphModel, NodeDraft, NodePatch, NodeRecord};
use crate::ids::EntityId;

#[derive(Debug, Clone)]
pub enum Mutation {
    CreateNode {
        id: EntityId,
        draft: NodeDraft,
    },
    UpdateNode {
        id: EntityId,
        patch: NodePatch,
        /// Background updates (continuous position sync) fail silently;
        /// interactive saves surface a visible event.
        interactive: bool,
    },
    DeleteNode {
        id: EntityId,
    },
    CreateEdge {
        id: EntityId,
        source: EntityId,
        target: EntityId,
        condition: String,
    },
    DeleteEdge {
        id: EntityId,
    },
}

impl Mutation {
    fn key(&self) -> EntityKey {
        match self {
            Mutation::CreateNode { id, .. }
            | Mutation::UpdateNode { id, .. }
            | Mutation::DeleteNode { id } => EntityKey::Node(id.clone()),
            Mutation::CreateEdge { id, .. } | Mutation::DeleteEdge { id } => {
                EntityKey::Edge(id.clone())
            }
        }
    }

    fn interactive(&self) -> bool {
        match self {
            Mutation::UpdateNode { interactive, .. } => *interactive,
            _ => true,
        }
    }

    fn describe(&self) -> String {
        match self {
            Mutation::CreateNode { id, .. } => format!("create node {id}"),
            Mutation::UpdateNode { id, .. } => format!("update node {id}"),
            Mutation::DeleteNode { id } => format!("delete node {id}"),
            Mutation::CreateEdge { source, target, .. } => {
                format!("create edge {source} -> {target}")
            }
            Mutation::DeleteEdge { id } => format!("delete edge {id}"),
        }
    }
}

/// Worker → session notifications.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    NodeConfirmed { old: EntityId, new: EntityId },
    EdgeConfirmed { old: EntityId, new: EntityId },
    /// An interactive mutation failed; the user should see this once.
    Failed { what: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EntityKey {
    Node(EntityId),
    Edge(EntityId),
}

enum Outcome {
    NodeCreated(NodeRecord),
    NodeUpdated,
    NodeDeleted,
    EdgeCreated(EdgeRecord),
    EdgeDeleted,
}

type Completion = (EntityKey, Mutation, Result<Outcome, EditorError>);

enum Command {
    Apply(Mutation),
    Flush(oneshot::Sender<()>),
}

/// Handle to the spawned sync worker.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    tx: mpsc::UnboundedSender<Command>,
}

impl SyncQueue {
    /// Spawn the worker task. Confirmed ids are merged into `model`;
    /// notifications arrive on the returned receiver.
    pub fn spawn(
        backend: Arc<dyn WorkflowBackend>,
        model: Arc<Mutex<GraphModel>>,
    ) -> (SyncQueue, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(backend, model, rx, event_tx));
        (SyncQueue { tx }, event_rx)
    }

    pub fn submit(&self, mutation: Mutation) {
        if self.tx.send(Command::Apply(mutation)).is_err() {
            tracing::error!("sync worker is gone; mutation dropped");
        }
    }

    /// Resolve once every submitted mutation has completed or been
    /// dropped. Used before cascade deletes and by tests.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

struct Worker {
    backend: Arc<dyn WorkflowBackend>,
    model: Arc<Mutex<GraphModel>>,
    events: mpsc::UnboundedSender<SyncEvent>,
    workflow_id: String,
    /// Queued-but-not-dispatched mutations, per entity.
    slots: HashMap<EntityKey, VecDeque<Mutation>>,
    busy: HashSet<EntityKey>,
    /// Provisional → assigned, learned from create confirmations.
    aliases: HashMap<EntityId, EntityId>,
    /// Edge creates waiting for their endpoints to be acknowledged.
    parked_edges: Vec<Mutation>,
    flush_waiters: Vec<oneshot::Sender<()>>,
}

async fn run_worker(
    backend: Arc<dyn WorkflowBackend>,
    model: Arc<Mutex<GraphModel>>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SyncEvent>,
) {
    let workflow_id = match model.lock() {
        Ok(model) => model.workflow_id().to_string(),
        Err(poisoned) => poisoned.into_inner().workflow_id().to_string(),
    };
    let mut worker = Worker {
        backend,
        model,
        events,
        workflow_id,
        slots: HashMap::new(),
        busy: HashSet::new(),
        aliases: HashMap::new(),
        parked_edges: Vec::new(),
        flush_waiters: Vec::new(),
    };
    let mut in_flight: FuturesUnordered<BoxFuture<'static, Completion>> = FuturesUnordered::new();
    let mut closed = false;

    loop {
        tokio::select! {
            command = rx.recv(), if !closed => match command {
                Some(Command::Apply(mutation)) => worker.accept(mutation, &mut in_flight),
                Some(Command::Flush(done)) => {
                    worker.flush_waiters.push(done);
                    worker.release_flush_waiters(&in_flight);
                }
                None => closed = true,
            },
            Some(completion) = in_flight.next(), if !in_flight.is_empty() => {
                worker.complete(completion, &mut in_flight);
                worker.release_flush_waiters(&in_flight);
            }
            else => break,
        }
        if closed && in_flight.is_empty() {
            break;
        }
    }
}

impl Worker {
    fn resolve(&self, id: &EntityId) -> EntityId {
        self.aliases.get(id).cloned().unwrap_or_else(|| id.clone())
    }

    fn resolve_mutation(&self, mutation: Mutation) -> Mutation {
        match mutation {
            Mutation::CreateNode { id, draft } => Mutation::CreateNode { id, draft },
            Mutation::UpdateNode {
                id,
                patch,
                interactive,
            } => Mutation::UpdateNode {
                id: self.resolve(&id),
                patch,
                interactive,
            },
            Mutation::DeleteNode { id } => Mutation::DeleteNode {
                id: self.resolve(&id),
            },
            Mutation::CreateEdge {
                id,
                source,
                target,
                condition,
            } => Mutation::CreateEdge {
                id,
                source: self.resolve(&source),
                target: self.resolve(&target),
                condition,
            },
            Mutation::DeleteEdge { id } => Mutation::DeleteEdge {
                id: self.resolve(&id),
            },
        }
    }

    fn accept(&mut self, mutation: Mutation, in_flight: &mut FuturesUnordered<BoxFuture<'static, Completion>>) {
        let mutation = self.resolve_mutation(mutation);

        if let Mutation::CreateEdge { source, target, .. } = &mutation {
            if source.is_provisional() || target.is_provisional() {
                tracing::debug!(%source, %target, "parking edge create until endpoints are acknowledged");
                self.parked_edges.push(mutation);
                return;
            }
        }

        // Detaching an edge whose create is still parked cancels the
        // create outright; nothing ever reached the backend.
        if let Mutation::DeleteEdge { id } = &mutation {
            if id.is_provisional() {
                let before = self.parked_edges.len();
                let id = id.clone();
                self.parked_edges
                    .retain(|m| !matches!(m, Mutation::CreateEdge { id: parked, .. } if *parked == id));
                if self.parked_edges.len() != before {
                    return;
                }
            }
        }

        let key = mutation.key();
        if self.busy.contains(&key) {
            self.coalesce(key, mutation);
        } else {
            self.dispatch(mutation, in_flight);
        }
    }

    fn coalesce(&mut self, key: EntityKey, mutation: Mutation) {
        let queue = self.slots.entry(key).or_default();
        match mutation {
            Mutation::UpdateNode {
                id,
                patch,
                interactive,
            } => {
                if let Some(Mutation::UpdateNode {
                    patch: queued,
                    interactive: queued_interactive,
                    ..
                }) = queue.back_mut()
                {
                    queued.absorb(patch);
                    *queued_interactive |= interactive;
                } else {
                    queue.push_back(Mutation::UpdateNode {
                        id,
                        patch,
                        interactive,
                    });
                }
            }
            Mutation::DeleteNode { id } => {
                // Updates queued behind a delete would only 404.
                queue.retain(|m| !matches!(m, Mutation::UpdateNode { .. }));
                queue.push_back(Mutation::DeleteNode { id });
            }
            other => queue.push_back(other),
        }
    }

    fn dispatch(
        &mut self,
        mutation: Mutation,
        in_flight: &mut FuturesUnordered<BoxFuture<'static, Completion>>,
    ) {
        let key = mutation.key();

        // Mutations against entities the backend never acknowledged have
        // no remote counterpart. Deletes are trivially done; updates are
        // dropped with a warning and local state stands.
        let droppable = match &mutation {
            Mutation::UpdateNode { id, .. } if id.is_provisional() => {
                tracing::warn!(%id, "dropping update for unacknowledged node");
                true
            }
            Mutation::DeleteNode { id } if id.is_provisional() => {
                tracing::debug!(%id, "node was never persisted; delete is local-only");
                true
            }
            Mutation::DeleteEdge { id } if id.is_provisional() => {
                tracing::debug!(%id, "edge was never persisted; delete is local-only");
                true
            }
            _ => false,
        };
        if droppable {
            self.pump(key, in_flight);
            return;
        }

        self.busy.insert(key.clone());
        let backend = Arc::clone(&self.backend);
        let workflow_id = self.workflow_id.clone();
        in_flight.push(Box::pin(async move {
            let result = perform(&*backend, &workflow_id, &mutation).await;
            (key, mutation, result)
        }));
    }

    fn complete(
        &mut self,
        (key, mutation, result): Completion,
        in_flight: &mut FuturesUnordered<BoxFuture<'static, Completion>>,
    ) {
        self.busy.remove(&key);
        let mut next_key = key.clone();

        match (&mutation, result) {
            (Mutation::CreateNode { id: old, .. }, Ok(Outcome::NodeCreated(record))) => {
                let confirmed = match self.model.lock() {
                    Ok(mut model) => model.confirm_node(old, &record),
                    Err(poisoned) => poisoned.into_inner().confirm_node(old, &record),
                };
                if let Some(new) = confirmed {
                    self.aliases.insert(old.clone(), new.clone());
                    let _ = self.events.send(SyncEvent::NodeConfirmed {
                        old: old.clone(),
                        new: new.clone(),
                    });
                    next_key = self.rekey(key, EntityKey::Node(new));
                    self.unpark_edges(in_flight);
                }
            }
            (Mutation::CreateEdge { id: old, .. }, Ok(Outcome::EdgeCreated(record))) => {
                let confirmed = match self.model.lock() {
                    Ok(mut model) => model.confirm_edge(old, &record),
                    Err(poisoned) => poisoned.into_inner().confirm_edge(old, &record),
                };
                if let Some(new) = confirmed {
                    self.aliases.insert(old.clone(), new.clone());
                    let _ = self.events.send(SyncEvent::EdgeConfirmed {
                        old: old.clone(),
                        new: new.clone(),
                    });
                    next_key = self.rekey(key, EntityKey::Edge(new));
                }
            }
            (_, Ok(_)) => {}
            (m, Err(error)) => {
                tracing::error!(mutation = %m.describe(), %error, "persistence call failed");
                if m.interactive() {
                    let _ = self.events.send(SyncEvent::Failed {
                        what: m.describe(),
                        error: error.to_string(),
                    });
                }
                if matches!(m, Mutation::CreateNode { .. } | Mutation::CreateEdge { .. }) {
                    // Everything queued behind a failed create references
                    // an id the backend will never know.
                    if let Some(dropped) = self.slots.remove(&next_key) {
                        for m in &dropped {
                            tracing::warn!(mutation = %m.describe(), "dropped after failed create");
                        }
                    }
                    if let Mutation::CreateNode { id, .. } = m {
                        let id = id.clone();
                        self.parked_edges.retain(|parked| match parked {
                            Mutation::CreateEdge { source, target, .. } => {
                                let touches = *source == id || *target == id;
                                if touches {
                                    tracing::warn!(%source, %target, "dropping parked edge after failed node create");
                                }
                                !touches
                            }
                            _ => true,
                        });
                    }
                }
            }
        }

        self.pump(next_key, in_flight);
    }

    /// Move any queued mutations from the old key to the confirmed one,
    /// re-resolving their ids.
    fn rekey(&mut self, old: EntityKey, new: EntityKey) -> EntityKey {
        if let Some(queue) = self.slots.remove(&old) {
            let remapped = queue
                .into_iter()
                .map(|m| self.resolve_mutation(m))
                .collect();
            self.slots.insert(new.clone(), remapped);
        }
        new
    }

    fn unpark_edges(&mut self, in_flight: &mut FuturesUnordered<BoxFuture<'static, Completion>>) {
        let parked = std::mem::take(&mut self.parked_edges);
        for mutation in parked {
            self.accept(mutation, in_flight);
        }
    }

    fn pump(
        &mut self,
        key: EntityKey,
        in_flight: &mut FuturesUnordered<BoxFuture<'static, Completion>>,
    ) {
        if self.busy.contains(&key) {
            return;
        }
        let next = match self.slots.get_mut(&key) {
            Some(queue) => queue.pop_front(),
            None => return,
        };
        if self
            .slots
            .get(&key)
            .map_or(false, |queue| queue.is_empty())
        {
            self.slots.remove(&key);
        }
        if let Some(mutation) = next {
            self.dispatch(mutation, in_flight);
        }
    }

    fn release_flush_waiters(
        &mut self,
        in_flight: &FuturesUnordered<BoxFuture<'static, Completion>>,
    ) {
        if self.busy.is_empty()
            && in_flight.is_empty()
            && self.slots.is_empty()
            && self.parked_edges.is_empty()
        {
            for waiter in self.flush_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }
}

async fn perform(
    backend: &dyn WorkflowBackend,
    workflow_id: &str,
    mutation: &Mutation,
) -> Result<Outcome, EditorError> {
    match mutation {
        Mutation::CreateNode { draft, .. } => backend
            .create_node(workflow_id, draft)
            .await
            .map(Outcome::NodeCreated),
        Mutation::UpdateNode { id, patch, .. } => {
            let node_id = id.as_assigned().ok_or(EditorError::NotLoaded)?;
            backend
                .update_node(workflow_id, node_id, patch)
                .await
                .map(|_| Outcome::NodeUpdated)
        }
        Mutation::DeleteNode { id } => {
            let node_id = id.as_assigned().ok_or(EditorError::NotLoaded)?;
            backend
                .delete_node(workflow_id, node_id)
                .await
                .map(|_| Outcome::NodeDeleted)
        }
        Mutation::CreateEdge {
            source,
            target,
            condition,
            ..
        } => {
            let draft = EdgeDraft {
                source_node_id: source.as_assigned().ok_or(EditorError::NotLoaded)?.to_string(),
                target_node_id: target.as_assigned().ok_or(EditorError::NotLoaded)?.to_string(),
                condition: condition.clone(),
            };
            backend
                .create_edge(workflow_id, &draft)
                .await
                .map(Outcome::EdgeCreated)
        }
        Mutation::DeleteEdge { id } => {
            let edge_id = id.as_assigned().ok_or(EditorError::NotLoaded)?;
            backend
                .delete_edge(workflow_id, edge_id)
                .await
                .map(|_| Outcome::EdgeDeleted)
        }
    }
}
