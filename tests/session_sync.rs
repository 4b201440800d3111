use std::collections::BTreeMap;
use std::sync::Arc;

use flowdeck::{
    EditorError, EditorSession, InMemoryBackend, NodeKind, RecordingSurface, SessionNotice,
    SurfaceOp, WorkflowBackend,
};

fn session_over(
    backend: &Arc<InMemoryBackend>,
    workflow_id: &str,
) -> (EditorSession, flowdeck::RecordingHandle) {
    let surface = RecordingSurface::new();
    let handle = surface.handle();
    let session = EditorSession::new(
        workflow_id,
        Arc::clone(backend) as Arc<dyn WorkflowBackend>,
        Box::new(surface),
    );
    (session, handle)
}

#[tokio::test]
async fn optimistic_create_confirms_the_server_id() {
    let (backend, workflow_id) = InMemoryBackend::with_workflow("Test", "");
    let backend = Arc::new(backend);
    let (mut session, surface) = session_over(&backend, &workflow_id);

    let node = session.add_node(NodeKind::Llm, 100, 100);
    assert!(node.id.is_provisional());
    session.flush().await;

    let confirmed = session.with_model(|m| m.nodes().next().map(|n| n.id.clone()));
    let confirmed = confirmed.expect("node still present");
    assert!(!confirmed.is_provisional());

    let ops = surface.ops();
    assert!(ops.contains(&SurfaceOp::Mount(node.id.clone())));
    assert!(ops
        .iter()
        .any(|op| matches!(op, SurfaceOp::Rebind { old, new } if *old == node.id && *new == confirmed)));
}

#[tokio::test]
async fn config_round_trips_through_storage() {
    let (backend, workflow_id) = InMemoryBackend::with_workflow("Test", "");
    let backend = Arc::new(backend);
    let (mut session, _surface) = session_over(&backend, &workflow_id);

    let node = session.add_node(NodeKind::Condition, 10, 20);
    let mut values = BTreeMap::new();
    values.insert("condition".to_string(), "x > 5".to_string());
    session.update_node_config(&node.id, values).unwrap();
    session.flush().await;

    let (mut reloaded, _surface) = session_over(&backend, &workflow_id);
    reloaded.load().await.unwrap();
    let config = reloaded.with_model(|m| {
        m.nodes()
            .next()
            .map(|n| n.config.clone())
            .unwrap_or_default()
    });
    assert_eq!(config.get("condition").map(String::as_str), Some("x > 5"));
}

#[tokio::test]
async fn edges_drawn_against_provisional_nodes_persist_after_confirm() {
    let (backend, workflow_id) = InMemoryBackend::with_workflow("Test", "");
    let backend = Arc::new(backend);
    let (mut session, _surface) = session_over(&backend, &workflow_id);

    let a = session.add_node(NodeKind::Llm, 0, 0);
    let b = session.add_node(NodeKind::Llm, 200, 0);
    // Both endpoints are still provisional; the create must wait for
    // their acknowledgment rather than fail.
    session.connect(&a.id, &b.id).unwrap();
    session.flush().await;

    let edges = backend.list_edges(&workflow_id).await.unwrap();
    assert_eq!(edges.len(), 1);
    let nodes = backend.list_nodes(&workflow_id).await.unwrap();
    let node_ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    assert!(node_ids.contains(&edges[0].source_node_id.as_str()));
    assert!(node_ids.contains(&edges[0].target_node_id.as_str()));

    let all_confirmed =
        session.with_model(|m| m.edges().iter().all(|e| !e.id.is_provisional()));
    assert!(all_confirmed);
}

#[tokio::test]
async fn load_replays_connectors_without_recreating_edges() {
    let (backend, workflow_id) = InMemoryBackend::with_workflow("Test", "");
    let backend = Arc::new(backend);
    let (mut session, _surface) = session_over(&backend, &workflow_id);

    let a = session.add_node(NodeKind::Start, 0, 0);
    let b = session.add_node(NodeKind::End, 200, 0);
    session.connect(&a.id, &b.id).unwrap();
    session.flush().await;
    assert_eq!(backend.calls().edge_creates, 1);

    let (mut reloaded, surface) = session_over(&backend, &workflow_id);
    reloaded.load().await.unwrap();

    assert_eq!(reloaded.with_model(|m| m.node_count()), 2);
    assert_eq!(reloaded.with_model(|m| m.edge_count()), 1);
    // Programmatic reconstruction re-draws, never re-creates.
    assert_eq!(backend.calls().edge_creates, 1);
    assert_eq!(surface.count(|op| matches!(op, SurfaceOp::Connect { .. })), 1);
}

#[tokio::test]
async fn deleting_a_node_cascades_through_storage() {
    let (backend, workflow_id) = InMemoryBackend::with_workflow("Test", "");
    let backend = Arc::new(backend);
    let (mut session, surface) = session_over(&backend, &workflow_id);

    let start = session.add_node(NodeKind::Start, 0, 0);
    let end = session.add_node(NodeKind::End, 50, 50);
    session.connect(&start.id, &end.id).unwrap();
    session.flush().await;

    session.select(&start.id);
    session.delete_node(&start.id).await.unwrap();

    assert_eq!(session.with_model(|m| m.node_count()), 1);
    assert_eq!(session.with_model(|m| m.edge_count()), 0);
    assert_eq!(backend.list_nodes(&workflow_id).await.unwrap().len(), 1);
    assert!(backend.list_edges(&workflow_id).await.unwrap().is_empty());
    assert_eq!(surface.count(|op| matches!(op, SurfaceOp::Unmount(_))), 1);
    assert_eq!(
        surface.count(|op| matches!(op, SurfaceOp::Disconnect { .. })),
        1
    );
    assert!(session.selection().is_none());
}

#[tokio::test]
async fn rapid_position_updates_coalesce_and_settle_deterministically() {
    let (backend, workflow_id) = InMemoryBackend::with_workflow("Test", "");
    let backend = Arc::new(backend);
    let (mut session, _surface) = session_over(&backend, &workflow_id);

    let node = session.add_node(NodeKind::Llm, 10, 10);
    session.flush().await;

    // Two drags in quick succession; per-entity single-flight serializes
    // them, so the final stored position is the later drag's, always.
    session.begin_drag(&node.id, 10.0, 10.0);
    session.end_drag(120.0, 240.0);
    session.begin_drag(&node.id, 120.0, 240.0);
    session.end_drag(300.0, 400.0);
    session.flush().await;

    let (x, y) = session
        .with_model(|m| m.nodes().next().map(|n| (n.x, n.y)))
        .expect("node present");
    assert_eq!((x, y), (300, 400));

    let stored = &backend.list_nodes(&workflow_id).await.unwrap()[0];
    assert_eq!((stored.position_x, stored.position_y), (300, 400));
    assert!(backend.calls().node_updates <= 2);
}

#[tokio::test(start_paused = true)]
async fn load_waits_for_a_slow_surface() {
    let (backend, workflow_id) = InMemoryBackend::with_workflow("Test", "");
    let backend = Arc::new(backend);
    let surface = RecordingSurface::ready_after(3);
    let mut session = EditorSession::new(
        &workflow_id,
        Arc::clone(&backend) as Arc<dyn WorkflowBackend>,
        Box::new(surface),
    );
    session.load().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn load_gives_up_when_the_surface_never_readies() {
    let (backend, workflow_id) = InMemoryBackend::with_workflow("Test", "");
    let backend = Arc::new(backend);
    let surface = RecordingSurface::ready_after(usize::MAX);
    let mut session = EditorSession::new(
        &workflow_id,
        Arc::clone(&backend) as Arc<dyn WorkflowBackend>,
        Box::new(surface),
    );
    match session.load().await {
        Err(EditorError::SurfaceTimeout(attempts)) => assert_eq!(attempts, 10),
        other => panic!("expected surface timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn interactive_failures_surface_a_notice() {
    let backend = Arc::new(InMemoryBackend::new());
    // No such workflow: every create will 404.
    let (mut session, _surface) = session_over(&backend, "999");

    session.add_node(NodeKind::Llm, 0, 0);
    session.flush().await;

    let notices = session.poll_events();
    assert!(notices
        .iter()
        .any(|n| matches!(n, SessionNotice::SyncFailed { .. })));
}

#[tokio::test]
async fn execute_reports_the_run_handle() {
    let (backend, workflow_id) = InMemoryBackend::with_workflow("Test", "");
    let backend = Arc::new(backend);
    let (mut session, _surface) = session_over(&backend, &workflow_id);

    session.add_node(NodeKind::Start, 0, 0);
    let handle = session.execute().await.unwrap();
    assert!(handle.id.starts_with("exec-"));
    assert_eq!(backend.calls().executes, 1);
}

#[tokio::test]
async fn clear_canvas_removes_everything() {
    let (backend, workflow_id) = InMemoryBackend::with_workflow("Test", "");
    let backend = Arc::new(backend);
    let (mut session, _surface) = session_over(&backend, &workflow_id);

    let a = session.add_node(NodeKind::Start, 0, 0);
    let b = session.add_node(NodeKind::Llm, 100, 0);
    let c = session.add_node(NodeKind::End, 200, 0);
    session.connect(&a.id, &b.id).unwrap();
    session.connect(&b.id, &c.id).unwrap();
    session.flush().await;

    session.clear_canvas().await.unwrap();

    assert_eq!(session.with_model(|m| m.node_count()), 0);
    assert_eq!(session.with_model(|m| m.edge_count()), 0);
    assert!(backend.list_nodes(&workflow_id).await.unwrap().is_empty());
    assert!(backend.list_edges(&workflow_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn detaching_a_connection_deletes_the_stored_edge() {
    let (backend, workflow_id) = InMemoryBackend::with_workflow("Test", "");
    let backend = Arc::new(backend);
    let (mut session, _surface) = session_over(&backend, &workflow_id);

    let a = session.add_node(NodeKind::Llm, 0, 0);
    let b = session.add_node(NodeKind::Llm, 100, 0);
    session.connect(&a.id, &b.id).unwrap();
    session.flush().await;
    assert_eq!(backend.list_edges(&workflow_id).await.unwrap().len(), 1);

    session.disconnect(&a.id, &b.id);
    session.flush().await;

    assert_eq!(session.with_model(|m| m.edge_count()), 0);
    assert!(backend.list_edges(&workflow_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn zoom_is_rendering_only() {
    let (backend, workflow_id) = InMemoryBackend::with_workflow("Test", "");
    let backend = Arc::new(backend);
    let (mut session, _surface) = session_over(&backend, &workflow_id);

    session.zoom_out(); // 0.9
    let node = session.drop_from_palette(NodeKind::Llm, 90.0, 45.0);
    // Screen coordinates unscale into canvas units...
    assert_eq!((node.x, node.y), (100, 50));
    session.flush().await;

    // ...and storage holds unscaled units too.
    let stored = &backend.list_nodes(&workflow_id).await.unwrap()[0];
    assert_eq!((stored.position_x, stored.position_y), (100, 50));
}

#[tokio::test]
async fn selection_is_single_and_cleared_by_empty_click() {
    let (backend, workflow_id) = InMemoryBackend::with_workflow("Test", "");
    let backend = Arc::new(backend);
    let (mut session, _surface) = session_over(&backend, &workflow_id);

    let a = session.add_node(NodeKind::Llm, 0, 0);
    let b = session.add_node(NodeKind::Script, 100, 0);
    // add_node selects the newest node.
    assert_eq!(session.selection(), Some(&b.id));

    session.select(&a.id);
    assert_eq!(session.selection(), Some(&a.id));

    session.clear_selection();
    assert!(session.selection().is_none());
    assert!(session.selected_node().is_none());
}
