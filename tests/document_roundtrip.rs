use std::collections::BTreeMap;
use std::sync::Arc;

use flowdeck::{
    EditorSession, GraphDocument, InMemoryBackend, NodeKind, NullSurface, WorkflowBackend,
};

async fn authoring_session(name: &str) -> (Arc<InMemoryBackend>, String, EditorSession) {
    let (backend, workflow_id) = InMemoryBackend::with_workflow(name, "");
    let backend = Arc::new(backend);
    let mut session = EditorSession::new(
        &workflow_id,
        Arc::clone(&backend) as Arc<dyn WorkflowBackend>,
        Box::new(NullSurface),
    );
    session.load().await.unwrap();
    (backend, workflow_id, session)
}

#[tokio::test]
async fn exported_documents_round_trip_through_yaml() {
    let (_backend, _workflow_id, mut session) = authoring_session("Pipeline").await;

    let input = session.add_node(NodeKind::Input, 40, 80);
    let llm = session.add_node(NodeKind::Llm, 240, 80);
    let output = session.add_node(NodeKind::Output, 440, 80);
    session.connect(&input.id, &llm.id).unwrap();
    session.connect(&llm.id, &output.id).unwrap();

    let mut config = BTreeMap::new();
    config.insert("model".to_string(), "gpt-4".to_string());
    config.insert("prompt".to_string(), "Summarize {input}".to_string());
    config.insert("temperature".to_string(), "0.2".to_string());
    session.update_node_config(&llm.id, config).unwrap();
    session.flush().await;

    let document = session.export_document();
    let yaml = document.to_yaml_string().expect("failed to serialize document");
    let round_trip = GraphDocument::from_yaml_str(&yaml).expect("failed to parse document");

    assert_eq!(document, round_trip);
    assert_eq!(round_trip.version, "0.1");
    assert_eq!(round_trip.name, "Pipeline");
    assert_eq!(round_trip.nodes.len(), 3);
    assert_eq!(round_trip.edges.len(), 2);
}

#[tokio::test]
async fn importing_recreates_the_graph_with_fresh_ids() {
    let (_backend, _workflow_id, mut session) = authoring_session("Source").await;

    let condition = session.add_node(NodeKind::Condition, 100, 100);
    let yes = session.add_node(NodeKind::Output, 300, 40);
    let no = session.add_node(NodeKind::End, 300, 160);
    session.connect(&condition.id, &yes.id).unwrap();
    session.connect(&condition.id, &no.id).unwrap();
    let mut config = BTreeMap::new();
    config.insert("condition".to_string(), "score > 0.5".to_string());
    session.update_node_config(&condition.id, config).unwrap();
    session.flush().await;

    let document = session.export_document();

    let (backend, target_id, mut target) = authoring_session("Target").await;
    target.import_document(&document).unwrap();
    target.flush().await;

    assert_eq!(target.with_model(|m| m.node_count()), 3);
    assert_eq!(target.with_model(|m| m.edge_count()), 2);
    let imported_config = target.with_model(|m| {
        m.nodes()
            .find(|n| n.kind == NodeKind::Condition)
            .map(|n| n.config.clone())
            .unwrap_or_default()
    });
    assert_eq!(
        imported_config.get("condition").map(String::as_str),
        Some("score > 0.5")
    );

    // The import persisted everything under the target workflow.
    assert_eq!(backend.list_nodes(&target_id).await.unwrap().len(), 3);
    assert_eq!(backend.list_edges(&target_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn documents_with_unknown_kinds_fail_to_import() {
    let (_backend, _workflow_id, mut session) = authoring_session("Target").await;

    let yaml = r#"
version: "0.1"
name: Broken
status: draft
nodes:
  - id: n1
    node_type: subflow
    name: Subflow 1
    x: 0
    y: 0
"#;
    let document = GraphDocument::from_yaml_str(yaml).unwrap();
    assert!(session.import_document(&document).is_err());
}
