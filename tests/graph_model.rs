use std::collections::BTreeMap;

use chrono::Utc;
use flowdeck::{
    Edge, EntityId, GraphError, GraphModel, NodeKind, NodeRecord, PortSide,
};

#[test]
fn two_nodes_and_an_edge() {
    let mut model = GraphModel::new("w1");
    let a = model.add_node(NodeKind::Llm, 100, 100);
    let b = model.add_node(NodeKind::Llm, 300, 100);
    let edge = model.add_edge(&a.id, &b.id).expect("edge should connect");

    assert_eq!(model.node_count(), 2);
    assert_eq!(model.edge_count(), 1);
    assert_eq!(edge.source, a.id);
    assert_eq!(edge.target, b.id);
}

#[test]
fn removing_a_node_cascades_its_edges() {
    let mut model = GraphModel::new("w1");
    let start = model.add_node(NodeKind::Start, 0, 0);
    let end = model.add_node(NodeKind::End, 50, 50);
    model.add_edge(&start.id, &end.id).expect("edge should connect");

    let (removed, cascaded) = model.remove_node(&start.id).expect("node exists");
    assert_eq!(removed.id, start.id);
    assert_eq!(cascaded.len(), 1);
    assert_eq!(model.node_count(), 1);
    assert_eq!(model.edge_count(), 0);
    assert!(model.contains_node(&end.id));
}

#[test]
fn cascade_covers_every_touching_edge() {
    let mut model = GraphModel::new("w1");
    let hub = model.add_node(NodeKind::Condition, 0, 0);
    let upstream = model.add_node(NodeKind::Start, 0, 0);
    let down_a = model.add_node(NodeKind::Output, 0, 0);
    let down_b = model.add_node(NodeKind::End, 0, 0);
    model.add_edge(&upstream.id, &hub.id).unwrap();
    model.add_edge(&hub.id, &down_a.id).unwrap();
    model.add_edge(&hub.id, &down_b.id).unwrap();

    model.remove_node(&hub.id).expect("node exists");
    assert!(model
        .edges()
        .iter()
        .all(|e| e.source != hub.id && e.target != hub.id));
    assert_eq!(model.edge_count(), 0);
}

#[test]
fn edges_require_known_endpoints() {
    let mut model = GraphModel::new("w1");
    let a = model.add_node(NodeKind::Llm, 0, 0);
    let ghost = EntityId::assigned("ghost");

    assert!(matches!(
        model.add_edge(&a.id, &ghost),
        Err(GraphError::UnknownNode(_))
    ));
    assert!(matches!(
        model.add_edge(&ghost, &a.id),
        Err(GraphError::UnknownNode(_))
    ));
    assert_eq!(model.edge_count(), 0);
}

#[test]
fn port_arity_is_enforced() {
    let mut model = GraphModel::new("w1");
    let end = model.add_node(NodeKind::End, 0, 0);
    let start = model.add_node(NodeKind::Start, 0, 0);
    let llm = model.add_node(NodeKind::Llm, 0, 0);

    // An end node has no output port, so it can never be a source.
    let err = model.add_edge(&end.id, &llm.id).unwrap_err();
    assert!(matches!(
        err,
        GraphError::PortArity {
            side: PortSide::Output,
            ..
        }
    ));

    // A start node has no input port, so it can never be a target.
    let err = model.add_edge(&llm.id, &start.id).unwrap_err();
    assert!(matches!(
        err,
        GraphError::PortArity {
            side: PortSide::Input,
            ..
        }
    ));
    assert_eq!(model.edge_count(), 0);
}

#[test]
fn duplicate_ordered_pairs_are_rejected() {
    let mut model = GraphModel::new("w1");
    let a = model.add_node(NodeKind::Llm, 0, 0);
    let b = model.add_node(NodeKind::Llm, 0, 0);
    model.add_edge(&a.id, &b.id).unwrap();

    assert!(matches!(
        model.add_edge(&a.id, &b.id),
        Err(GraphError::DuplicateEdge { .. })
    ));
    // The reverse direction is a different ordered pair.
    model.add_edge(&b.id, &a.id).unwrap();
    assert_eq!(model.edge_count(), 2);
}

#[test]
fn name_counter_is_never_reused() {
    let mut model = GraphModel::new("w1");
    let first = model.add_node(NodeKind::Llm, 0, 0);
    let second = model.add_node(NodeKind::Llm, 0, 0);
    assert_eq!(first.name, "LLM 1");
    assert_eq!(second.name, "LLM 2");

    model.remove_node(&second.id).unwrap();
    let third = model.add_node(NodeKind::Script, 0, 0);
    assert_eq!(third.name, "Script 3");
}

#[test]
fn unknown_tags_are_a_no_op() {
    let mut model = GraphModel::new("w1");
    assert!(model.add_node_tagged("subflow", 0, 0).is_none());
    assert!(model.add_node_tagged("scirpt", 0, 0).is_none());
    assert_eq!(model.node_count(), 0);
    assert!(model.add_node_tagged("script", 0, 0).is_some());
}

#[test]
fn confirming_a_node_rewrites_edge_endpoints() {
    let mut model = GraphModel::new("w1");
    let a = model.add_node(NodeKind::Input, 0, 0);
    let b = model.add_node(NodeKind::Output, 0, 0);
    let edge = model.add_edge(&a.id, &b.id).unwrap();
    assert!(a.id.is_provisional());

    let record = NodeRecord {
        id: "41".to_string(),
        workflow_id: "w1".to_string(),
        node_type: "input".to_string(),
        name: a.name.clone(),
        description: String::new(),
        config: BTreeMap::new(),
        position_x: 0,
        position_y: 0,
        created_at: Utc::now(),
    };
    let new = model.confirm_node(&a.id, &record).expect("node exists");
    assert_eq!(new, EntityId::assigned("41"));
    assert!(model.node(&a.id).is_none());
    assert!(model.contains_node(&new));

    let stored = model
        .edges()
        .iter()
        .find(|e| e.id == edge.id)
        .expect("edge survived");
    assert_eq!(stored.source, new);
    assert_eq!(stored.target, b.id);
}

#[test]
fn reconcile_drops_edges_with_missing_endpoints() {
    let mut model = GraphModel::new("w1");
    let a = model.add_node(NodeKind::Llm, 0, 0);
    let b = model.add_node(NodeKind::Llm, 0, 0);
    model.add_edge(&a.id, &b.id).unwrap();

    // Simulate an interrupted cascade: an edge referencing a node the
    // model no longer holds.
    model.insert_edge(Edge {
        id: EntityId::assigned("dangling"),
        workflow_id: "w1".to_string(),
        source: a.id.clone(),
        target: EntityId::assigned("gone"),
        condition: String::new(),
    });

    let removed = model.reconcile();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].id, EntityId::assigned("dangling"));
    assert_eq!(model.edge_count(), 1);
}

#[test]
fn remove_edge_between_takes_the_first_match_only() {
    let mut model = GraphModel::new("w1");
    let a = model.add_node(NodeKind::Llm, 0, 0);
    let b = model.add_node(NodeKind::Llm, 0, 0);
    model.add_edge(&a.id, &b.id).unwrap();

    assert!(model.remove_edge_between(&a.id, &b.id).is_some());
    assert!(model.remove_edge_between(&a.id, &b.id).is_none());
}

#[test]
fn config_writes_keep_only_known_keys() {
    let mut model = GraphModel::new("w1");
    let node = model.add_node(NodeKind::Condition, 0, 0);

    let mut values = BTreeMap::new();
    values.insert("condition".to_string(), "x > 5".to_string());
    values.insert("stray".to_string(), "nope".to_string());
    model.update_node_config(&node.id, values).unwrap();

    let stored = model.node(&node.id).unwrap();
    assert_eq!(stored.config_value("condition"), "x > 5");
    assert!(!stored.config.contains_key("stray"));
    // Reads tolerate keys that were never written.
    assert_eq!(stored.config_value("missing"), "");
}
