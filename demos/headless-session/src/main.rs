//! Drives a full editing session against the in-memory backend: place
//! nodes, wire them, configure the LLM step, and trigger an execution.
//!
//! Run with `cargo run` from this directory.

use std::collections::BTreeMap;
use std::sync::Arc;

use flowdeck::{EditorSession, InMemoryBackend, NodeKind, NullSurface, WorkflowBackend};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let (backend, workflow_id) = InMemoryBackend::with_workflow("Demo pipeline", "headless demo");
    let backend = Arc::new(backend);
    let mut session = EditorSession::new(
        &workflow_id,
        Arc::clone(&backend) as Arc<dyn WorkflowBackend>,
        Box::new(NullSurface),
    );
    session.load().await?;

    let input = session.add_node(NodeKind::Input, 40, 120);
    let llm = session.add_node(NodeKind::Llm, 260, 120);
    let branch = session.add_node(NodeKind::Condition, 480, 120);
    let happy = session.add_node(NodeKind::Output, 700, 60);
    let done = session.add_node(NodeKind::End, 700, 180);

    session.connect(&input.id, &llm.id)?;
    session.connect(&llm.id, &branch.id)?;
    session.connect(&branch.id, &happy.id)?;
    session.connect(&branch.id, &done.id)?;

    let mut config = BTreeMap::new();
    config.insert("model".to_string(), "gpt-4".to_string());
    config.insert("prompt".to_string(), "Summarize: {input}".to_string());
    config.insert("temperature".to_string(), "0.3".to_string());
    session.update_node_config(&llm.id, config)?;

    session.flush().await;
    for notice in session.poll_events() {
        println!("notice: {notice}");
    }

    println!(
        "graph: {} nodes, {} edges",
        session.with_model(|m| m.node_count()),
        session.with_model(|m| m.edge_count()),
    );

    let execution = session.execute().await?;
    println!("execution started: {}", execution.id);

    let document = session.export_document();
    println!("--- document ---\n{}", document.to_yaml_string()?);
    Ok(())
}
