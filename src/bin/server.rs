//! In-memory reference backend for local development.
//!
//! The real persistence service is an external collaborator; this binary
//! exists so the editor and demos have something to talk to. It speaks
//! the same REST surface: assigns ids on create, echoes node config
//! opaquely, and never cascades deletes; edge cleanup is the client's
//! responsibility.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use clap::Parser;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flowdeck::{
    EdgeDraft, EdgeRecord, EditorError, ExecutionHandle, InMemoryBackend, NodeDraft, NodePatch,
    NodeRecord, WorkflowBackend, WorkflowRecord,
};

#[derive(Debug, Parser)]
#[command(
    name = "flowdeck-server",
    about = "In-memory reference backend for the flowdeck editor"
)]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// Seed a sample workflow (start -> llm -> end) on startup.
    #[arg(long)]
    seed: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let backend = Arc::new(InMemoryBackend::new());

    if args.seed {
        match seed_sample(&backend).await {
            Ok(id) => tracing::info!(workflow = %id, "seeded sample workflow"),
            Err(e) => tracing::error!(error = %e, "failed to seed sample workflow"),
        }
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/workflows", get(list_workflows).post(create_workflow))
        .route("/workflows/{id}", get(get_workflow).put(update_workflow))
        .route("/workflows/{id}/nodes", get(list_nodes).post(create_node))
        .route(
            "/workflows/{id}/nodes/{node_id}",
            put(update_node).delete(delete_node),
        )
        .route("/workflows/{id}/edges", get(list_edges).post(create_edge))
        .route("/workflows/{id}/edges/{edge_id}", delete(delete_edge))
        .route("/workflows/{id}/execute", post(execute_workflow));

    let app = Router::new()
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(backend);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn seed_sample(backend: &Arc<InMemoryBackend>) -> Result<String, EditorError> {
    let workflow = backend.create_workflow("Sample Workflow", "Seeded by --seed");
    let mut previous: Option<String> = None;
    for (node_type, name, x) in [
        ("start", "Start", 60),
        ("llm", "Summarize", 320),
        ("end", "End", 580),
    ] {
        let node = backend
            .create_node(
                &workflow.id,
                &NodeDraft {
                    workflow_id: workflow.id.clone(),
                    node_type: node_type.to_string(),
                    name: name.to_string(),
                    description: String::new(),
                    config: Default::default(),
                    position_x: x,
                    position_y: 120,
                    created_at: Utc::now(),
                },
            )
            .await?;
        if let Some(source) = previous {
            backend
                .create_edge(
                    &workflow.id,
                    &EdgeDraft {
                        source_node_id: source,
                        target_node_id: node.id.clone(),
                        condition: String::new(),
                    },
                )
                .await?;
        }
        previous = Some(node.id);
    }
    Ok(workflow.id)
}

struct ApiError(EditorError);

impl From<EditorError> for ApiError {
    fn from(error: EditorError) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            EditorError::Backend { status, message } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                message,
            ),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type Backend = Arc<InMemoryBackend>;

#[derive(Debug, Deserialize)]
struct CreateWorkflowRequest {
    name: String,
    #[serde(default)]
    description: String,
}

async fn list_workflows(State(backend): State<Backend>) -> Json<Vec<WorkflowRecord>> {
    Json(backend.list_workflows())
}

async fn create_workflow(
    State(backend): State<Backend>,
    Json(req): Json<CreateWorkflowRequest>,
) -> (StatusCode, Json<WorkflowRecord>) {
    let record = backend.create_workflow(req.name, req.description);
    (StatusCode::CREATED, Json(record))
}

async fn get_workflow(
    State(backend): State<Backend>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowRecord>, ApiError> {
    Ok(Json(backend.fetch_workflow(&id).await?))
}

async fn update_workflow(
    State(backend): State<Backend>,
    Path(id): Path<String>,
    Json(mut record): Json<WorkflowRecord>,
) -> Result<Json<WorkflowRecord>, ApiError> {
    record.id = id;
    Ok(Json(backend.update_workflow(&record).await?))
}

async fn list_nodes(
    State(backend): State<Backend>,
    Path(id): Path<String>,
) -> Result<Json<Vec<NodeRecord>>, ApiError> {
    Ok(Json(backend.list_nodes(&id).await?))
}

async fn create_node(
    State(backend): State<Backend>,
    Path(id): Path<String>,
    Json(draft): Json<NodeDraft>,
) -> Result<(StatusCode, Json<NodeRecord>), ApiError> {
    let record = backend.create_node(&id, &draft).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_node(
    State(backend): State<Backend>,
    Path((id, node_id)): Path<(String, String)>,
    Json(patch): Json<NodePatch>,
) -> Result<Json<NodeRecord>, ApiError> {
    Ok(Json(backend.update_node(&id, &node_id, &patch).await?))
}

async fn delete_node(
    State(backend): State<Backend>,
    Path((id, node_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    backend.delete_node(&id, &node_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_edges(
    State(backend): State<Backend>,
    Path(id): Path<String>,
) -> Result<Json<Vec<EdgeRecord>>, ApiError> {
    Ok(Json(backend.list_edges(&id).await?))
}

async fn create_edge(
    State(backend): State<Backend>,
    Path(id): Path<String>,
    Json(draft): Json<EdgeDraft>,
) -> Result<(StatusCode, Json<EdgeRecord>), ApiError> {
    let record = backend.create_edge(&id, &draft).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn delete_edge(
    State(backend): State<Backend>,
    Path((id, edge_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    backend.delete_edge(&id, &edge_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn execute_workflow(
    State(backend): State<Backend>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionHandle>, ApiError> {
    Ok(Json(backend.execute(&id).await?))
}
