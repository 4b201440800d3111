pub mod backend;
pub mod canvas;
pub mod document;
pub mod error;
pub mod forms;
pub mod graph;
pub mod ids;
pub mod registry;
pub mod session;
pub mod sync;

pub use backend::{BackendCalls, HttpBackend, HttpBackendConfig, InMemoryBackend, WorkflowBackend};
pub use canvas::{
    DragState, NullSurface, RecordingHandle, RecordingSurface, Surface, SurfaceOp, Viewport,
    ZOOM_MIN, ZOOM_STEP,
};
pub use document::{DocumentEdge, DocumentError, DocumentNode, GraphDocument};
pub use error::EditorError;
pub use forms::{ConfigForm, FieldIssue, FormControl};
pub use graph::{
    Edge, EdgeDraft, EdgeRecord, ExecutionHandle, GraphError, GraphModel, Node, NodeDraft,
    NodePatch, NodeRecord, PortSide, WorkflowRecord, WorkflowStatus,
};
pub use ids::EntityId;
pub use registry::{FieldDescriptor, FieldKind, NodeKind, PortSpec};
pub use session::{EditorSession, SessionNotice, READINESS_ATTEMPTS, READINESS_INTERVAL};
pub use sync::{Mutation, SyncEvent, SyncQueue};
