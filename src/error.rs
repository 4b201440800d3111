use thiserror::Error;

use crate::document::DocumentError;
use crate::graph::GraphError;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("drawing surface not ready after {0} attempts")]
    SurfaceTimeout(u32),

    #[error("no workflow loaded in this session")]
    NotLoaded,

    #[error(transparent)]
    Document(#[from] DocumentError),
}
