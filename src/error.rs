//! Error types used by the crate.

use thiserror::Error;

use crate::renderer::RendererError;

/// Arclink error type.
#[derive(Debug, Error)]
pub enum ArclinkError {
    /// Invalid adapter configuration. Always reported synchronously, at construction.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// I/O error (network failure or non-2xx HTTP status).
    #[error("failed to load data")]
    Io,
    /// A 200 response whose body carried an ArcGIS error envelope.
    #[error("server returned an error: {0}")]
    Server(String),
    /// Item not found.
    #[error("item not found")]
    NotFound,
    /// Operation on an adapter whose source has been removed.
    #[error("adapter has been removed")]
    Removed,
    /// Error serializing request data or decoding a response body.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Error reported by the renderer boundary.
    #[error(transparent)]
    Renderer(#[from] RendererError),
    /// Generic error - details are inside.
    #[error("{0}")]
    Generic(String),
}

impl From<reqwest::Error> for ArclinkError {
    fn from(_value: reqwest::Error) -> Self {
        Self::Io
    }
}
