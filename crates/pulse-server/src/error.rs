//! Error types for the server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Process-level failures that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address does not resolve or cannot be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// The configured listen address.
        address: String,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server terminated with an error.
    #[error("server terminated: {0}")]
    Serve(#[from] std::io::Error),

    /// Storage failed to flush during shutdown.
    #[error("storage shutdown failed: {0}")]
    Shutdown(#[from] pulse_storage::StorageError),
}

/// Request-level failures surfaced to clients.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The metric name is missing.
    #[error("metric name is required")]
    NameRequired,

    /// The metric type is missing or unknown.
    #[error("unsupported metric type")]
    UnsupportedType,

    /// The value text does not parse for the given type.
    #[error(transparent)]
    BadValue(#[from] pulse_proto::ProtoError),

    /// The requested metric does not exist.
    #[error("metric not found")]
    NotFound,

    /// The storage backend failed.
    #[error("storage failure: {0}")]
    Storage(#[from] pulse_storage::StorageError),
}

impl ServiceError {
    /// Maps the error onto the HTTP status the endpoint contract requires.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NameRequired | Self::UnsupportedType | Self::BadValue(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Compact `{"error": ...}` body used by the JSON endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable failure description.
    pub error: String,
}

impl ErrorBody {
    /// Builds a JSON error response with the given status.
    pub fn response(status: StatusCode, message: impl Into<String>) -> Response {
        (
            status,
            [("content-type", "application/json")],
            serde_json::to_string(&Self {
                error: message.into(),
            })
            .unwrap_or_else(|_| r#"{"error":"internal error"}"#.to_string()),
        )
            .into_response()
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        ErrorBody::response(self.status(), self.to_string())
    }
}
