//! Listener errors and their HTTP rendering.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use notifier::ValidationError;
use thiserror::Error;

/// Failure to run the HTTP server.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listen address could not be bound.
    #[error("could not bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// A request rejected before dispatch.
#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized,
    Invalid(ValidationError),
}

impl From<ValidationError> for ApiError {
    fn from(value: ValidationError) -> Self {
        ApiError::Invalid(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => {
                tracing::warn!("rejected request with missing or wrong ingest token");
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({ "error": "unauthorized" })),
                )
                    .into_response()
            }
            ApiError::Invalid(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({ "error": "invalid_event", "detail": e.to_string() })),
            )
                .into_response(),
        }
    }
}
