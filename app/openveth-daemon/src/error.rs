//! API error type and HTTP status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use openveth_container::ContainerError;
use openveth_core::StoreError;
use openveth_net::NetError;
use serde_json::json;
use thiserror::Error;

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by the management API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input, missing fields, or unknown endpoint reference.
    #[error("{0}")]
    BadRequest(String),

    /// Node or link unknown.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate link between the same unordered node pair.
    #[error("{0}")]
    Conflict(String),

    /// Node exists but its container is not running.
    #[error("{0}")]
    Unavailable(String),

    /// Container engine failure.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// Kernel-level plumbing failure.
    #[error(transparent)]
    Net(#[from] NetError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Internal daemon failure (task join, runtime).
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) | Self::Container(ContainerError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) | Self::Container(ContainerError::NotRunning(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Container(_) | Self::Net(_) | Self::Store(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Critical namespace-restore failures carry their own
            // distinguished "critical:" prefix in the message.
            tracing::error!("request failed: {message}");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}
