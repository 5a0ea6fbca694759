//! Error types for container operations.

use thiserror::Error;

/// Result type alias for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Errors that can occur while orchestrating containers.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Container engine failure (create, start, remove, exec).
    #[error("engine error: {0}")]
    Engine(String),

    /// Container unknown to the engine.
    #[error("container not found: {0}")]
    NotFound(String),

    /// Container exists but is not running.
    #[error("container not running: {0}")]
    NotRunning(String),

    /// Image inspection or pull failure.
    #[error("image error: {0}")]
    Image(String),

    /// Exec setup or stream failure.
    #[error("exec error: {0}")]
    Exec(String),

    /// Introspection output did not parse.
    #[error("failed to parse interface listing: {0}")]
    Parse(String),

    /// The introspection deadline elapsed.
    #[error("exec deadline exceeded")]
    Deadline,
}

/// True when the engine reported a 404 for the referenced resource.
pub(crate) fn is_engine_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

impl From<bollard::errors::Error> for ContainerError {
    fn from(err: bollard::errors::Error) -> Self {
        Self::Engine(err.to_string())
    }
}
