//! Error types for the coordination layer
//!
//! Provides unified error handling using thiserror. Benign outcomes (cache
//! miss, lock not acquired, rate limit denied) are values, not errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Coordination Error Enum ==
/// Unified error type for cache, lock and rate limiter operations.
#[derive(Error, Debug)]
pub enum CoordError {
    /// The underlying store could not be reached
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store was reachable but refused the command (wrong type, bad value)
    #[error("Store rejected command: {0}")]
    StoreRejected(String),

    /// A value could not be serialized before storing
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored bytes could not be decoded into the requested type
    #[error("Deserialization failed for key '{key}': {source}")]
    Deserialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Caller passed a parameter outside its valid range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Caller-supplied compute future failed on a cache miss
    #[error("Compute failed: {0}")]
    Compute(#[source] anyhow::Error),
}

impl From<redis::RedisError> for CoordError {
    fn from(err: redis::RedisError) -> Self {
        if err.kind() == redis::ErrorKind::IoError
            || err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            CoordError::StoreUnavailable(err.to_string())
        } else {
            CoordError::StoreRejected(err.to_string())
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CoordError {
    fn into_response(self) -> Response {
        let status = match &self {
            CoordError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoordError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            CoordError::StoreRejected(_)
            | CoordError::Serialization(_)
            | CoordError::Deserialization { .. }
            | CoordError::Compute(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the coordination layer.
pub type Result<T> = std::result::Result<T, CoordError>;
