//! Gateway Error Types
//!
//! Typed error taxonomy for the connection lifecycle, with Axum integration
//! for the HTTP boundary. Lifecycle errors are deliberately distinguishable
//! so callers can decide whether to retry (`NotReady`) or re-establish
//! (`ConnectionClosed`) instead of parsing transport error strings.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Gateway error type
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Operation attempted before the handshake completed.
    /// Recoverable: retry after a short backoff or wait for the ready signal.
    #[error("connection {0} not ready: handshake incomplete")]
    NotReady(String),

    /// Operation attempted on a closing or closed connection.
    /// Not recoverable for this connection; re-establish a new one.
    #[error("connection {0} is closed")]
    ConnectionClosed(String),

    /// A transition was requested from a state that does not permit it
    /// (e.g. a second `complete_handshake`). Always a protocol bug.
    #[error("connection {connection_id}: cannot {attempted} from state {from}")]
    InvalidState {
        connection_id: String,
        from: &'static str,
        attempted: &'static str,
    },

    /// System-wide connection ceiling reached. Callers should apply
    /// back-pressure rather than queue.
    #[error("connection limit reached ({limit} connections)")]
    ResourceExhausted { limit: usize },

    /// Registry collision on connection ID. Indicates an ID-generation bug;
    /// fatal for this registration attempt.
    #[error("duplicate connection id: {0}")]
    DuplicateConnection(String),

    /// Credential rejected by the authenticator.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// An event addressed to one user was about to be delivered to a
    /// connection owned by another. Security defect, never transient.
    #[error("isolation violation: event for user {expected} targeted a connection owned by user {actual}")]
    IsolationViolation { expected: i64, actual: i64 },

    /// Session store (Redis) failure.
    #[error("store error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Whether the caller may retry against the same connection.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::NotReady(_))
    }
}

impl From<redis::RedisError> for GatewayError {
    fn from(e: redis::RedisError) -> Self {
        GatewayError::Store(e.to_string())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            GatewayError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, 20001, msg.clone()),
            GatewayError::ResourceExhausted { limit } => (
                StatusCode::SERVICE_UNAVAILABLE,
                20002,
                format!("connection limit reached ({})", limit),
            ),
            GatewayError::NotReady(_) => (StatusCode::CONFLICT, 20003, self.to_string()),
            GatewayError::ConnectionClosed(_) => (StatusCode::GONE, 20004, self.to_string()),
            GatewayError::IsolationViolation { .. } => {
                tracing::error!(error = %self, "Isolation violation surfaced at HTTP boundary");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    20000,
                    "Internal server error".into(),
                )
            }
            other => {
                tracing::error!(error = %other, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    20000,
                    "Internal server error".into(),
                )
            }
        };

        let body = ErrorResponse { code, message };

        if status == StatusCode::SERVICE_UNAVAILABLE {
            // Back-pressure hint for rejected connection attempts
            (status, [(header::RETRY_AFTER, "5")], Json(body)).into_response()
        } else {
            (status, Json(body)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(GatewayError::NotReady("c1".into()).is_retryable());
        assert!(!GatewayError::ConnectionClosed("c1".into()).is_retryable());
        assert!(!GatewayError::ResourceExhausted { limit: 10 }.is_retryable());
    }
}
