//! Relay error types with HTTP status code mapping.
//!
//! [`RelayError`] is the central error type for the relay. Connection-level
//! variants (`ConnectionGone`, `SlowConsumer`) are expected races and are
//! swallowed by the broadcast path; broker-level variants are surfaced to
//! logs and bridge counters. Each variant also maps to an HTTP status code
//! and structured JSON error response for the REST surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::ConnectionId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2002,
///     "message": "connection gone: 1b4e28ba-2fa1-11d2-883f-0016d3cca427"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see [`RelayError::error_code`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Relay error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category              | HTTP Status                  |
/// |-----------|-----------------------|------------------------------|
/// | 1000–1999 | Validation / payload  | 400 Bad Request              |
/// | 2000–2999 | State / Not Found     | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server / Broker       | 500 / 503                    |
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A connection with this id is already registered.
    #[error("duplicate connection id: {0}")]
    DuplicateId(ConnectionId),

    /// No connection with this id is registered.
    #[error("connection not found: {0}")]
    NotFound(ConnectionId),

    /// The target connection is no longer registered or its transport closed.
    #[error("connection gone: {0}")]
    ConnectionGone(ConnectionId),

    /// The connection's outbound queue is full; the delivery was dropped.
    #[error("outbound queue full for connection {0}")]
    SlowConsumer(ConnectionId),

    /// The pub/sub broker could not be reached.
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// A payload received from the broker could not be decoded.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A topic or namespace is already bound to a different counterpart.
    #[error("bridge binding conflict: {0}")]
    TopicConflict(String),

    /// No namespace has been resolved at this path.
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    /// The topic has no active binding.
    #[error("topic not bound: {0}")]
    NotBound(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::MalformedPayload(_) => 1002,
            Self::NotFound(_) => 2001,
            Self::ConnectionGone(_) => 2002,
            Self::DuplicateId(_) => 2003,
            Self::TopicConflict(_) => 2004,
            Self::NotBound(_) => 2005,
            Self::NamespaceNotFound(_) => 2006,
            Self::Internal(_) => 3000,
            Self::BrokerUnavailable(_) => 3001,
            Self::SlowConsumer(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_)
            | Self::ConnectionGone(_)
            | Self::NotBound(_)
            | Self::NamespaceNotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateId(_) | Self::TopicConflict(_) => StatusCode::CONFLICT,
            Self::BrokerUnavailable(_) | Self::SlowConsumer(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for per-connection races that a sender should ignore.
    #[must_use]
    pub const fn is_connection_race(&self) -> bool {
        matches!(self, Self::ConnectionGone(_) | Self::SlowConsumer(_))
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
