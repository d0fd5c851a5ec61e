//! WebSocket frame types.
//!
//! One socket multiplexes several namespace connections. Every frame names
//! the namespace it belongs to in `nsp`; a missing `nsp` means the root
//! namespace `"/"`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ConnectionId, Delivery, NamespacePath};

/// Client → server frames.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Join a namespace.
    Connect {
        /// Namespace to join.
        #[serde(default)]
        nsp: NamespacePath,
    },
    /// Send an event to a joined namespace.
    Event {
        /// Namespace the event is addressed to.
        #[serde(default)]
        nsp: NamespacePath,
        /// Event name.
        event: String,
        /// Event payload.
        #[serde(default)]
        data: serde_json::Value,
    },
    /// Leave a namespace.
    Disconnect {
        /// Namespace to leave.
        #[serde(default)]
        nsp: NamespacePath,
    },
}

/// Server → client frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Acknowledges a `connect`.
    Connected {
        /// Joined namespace.
        nsp: NamespacePath,
        /// Connection id assigned for this namespace.
        id: ConnectionId,
    },
    /// A message delivered to the client.
    Event {
        /// Namespace the message was delivered in.
        nsp: NamespacePath,
        /// Event name.
        event: String,
        /// Event payload.
        data: serde_json::Value,
        /// Time the frame left the server.
        timestamp: DateTime<Utc>,
    },
    /// Acknowledges a `disconnect`.
    Disconnected {
        /// Namespace that was left.
        nsp: NamespacePath,
    },
    /// A frame could not be processed.
    Error {
        /// Namespace the failed frame named, when it could be parsed.
        #[serde(skip_serializing_if = "Option::is_none")]
        nsp: Option<NamespacePath>,
        /// HTTP-style status code.
        code: u16,
        /// Human-readable reason.
        message: String,
    },
}

impl ServerFrame {
    /// Builds an `event` frame from a queued delivery.
    #[must_use]
    pub fn from_delivery(delivery: &Delivery) -> Self {
        Self::Event {
            nsp: delivery.namespace.clone(),
            event: delivery.message.event().to_string(),
            data: delivery.message.data().clone(),
            timestamp: Utc::now(),
        }
    }

    /// Builds an `error` frame.
    #[must_use]
    pub fn error(nsp: Option<NamespacePath>, code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            nsp,
            code,
            message: message.into(),
        }
    }

    /// Serializes the frame, logging and returning `None` on failure.
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self)
            .inspect_err(|e| tracing::error!(error = %e, "failed to serialize ws frame"))
            .ok()
    }
}
