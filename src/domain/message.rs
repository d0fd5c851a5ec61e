//! Relay messages: an event name plus an opaque JSON payload.

use serde::{Deserialize, Serialize};

/// Where a [`Message`] entered this process.
///
/// Not part of the serialized form. Used by the bridge to refuse
/// re-publishing anything that arrived from the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Origin {
    /// Created in this process (client event, handler, REST emit).
    #[default]
    Local,
    /// Delivered by the broker on the given topic.
    Remote {
        /// Broker topic the message arrived on.
        topic: String,
    },
}

/// Immutable event delivered to connections.
///
/// Fields are private; once built a message cannot be altered. Messages are
/// ephemeral: the relay keeps no history after delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(skip)]
    origin: Origin,
}

impl Message {
    /// Creates a locally-originated message.
    #[must_use]
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
            origin: Origin::Local,
        }
    }

    /// Creates a message that arrived from the broker on `topic`.
    #[must_use]
    pub fn remote(event: impl Into<String>, data: serde_json::Value, topic: &str) -> Self {
        Self {
            event: event.into(),
            data,
            origin: Origin::Remote {
                topic: topic.to_string(),
            },
        }
    }

    /// Event name, e.g. `"a message"`.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Structured payload.
    #[must_use]
    pub const fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Where this message entered the process.
    #[must_use]
    pub const fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Returns `true` if the message was delivered by the broker.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self.origin, Origin::Remote { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_is_local() {
        let msg = Message::new("a message", json!({"msg": "hi"}));
        assert_eq!(msg.event(), "a message");
        assert_eq!(msg.data()["msg"], "hi");
        assert!(!msg.is_remote());
    }

    #[test]
    fn remote_keeps_topic() {
        let msg = Message::remote("a message", json!(null), "chat");
        assert_eq!(
            msg.origin(),
            &Origin::Remote {
                topic: "chat".to_string()
            }
        );
    }

    #[test]
    fn origin_is_not_serialized() {
        let msg = Message::remote("item", json!({"news": "x"}), "news");
        let value = serde_json::to_value(&msg).ok();
        assert_eq!(value, Some(json!({"event": "item", "data": {"news": "x"}})));
    }
}
