//! Wire format for messages crossing the broker.

use serde::{Deserialize, Serialize};

use crate::domain::Message;
use crate::error::RelayError;

/// JSON envelope published to broker topics.
///
/// ```json
/// {"origin":"5f0c…","event":"a message","data":{"msg":"hi"}}
/// ```
///
/// `origin` is the publishing relay's instance id; a relay discards
/// envelopes carrying its own id because it already delivered them locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEnvelope {
    /// Instance id of the publishing relay.
    pub origin: String,
    /// Event name.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl BridgeEnvelope {
    /// Wraps `message` for publication by instance `origin`.
    #[must_use]
    pub fn from_message(origin: &str, message: &Message) -> Self {
        Self {
            origin: origin.to_string(),
            event: message.event().to_string(),
            data: message.data().clone(),
        }
    }

    /// Serializes the envelope to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Internal`] if the payload cannot be serialized.
    pub fn encode(&self) -> Result<Vec<u8>, RelayError> {
        serde_json::to_vec(self).map_err(|e| RelayError::Internal(e.to_string()))
    }

    /// Parses an envelope from raw broker bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MalformedPayload`] if `raw` is not a JSON
    /// envelope or its event name is empty.
    pub fn decode(raw: &[u8]) -> Result<Self, RelayError> {
        let envelope: Self =
            serde_json::from_slice(raw).map_err(|e| RelayError::MalformedPayload(e.to_string()))?;
        if envelope.event.is_empty() {
            return Err(RelayError::MalformedPayload(
                "empty event name".to_string(),
            ));
        }
        Ok(envelope)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn decode_accepts_missing_data() {
        let env = assert_ok!(BridgeEnvelope::decode(
            br#"{"origin":"a","event":"item"}"#
        ));
        assert_eq!(env.data, json!(null));
    }

    #[test]
    fn decode_rejects_non_json_and_empty_event() {
        assert!(matches!(
            assert_err!(BridgeEnvelope::decode(b"not json")),
            RelayError::MalformedPayload(_)
        ));
        assert!(matches!(
            assert_err!(BridgeEnvelope::decode(br#"{"origin":"a","event":""}"#)),
            RelayError::MalformedPayload(_)
        ));
        assert!(matches!(
            assert_err!(BridgeEnvelope::decode(br#"{"msg":"hi"}"#)),
            RelayError::MalformedPayload(_)
        ));
    }

    #[test]
    fn encoded_message_decodes_to_same_fields() {
        let msg = Message::new("a message", json!({"msg": "hi"}));
        let bytes = assert_ok!(BridgeEnvelope::from_message("node-1", &msg).encode());
        let env = assert_ok!(BridgeEnvelope::decode(&bytes));
        assert_eq!(env.origin, "node-1");
        assert_eq!(env.event, "a message");
        assert_eq!(env.data, json!({"msg": "hi"}));
    }
}
