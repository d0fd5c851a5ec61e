//! Broker boundary: the only contract the bridge needs from a pub/sub service.

use std::fmt;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;

use crate::error::RelayError;

/// One raw message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFrame {
    /// Topic the message was published on.
    pub topic: String,
    /// Undecoded payload bytes.
    pub payload: Vec<u8>,
}

/// An active subscription to one broker topic.
///
/// Dropping the subscription ends it.
pub struct Subscription {
    topic: String,
    frames: BoxStream<'static, RemoteFrame>,
}

impl Subscription {
    /// Wraps a frame stream for `topic`.
    #[must_use]
    pub fn new(topic: impl Into<String>, frames: BoxStream<'static, RemoteFrame>) -> Self {
        Self {
            topic: topic.into(),
            frames,
        }
    }

    /// The subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Waits for the next frame. `None` means the broker ended the
    /// subscription (connection lost or broker shut down).
    pub async fn next(&mut self) -> Option<RemoteFrame> {
        self.frames.next().await
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Publish/subscribe broker used to fan messages out across relay
/// processes.
///
/// Implementations:
/// - [`super::MemoryBroker`]: in-process, for single-instance deployments
///   and tests
/// - `RedisBroker`: Redis pub/sub (feature `redis`)
///
/// Delivery and persistence guarantees are whatever the broker provides;
/// the relay assumes none.
#[async_trait]
pub trait Broker: Send + Sync + fmt::Debug {
    /// Subscribes to `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::BrokerUnavailable`] if the broker cannot be
    /// reached.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, RelayError>;

    /// Publishes `payload` to `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::BrokerUnavailable`] if the broker cannot be
    /// reached.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), RelayError>;
}
