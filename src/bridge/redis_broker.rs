//! Redis pub/sub [`Broker`] implementation.
//!
//! Every subscription opens its own pub/sub connection. Publishing goes
//! through one [`ConnectionManager`], created on first publish so that an
//! unreachable Redis surfaces as [`RelayError::BrokerUnavailable`] from the
//! operation that needed it rather than at construction time.

use std::fmt;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::broker::{Broker, RemoteFrame, Subscription};
use crate::error::RelayError;

/// Redis implementation of [`Broker`].
pub struct RedisBroker {
    client: Client,
    url: String,
    publisher: OnceCell<ConnectionManager>,
}

impl RedisBroker {
    /// Creates a broker for `url` (e.g. `redis://localhost:6379`). Does not
    /// connect.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::BrokerUnavailable`] if `url` is not a valid
    /// Redis URL.
    pub fn new(url: &str) -> Result<Self, RelayError> {
        let client = Client::open(url).map_err(unavailable)?;
        Ok(Self {
            client,
            url: url.to_string(),
            publisher: OnceCell::new(),
        })
    }

    async fn publisher(&self) -> Result<ConnectionManager, RelayError> {
        let conn = self
            .publisher
            .get_or_try_init(|| async {
                let conn = ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(unavailable)?;
                info!(url = %self.url, "connected to Redis for publishing");
                Ok::<_, RelayError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}

impl fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBroker")
            .field("url", &self.url)
            .field("publisher_connected", &self.publisher.initialized())
            .finish()
    }
}

fn unavailable(e: redis::RedisError) -> RelayError {
    RelayError::BrokerUnavailable(e.to_string())
}

#[async_trait]
impl Broker for RedisBroker {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, RelayError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(unavailable)?;
        pubsub.subscribe(topic).await.map_err(unavailable)?;
        info!(url = %self.url, topic, "subscribed to Redis channel");

        let frames = pubsub
            .into_on_message()
            .map(|msg| RemoteFrame {
                topic: msg.get_channel_name().to_string(),
                payload: msg.get_payload_bytes().to_vec(),
            })
            .boxed();
        Ok(Subscription::new(topic, frames))
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), RelayError> {
        let mut conn = self.publisher().await?;
        let receivers: i64 = conn.publish(topic, payload).await.map_err(unavailable)?;
        debug!(topic, receivers, "published to Redis channel");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use super::*;

    // Nothing listens on port 1, so connects are refused at once.
    const UNREACHABLE: &str = "redis://127.0.0.1:1/";

    #[test]
    fn invalid_url_is_unavailable() {
        let err = assert_err!(RedisBroker::new("not a url"));
        assert!(matches!(err, RelayError::BrokerUnavailable(_)));
    }

    #[test]
    fn construction_does_not_connect() {
        let broker = assert_ok!(RedisBroker::new(UNREACHABLE));
        assert!(format!("{broker:?}").contains("publisher_connected: false"));
    }

    #[tokio::test]
    async fn subscribe_to_unreachable_server_is_unavailable() {
        let broker = assert_ok!(RedisBroker::new(UNREACHABLE));
        let Ok(result) = tokio::time::timeout(Duration::from_secs(10), broker.subscribe("chat")).await
        else {
            panic!("subscribe did not fail in time");
        };
        assert!(matches!(assert_err!(result), RelayError::BrokerUnavailable(_)));
    }

    #[tokio::test]
    async fn publish_to_unreachable_server_is_unavailable() {
        let broker = assert_ok!(RedisBroker::new(UNREACHABLE));
        let Ok(result) =
            tokio::time::timeout(Duration::from_secs(10), broker.publish("chat", b"x".to_vec())).await
        else {
            panic!("publish did not fail in time");
        };
        assert!(matches!(assert_err!(result), RelayError::BrokerUnavailable(_)));
    }
}
