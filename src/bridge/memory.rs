//! In-process broker over `tokio::sync::broadcast`.
//!
//! Each topic is a broadcast channel. Like Redis, a publisher that is also
//! subscribed to the topic receives its own messages back.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::{Mutex, broadcast};

use super::broker::{Broker, RemoteFrame, Subscription};
use crate::error::RelayError;

#[derive(Debug)]
struct Inner {
    topics: Mutex<HashMap<String, broadcast::Sender<RemoteFrame>>>,
    capacity: usize,
    available: AtomicBool,
    published: AtomicU64,
}

/// In-memory [`Broker`].
///
/// Clones share the same topics, so several [`super::BridgeAdapter`]s in
/// one process can be wired to one broker to behave like separate relay
/// instances. When a subscriber falls more than `capacity` frames behind,
/// the oldest frames are skipped for it.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    /// Creates a broker whose topics buffer up to `capacity` frames.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
                available: AtomicBool::new(true),
                published: AtomicU64::new(0),
            }),
        }
    }

    /// Simulates the broker going away (`false`) or coming back (`true`).
    /// While unavailable, `subscribe` and `publish` fail with
    /// [`RelayError::BrokerUnavailable`]. Existing subscriptions stay open.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Ends every subscription on `topic`, the way a broker does when it
    /// drops a connection. Later subscribes open the topic afresh.
    pub async fn close_topic(&self, topic: &str) {
        if self.inner.topics.lock().await.remove(topic).is_some() {
            tracing::debug!(topic, "memory broker topic closed");
        }
    }

    /// Total number of successful publishes.
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.inner.published.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions on `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .lock()
            .await
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn ensure_available(&self) -> Result<(), RelayError> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RelayError::BrokerUnavailable(
                "memory broker is offline".to_string(),
            ))
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, RelayError> {
        self.ensure_available()?;
        let rx = {
            let mut topics = self.inner.topics.lock().await;
            topics
                .entry(topic.to_string())
                .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
                .subscribe()
        };

        let topic_name = topic.to_string();
        let frames = stream::unfold(rx, move |mut rx| {
            let topic_name = topic_name.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(frame) => return Some((frame, rx)),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(topic = %topic_name, lagged = n, "memory broker subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        })
        .boxed();

        Ok(Subscription::new(topic, frames))
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), RelayError> {
        self.ensure_available()?;
        self.inner.published.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = self.inner.topics.lock().await.get(topic) {
            // No subscribers is not an error for a pub/sub broker.
            let _ = tx.send(RemoteFrame {
                topic: topic.to_string(),
                payload,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use super::*;

    async fn next_frame(sub: &mut Subscription) -> RemoteFrame {
        let Ok(Some(frame)) = tokio::time::timeout(Duration::from_secs(1), sub.next()).await else {
            panic!("expected a frame");
        };
        frame
    }

    #[tokio::test]
    async fn subscribers_receive_publishes_including_their_own() {
        let broker = MemoryBroker::new(16);
        let mut a = assert_ok!(broker.subscribe("chat").await);
        let mut b = assert_ok!(broker.clone().subscribe("chat").await);

        assert_ok!(broker.publish("chat", b"hello".to_vec()).await);

        assert_eq!(next_frame(&mut a).await.payload, b"hello");
        let frame = next_frame(&mut b).await;
        assert_eq!(frame.topic, "chat");
        assert_eq!(broker.published_count(), 1);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let broker = MemoryBroker::new(16);
        let mut news = assert_ok!(broker.subscribe("news").await);
        assert_ok!(broker.publish("chat", b"x".to_vec()).await);
        assert_ok!(broker.publish("news", b"y".to_vec()).await);
        assert_eq!(next_frame(&mut news).await.payload, b"y");
    }

    #[tokio::test]
    async fn offline_broker_refuses_operations() {
        let broker = MemoryBroker::new(16);
        broker.set_available(false);
        assert!(matches!(
            assert_err!(broker.subscribe("chat").await),
            RelayError::BrokerUnavailable(_)
        ));
        assert!(matches!(
            assert_err!(broker.publish("chat", Vec::new()).await),
            RelayError::BrokerUnavailable(_)
        ));
        assert_eq!(broker.published_count(), 0);

        broker.set_available(true);
        assert_ok!(broker.subscribe("chat").await);
    }

    #[tokio::test]
    async fn dropping_subscription_releases_receiver() {
        let broker = MemoryBroker::new(16);
        let sub = assert_ok!(broker.subscribe("chat").await);
        assert_eq!(broker.subscriber_count("chat").await, 1);
        drop(sub);
        assert_eq!(broker.subscriber_count("chat").await, 0);
    }

    #[tokio::test]
    async fn closing_topic_ends_its_subscriptions() {
        let broker = MemoryBroker::new(16);
        let mut chat = assert_ok!(broker.subscribe("chat").await);
        let mut news = assert_ok!(broker.subscribe("news").await);

        broker.close_topic("chat").await;
        let Ok(ended) = tokio::time::timeout(Duration::from_secs(1), chat.next()).await else {
            panic!("subscription did not end");
        };
        assert!(ended.is_none());
        assert_eq!(broker.subscriber_count("chat").await, 0);

        assert_ok!(broker.publish("news", b"still here".to_vec()).await);
        assert_eq!(next_frame(&mut news).await.payload, b"still here");

        let mut again = assert_ok!(broker.subscribe("chat").await);
        assert_ok!(broker.publish("chat", b"back".to_vec()).await);
        assert_eq!(next_frame(&mut again).await.payload, b"back");
    }
}
