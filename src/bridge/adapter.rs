//! Bridge between the local broadcast engine and an external broker.
//!
//! Each binding maps one broker topic to one local namespace and moves
//! through `Unbound → Subscribing → Bound → Unsubscribing → Unbound`.
//! A topic has at most one active subscription per process.
//!
//! Loop prevention has two layers:
//! - messages delivered from the broker carry [`Origin::Remote`] and
//!   [`BridgeAdapter::publish_local_to_remote`] refuses them;
//! - envelopes stamped with this instance's id are discarded on receipt,
//!   since the publishing relay already delivered them to its own members.
//!
//! The adapter never retries broker operations. A failed `bind` is
//! returned to the caller, who owns the retry policy (see
//! [`super::bind_with_backoff`]). When the broker ends a subscription the
//! binding stays listed as `Unbound`, publishes for its namespace are
//! counted as `dropped_not_bound`, and the loss is announced on
//! [`BridgeAdapter::lost_bindings`] so the owner can bind again (see
//! [`super::maintain_binding`]).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use utoipa::ToSchema;

use super::broker::{Broker, Subscription};
use super::envelope::BridgeEnvelope;
use crate::domain::{BroadcastEngine, Message, NamespacePath, Origin};
use crate::error::RelayError;

/// Lifecycle of a topic binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BindingState {
    /// No subscription.
    Unbound,
    /// Subscription requested, broker has not acknowledged yet.
    Subscribing,
    /// Subscribed; messages flow both ways.
    Bound,
    /// Subscription being torn down.
    Unsubscribing,
}

/// Public view of one binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct BindingInfo {
    /// Broker topic.
    pub topic: String,
    /// Local namespace.
    #[schema(value_type = String)]
    pub namespace: NamespacePath,
    /// Current state.
    pub state: BindingState,
}

/// Point-in-time copy of the bridge counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct BridgeStatsSnapshot {
    /// Messages published to the broker.
    pub published: u64,
    /// Publishes the broker rejected.
    pub publish_failures: u64,
    /// Publishes dropped because the namespace's binding was not `Bound`.
    pub dropped_not_bound: u64,
    /// Publish attempts refused because the message came from the broker.
    pub refused_republish: u64,
    /// Raw frames received from the broker.
    pub received: u64,
    /// Frames delivered to a local namespace.
    pub forwarded: u64,
    /// Frames discarded because this instance published them.
    pub own_echoes: u64,
    /// Frames discarded because they could not be decoded.
    pub dropped_malformed: u64,
    /// Frames discarded because their topic was not `Bound`.
    pub dropped_unbound_topic: u64,
    /// Subscriptions the broker ended while bound.
    pub subscriptions_lost: u64,
}

#[derive(Debug, Default)]
struct BridgeStats {
    published: AtomicU64,
    publish_failures: AtomicU64,
    dropped_not_bound: AtomicU64,
    refused_republish: AtomicU64,
    received: AtomicU64,
    forwarded: AtomicU64,
    own_echoes: AtomicU64,
    dropped_malformed: AtomicU64,
    dropped_unbound_topic: AtomicU64,
    subscriptions_lost: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl BridgeStats {
    fn snapshot(&self) -> BridgeStatsSnapshot {
        BridgeStatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            dropped_not_bound: self.dropped_not_bound.load(Ordering::Relaxed),
            refused_republish: self.refused_republish.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            own_echoes: self.own_echoes.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            dropped_unbound_topic: self.dropped_unbound_topic.load(Ordering::Relaxed),
            subscriptions_lost: self.subscriptions_lost.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct Binding {
    namespace: NamespacePath,
    state: BindingState,
    pump: Option<JoinHandle<()>>,
}

const LOSS_CAPACITY: usize = 64;

/// Owns this process's broker session and its topic bindings.
#[derive(Debug)]
pub struct BridgeAdapter {
    broker: Arc<dyn Broker>,
    engine: BroadcastEngine,
    instance_id: String,
    bindings: RwLock<HashMap<String, Binding>>,
    stats: BridgeStats,
    losses: broadcast::Sender<BindingInfo>,
}

impl BridgeAdapter {
    /// Creates an adapter that delivers remote messages through `engine`
    /// and stamps outgoing envelopes with `instance_id`.
    #[must_use]
    pub fn new(
        broker: Arc<dyn Broker>,
        engine: BroadcastEngine,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            engine,
            instance_id: instance_id.into(),
            bindings: RwLock::new(HashMap::new()),
            stats: BridgeStats::default(),
            losses: broadcast::channel(LOSS_CAPACITY).0,
        }
    }

    /// Announces every binding the broker ended. Each item carries the
    /// topic and namespace of the lost binding, in state `Unbound`.
    #[must_use]
    pub fn lost_bindings(&self) -> broadcast::Receiver<BindingInfo> {
        self.losses.subscribe()
    }

    /// This relay's instance id.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Binds `topic` to `namespace`: `Unbound → Subscribing`, then
    /// `Subscribing → Bound` once the broker accepts the subscription.
    ///
    /// Binding an already bound or subscribing pair again is a no-op. A
    /// pair whose subscription the broker ended is subscribed again.
    ///
    /// # Errors
    ///
    /// - [`RelayError::BrokerUnavailable`] if the broker refused the
    ///   subscription; the binding returns to `Unbound` (a lost binding
    ///   stays listed in that state).
    /// - [`RelayError::TopicConflict`] if `topic` is bound to another
    ///   namespace, `namespace` is bound to another topic, or the topic is
    ///   still unsubscribing.
    pub async fn bind(
        self: &Arc<Self>,
        namespace: &NamespacePath,
        topic: &str,
    ) -> Result<(), RelayError> {
        let rebinding = {
            let mut bindings = self.bindings.write().await;
            let rebinding = bindings.contains_key(topic);
            if let Some(existing) = bindings.get(topic) {
                if existing.namespace != *namespace {
                    return Err(RelayError::TopicConflict(format!(
                        "topic {topic} is bound to {}",
                        existing.namespace
                    )));
                }
                match existing.state {
                    BindingState::Subscribing | BindingState::Bound => return Ok(()),
                    BindingState::Unsubscribing => {
                        return Err(RelayError::TopicConflict(format!(
                            "topic {topic} is unsubscribing"
                        )));
                    }
                    BindingState::Unbound => {}
                }
            } else if let Some(other) = bindings
                .iter()
                .find(|(_, b)| b.namespace == *namespace)
                .map(|(t, _)| t.clone())
            {
                return Err(RelayError::TopicConflict(format!(
                    "namespace {namespace} is bound to topic {other}"
                )));
            }
            bindings.insert(
                topic.to_string(),
                Binding {
                    namespace: namespace.clone(),
                    state: BindingState::Subscribing,
                    pump: None,
                },
            );
            rebinding
        };

        tracing::info!(topic, namespace = %namespace, rebinding, "bridge subscribing");
        let subscription = match self.broker.subscribe(topic).await {
            Ok(subscription) => subscription,
            Err(e) => {
                let mut bindings = self.bindings.write().await;
                if rebinding {
                    // A lost binding stays listed while its owner retries.
                    if let Some(binding) = bindings.get_mut(topic) {
                        binding.state = BindingState::Unbound;
                    }
                } else {
                    bindings.remove(topic);
                }
                drop(bindings);
                tracing::warn!(topic, namespace = %namespace, error = %e, "bridge subscribe failed");
                return Err(match e {
                    RelayError::BrokerUnavailable(_) => e,
                    other => RelayError::BrokerUnavailable(other.to_string()),
                });
            }
        };

        // Bound before the pump starts, so an immediately ending stream is
        // seen by subscription_lost as a loss.
        let mut bindings = self.bindings.write().await;
        match bindings.get_mut(topic) {
            Some(binding) if binding.state == BindingState::Subscribing => {
                binding.state = BindingState::Bound;
                binding.pump = Some(self.spawn_pump(subscription));
                tracing::info!(topic, namespace = %namespace, "bridge bound");
                Ok(())
            }
            _ => Err(RelayError::NotBound(topic.to_string())),
        }
    }

    /// Unbinds `topic`: `Bound → Unsubscribing → Unbound`. The pump task is
    /// stopped and the broker subscription dropped. A binding the broker
    /// already ended is simply forgotten.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotBound`] if `topic` is neither `Bound` nor a
    /// lost binding.
    pub async fn unbind(&self, topic: &str) -> Result<(), RelayError> {
        let pump = {
            let mut bindings = self.bindings.write().await;
            match bindings.get_mut(topic) {
                Some(binding) if binding.state == BindingState::Bound => {
                    binding.state = BindingState::Unsubscribing;
                    binding.pump.take()
                }
                Some(binding) if binding.state == BindingState::Unbound => {
                    bindings.remove(topic);
                    tracing::info!(topic, "lost bridge binding forgotten");
                    return Ok(());
                }
                _ => return Err(RelayError::NotBound(topic.to_string())),
            }
        };

        if let Some(pump) = pump {
            pump.abort();
            // Cancellation is the expected outcome.
            let _ = pump.await;
        }

        self.bindings.write().await.remove(topic);
        tracing::info!(topic, "bridge unbound");
        Ok(())
    }

    /// Unbinds every bound topic. Called once at process shutdown.
    pub async fn shutdown(&self) {
        let topics: Vec<String> = self
            .bindings
            .read()
            .await
            .iter()
            .filter(|(_, b)| matches!(b.state, BindingState::Bound | BindingState::Unbound))
            .map(|(t, _)| t.clone())
            .collect();
        for topic in topics {
            if let Err(e) = self.unbind(&topic).await {
                tracing::debug!(topic, error = %e, "unbind during shutdown skipped");
            }
        }
    }

    /// Publishes a locally-originated `message` to the topic bound to
    /// `namespace`.
    ///
    /// Best effort: returns `false` and drops the message when it came from
    /// the broker, when the namespace has no `Bound` topic, or when the
    /// broker rejects the publish. Nothing here is fatal to the caller.
    pub async fn publish_local_to_remote(
        &self,
        namespace: &NamespacePath,
        message: &Message,
    ) -> bool {
        if let Origin::Remote { topic } = message.origin() {
            bump(&self.stats.refused_republish);
            tracing::debug!(topic, namespace = %namespace, "not republishing broker message");
            return false;
        }

        let target = self
            .bindings
            .read()
            .await
            .iter()
            .find(|(_, b)| b.namespace == *namespace)
            .map(|(t, b)| (t.clone(), b.state));
        let topic = match target {
            Some((topic, BindingState::Bound)) => topic,
            Some((topic, state)) => {
                bump(&self.stats.dropped_not_bound);
                tracing::debug!(topic, namespace = %namespace, ?state, "binding not bound; bridge publish dropped");
                return false;
            }
            None => {
                tracing::trace!(namespace = %namespace, "namespace not bridged");
                return false;
            }
        };

        let payload = match BridgeEnvelope::from_message(&self.instance_id, message).encode() {
            Ok(payload) => payload,
            Err(e) => {
                bump(&self.stats.publish_failures);
                tracing::warn!(topic, error = %e, "bridge envelope encoding failed");
                return false;
            }
        };

        match self.broker.publish(&topic, payload).await {
            Ok(()) => {
                bump(&self.stats.published);
                true
            }
            Err(e) => {
                bump(&self.stats.publish_failures);
                tracing::warn!(topic, error = %e, "bridge publish failed; message dropped");
                false
            }
        }
    }

    /// Handles one raw frame from the broker.
    ///
    /// Decodes `raw` and delivers it to every member of the namespace bound
    /// to `topic`. Returns the number of local deliveries; envelopes this
    /// instance published, and frames for topics that are not `Bound`, are
    /// dropped with `Ok(0)`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MalformedPayload`] if `raw` does not decode.
    /// The frame is dropped and no connection sees it.
    pub async fn on_remote_message(&self, topic: &str, raw: &[u8]) -> Result<usize, RelayError> {
        bump(&self.stats.received);

        let envelope = match BridgeEnvelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                bump(&self.stats.dropped_malformed);
                tracing::warn!(topic, error = %e, bytes = raw.len(), "malformed bridge payload dropped");
                return Err(e);
            }
        };

        if envelope.origin == self.instance_id {
            bump(&self.stats.own_echoes);
            tracing::trace!(topic, "own bridge echo discarded");
            return Ok(0);
        }

        let namespace = self
            .bindings
            .read()
            .await
            .get(topic)
            .filter(|b| b.state == BindingState::Bound)
            .map(|b| b.namespace.clone());
        let Some(namespace) = namespace else {
            bump(&self.stats.dropped_unbound_topic);
            tracing::debug!(topic, "frame for unbound topic dropped");
            return Ok(0);
        };

        bump(&self.stats.forwarded);
        let message = Message::remote(envelope.event, envelope.data, topic);
        Ok(self.engine.emit_namespace(&namespace, message, None).await)
    }

    /// Current state of `topic`'s binding.
    pub async fn state_of(&self, topic: &str) -> BindingState {
        self.bindings
            .read()
            .await
            .get(topic)
            .map_or(BindingState::Unbound, |b| b.state)
    }

    /// Every binding, sorted by topic.
    pub async fn bindings(&self) -> Vec<BindingInfo> {
        let mut all: Vec<BindingInfo> = self
            .bindings
            .read()
            .await
            .iter()
            .map(|(topic, b)| BindingInfo {
                topic: topic.clone(),
                namespace: b.namespace.clone(),
                state: b.state,
            })
            .collect();
        all.sort_by(|a, b| a.topic.cmp(&b.topic));
        all
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> BridgeStatsSnapshot {
        self.stats.snapshot()
    }

    fn spawn_pump(self: &Arc<Self>, mut subscription: Subscription) -> JoinHandle<()> {
        let adapter: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(frame) = subscription.next().await {
                let Some(adapter) = adapter.upgrade() else {
                    return;
                };
                // Errors are counted and logged inside on_remote_message.
                let _ = adapter.on_remote_message(&frame.topic, &frame.payload).await;
            }
            let topic = subscription.topic().to_string();
            if let Some(adapter) = adapter.upgrade() {
                adapter.subscription_lost(&topic).await;
            }
        })
    }

    async fn subscription_lost(&self, topic: &str) {
        let lost = {
            let mut bindings = self.bindings.write().await;
            match bindings.get_mut(topic) {
                Some(binding) if binding.state == BindingState::Bound => {
                    binding.state = BindingState::Unbound;
                    binding.pump = None;
                    Some(BindingInfo {
                        topic: topic.to_string(),
                        namespace: binding.namespace.clone(),
                        state: BindingState::Unbound,
                    })
                }
                _ => None,
            }
        };
        let Some(lost) = lost else {
            return;
        };

        bump(&self.stats.subscriptions_lost);
        tracing::warn!(topic, namespace = %lost.namespace, "broker ended subscription; binding lost");
        // No listener means nobody rebinds; the loss stays visible in
        // `bindings` and the counters.
        let _ = self.losses.send(lost);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::bridge::{Broker, MemoryBroker, RemoteFrame};
    use crate::domain::{Connection, ConnectionHandle, ConnectionRegistry, Delivery, NamespaceRouter};
    use crate::service::{RelayService, SenderPolicy};

    struct Node {
        relay: RelayService,
        bridge: Arc<BridgeAdapter>,
    }

    fn node(broker: &MemoryBroker, instance: &str) -> Node {
        let relay = RelayService::new(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(NamespaceRouter::new()),
            SenderPolicy::IncludeSender,
        );
        let bridge = Arc::new(BridgeAdapter::new(
            Arc::new(broker.clone()),
            relay.engine().clone(),
            instance,
        ));
        Node {
            relay: relay.with_bridge(Arc::clone(&bridge)),
            bridge,
        }
    }

    async fn join(node: &Node, ns: &str) -> mpsc::Receiver<Delivery> {
        let (handle, rx) = ConnectionHandle::channel(64);
        assert_ok!(node.relay.connect(Connection::new(handle), &ns.into()).await);
        rx
    }

    async fn recv(rx: &mut mpsc::Receiver<Delivery>) -> Delivery {
        let Ok(Some(d)) = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await else {
            panic!("expected a delivery");
        };
        d
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn msg(text: &str) -> Message {
        Message::new("a message", json!({ "msg": text }))
    }

    async fn wait_for_state(bridge: &BridgeAdapter, topic: &str, state: BindingState) {
        for _ in 0..50 {
            if bridge.state_of(topic).await == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{topic} never reached {state:?}");
    }

    /// Accepts every subscription and ends it at once.
    #[derive(Debug)]
    struct EndingBroker;

    #[async_trait::async_trait]
    impl Broker for EndingBroker {
        async fn subscribe(&self, topic: &str) -> Result<Subscription, RelayError> {
            Ok(Subscription::new(
                topic,
                futures_util::stream::empty::<RemoteFrame>().boxed(),
            ))
        }

        async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), RelayError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn bind_moves_to_bound() {
        let broker = MemoryBroker::new(16);
        let a = node(&broker, "a");
        assert_eq!(a.bridge.state_of("chat").await, BindingState::Unbound);

        assert_ok!(a.bridge.bind(&"/chat".into(), "chat").await);
        assert_eq!(a.bridge.state_of("chat").await, BindingState::Bound);
        assert_eq!(broker.subscriber_count("chat").await, 1);

        // Idempotent: no second subscription for the same topic.
        assert_ok!(a.bridge.bind(&"/chat".into(), "chat").await);
        assert_eq!(broker.subscriber_count("chat").await, 1);
    }

    #[tokio::test]
    async fn bind_with_broker_down_is_unavailable_and_stays_unbound() {
        let broker = MemoryBroker::new(16);
        broker.set_available(false);
        let a = node(&broker, "a");

        let err = assert_err!(a.bridge.bind(&"/chat".into(), "chat").await);
        assert!(matches!(err, RelayError::BrokerUnavailable(_)));
        assert_eq!(a.bridge.state_of("chat").await, BindingState::Unbound);

        broker.set_available(true);
        assert_ok!(a.bridge.bind(&"/chat".into(), "chat").await);
    }

    #[tokio::test]
    async fn conflicting_bindings_are_rejected() {
        let broker = MemoryBroker::new(16);
        let a = node(&broker, "a");
        assert_ok!(a.bridge.bind(&"/chat".into(), "chat").await);

        assert!(matches!(
            a.bridge.bind(&"/news".into(), "chat").await,
            Err(RelayError::TopicConflict(_))
        ));
        assert!(matches!(
            a.bridge.bind(&"/chat".into(), "chat-2").await,
            Err(RelayError::TopicConflict(_))
        ));
    }

    #[tokio::test]
    async fn unbind_returns_to_unbound_and_releases_subscription() {
        let broker = MemoryBroker::new(16);
        let a = node(&broker, "a");
        assert_ok!(a.bridge.bind(&"/chat".into(), "chat").await);

        assert_ok!(a.bridge.unbind("chat").await);
        assert_eq!(a.bridge.state_of("chat").await, BindingState::Unbound);
        assert_eq!(broker.subscriber_count("chat").await, 0);
        assert!(matches!(
            a.bridge.unbind("chat").await,
            Err(RelayError::NotBound(_))
        ));

        // The loop closes: the topic can be bound again.
        assert_ok!(a.bridge.bind(&"/chat".into(), "chat").await);
    }

    #[tokio::test]
    async fn publish_while_unbound_is_dropped() {
        let broker = MemoryBroker::new(16);
        let a = node(&broker, "a");
        assert!(!a.bridge.publish_local_to_remote(&"/chat".into(), &msg("x")).await);
        assert_eq!(broker.published_count(), 0);
    }

    #[tokio::test]
    async fn publish_failure_is_not_fatal() {
        let broker = MemoryBroker::new(16);
        let a = node(&broker, "a");
        assert_ok!(a.bridge.bind(&"/chat".into(), "chat").await);
        broker.set_available(false);

        assert!(!a.bridge.publish_local_to_remote(&"/chat".into(), &msg("x")).await);
        assert_eq!(a.bridge.stats().publish_failures, 1);
    }

    #[tokio::test]
    async fn remote_message_reaches_every_local_member() {
        let broker = MemoryBroker::new(16);
        let a = node(&broker, "a");
        assert_ok!(a.bridge.bind(&"/chat".into(), "chat").await);
        let mut m1 = join(&a, "/chat").await;
        let mut m2 = join(&a, "/chat").await;

        let raw = assert_ok!(BridgeEnvelope::from_message("b", &msg("hi")).encode());
        assert_eq!(assert_ok!(a.bridge.on_remote_message("chat", &raw).await), 2);

        for rx in [&mut m1, &mut m2] {
            let d = recv(rx).await;
            assert_eq!(d.message.data()["msg"], "hi");
            assert!(d.message.is_remote());
        }
    }

    #[tokio::test]
    async fn malformed_remote_payload_is_dropped_without_delivery() {
        let broker = MemoryBroker::new(16);
        let a = node(&broker, "a");
        assert_ok!(a.bridge.bind(&"/chat".into(), "chat").await);
        let mut m1 = join(&a, "/chat").await;

        let err = assert_err!(a.bridge.on_remote_message("chat", b"{not json").await);
        assert!(matches!(err, RelayError::MalformedPayload(_)));
        assert!(m1.try_recv().is_err());
        assert_eq!(a.bridge.stats().dropped_malformed, 1);
        assert_eq!(a.bridge.stats().forwarded, 0);
    }

    #[tokio::test]
    async fn frame_for_unbound_topic_is_dropped() {
        let broker = MemoryBroker::new(16);
        let a = node(&broker, "a");
        let raw = assert_ok!(BridgeEnvelope::from_message("b", &msg("hi")).encode());
        assert_eq!(assert_ok!(a.bridge.on_remote_message("chat", &raw).await), 0);
        assert_eq!(a.bridge.stats().dropped_unbound_topic, 1);
    }

    /// Two relays on one topic. A broadcast on `a` reaches `b` exactly once,
    /// `a` discards its own echo, and `b` refuses to publish the remote
    /// message back, so the broker sees a single publish.
    #[tokio::test]
    async fn two_instances_do_not_echo() {
        let broker = MemoryBroker::new(16);
        let a = node(&broker, "a");
        let b = node(&broker, "b");
        assert_ok!(a.bridge.bind(&"/chat".into(), "chat").await);
        assert_ok!(b.bridge.bind(&"/chat".into(), "chat").await);
        let mut on_a = join(&a, "/chat").await;
        let mut on_b = join(&b, "/chat").await;

        let local = a.relay.broadcast(&"/chat".into(), msg("hi"), None).await;
        assert_eq!(local, 1);

        let remote = recv(&mut on_b).await;
        assert!(remote.message.is_remote());
        assert!(!b.bridge.publish_local_to_remote(&"/chat".into(), &remote.message).await);
        settle().await;

        assert_eq!(broker.published_count(), 1);
        assert_eq!(recv(&mut on_a).await.message.data()["msg"], "hi");
        assert!(on_a.try_recv().is_err());
        assert!(on_b.try_recv().is_err());
        assert_eq!(a.bridge.stats().own_echoes, 1);
        assert_eq!(b.bridge.stats().forwarded, 1);
        assert_eq!(b.bridge.stats().refused_republish, 1);
    }

    /// Local members get a broadcast directly; remote members only after the
    /// broker round-trip. Nothing orders the two, so the remote delivery is
    /// only awaited, never assumed to precede or follow local delivery.
    #[tokio::test]
    async fn local_delivery_does_not_wait_for_broker_round_trip() {
        let broker = MemoryBroker::new(16);
        let a = node(&broker, "a");
        let b = node(&broker, "b");
        assert_ok!(a.bridge.bind(&"/chat".into(), "chat").await);
        assert_ok!(b.bridge.bind(&"/chat".into(), "chat").await);
        let mut on_a = join(&a, "/chat").await;
        let mut on_b = join(&b, "/chat").await;

        a.relay.broadcast(&"/chat".into(), msg("first"), None).await;
        assert!(on_a.try_recv().is_ok());

        let remote = recv(&mut on_b).await;
        assert_eq!(remote.message.data()["msg"], "first");
    }

    #[tokio::test]
    async fn remote_messages_keep_publish_order_per_recipient() {
        let broker = MemoryBroker::new(64);
        let a = node(&broker, "a");
        let b = node(&broker, "b");
        assert_ok!(a.bridge.bind(&"/chat".into(), "chat").await);
        assert_ok!(b.bridge.bind(&"/chat".into(), "chat").await);
        let mut on_b = join(&b, "/chat").await;

        for i in 0..10 {
            a.relay
                .broadcast(&"/chat".into(), msg(&i.to_string()), None)
                .await;
        }
        for i in 0..10 {
            assert_eq!(recv(&mut on_b).await.message.data()["msg"], i.to_string());
        }
    }

    #[tokio::test]
    async fn lost_subscription_stays_listed_and_counts_publishes() {
        let broker = MemoryBroker::new(16);
        let a = node(&broker, "a");
        let mut losses = a.bridge.lost_bindings();
        assert_ok!(a.bridge.bind(&"/chat".into(), "chat").await);

        broker.close_topic("chat").await;
        wait_for_state(&a.bridge, "chat", BindingState::Unbound).await;

        let Ok(Ok(lost)) = tokio::time::timeout(Duration::from_secs(1), losses.recv()).await else {
            panic!("loss was not announced");
        };
        assert_eq!(lost.topic, "chat");
        assert_eq!(lost.namespace.as_str(), "/chat");
        assert_eq!(lost.state, BindingState::Unbound);
        assert_eq!(a.bridge.bindings().await, vec![lost]);

        assert!(!a.bridge.publish_local_to_remote(&"/chat".into(), &msg("x")).await);
        let stats = a.bridge.stats();
        assert_eq!(stats.subscriptions_lost, 1);
        assert_eq!(stats.dropped_not_bound, 1);
        assert_eq!(broker.published_count(), 0);

        // Another namespace still cannot take the topic while it is lost.
        assert!(matches!(
            a.bridge.bind(&"/news".into(), "chat").await,
            Err(RelayError::TopicConflict(_))
        ));

        assert_ok!(a.bridge.bind(&"/chat".into(), "chat").await);
        assert_eq!(a.bridge.state_of("chat").await, BindingState::Bound);
        assert!(a.bridge.publish_local_to_remote(&"/chat".into(), &msg("y")).await);
    }

    #[tokio::test]
    async fn failed_rebind_keeps_lost_binding_listed() {
        let broker = MemoryBroker::new(16);
        let a = node(&broker, "a");
        assert_ok!(a.bridge.bind(&"/chat".into(), "chat").await);
        broker.close_topic("chat").await;
        wait_for_state(&a.bridge, "chat", BindingState::Unbound).await;

        broker.set_available(false);
        assert!(matches!(
            a.bridge.bind(&"/chat".into(), "chat").await,
            Err(RelayError::BrokerUnavailable(_))
        ));
        assert_eq!(a.bridge.bindings().await.len(), 1);

        assert_ok!(a.bridge.unbind("chat").await);
        assert!(a.bridge.bindings().await.is_empty());
    }

    #[tokio::test]
    async fn stream_ending_right_after_bind_is_a_loss() {
        let engine = BroadcastEngine::new(Arc::new(ConnectionRegistry::new()));
        let bridge = Arc::new(BridgeAdapter::new(Arc::new(EndingBroker), engine, "a"));

        assert_ok!(bridge.bind(&"/chat".into(), "chat").await);
        wait_for_state(&bridge, "chat", BindingState::Unbound).await;
        assert_eq!(bridge.stats().subscriptions_lost, 1);
        assert_eq!(bridge.bindings().await.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_unbinds_everything() {
        let broker = MemoryBroker::new(16);
        let a = node(&broker, "a");
        assert_ok!(a.bridge.bind(&"/chat".into(), "chat").await);
        assert_ok!(a.bridge.bind(&"/news".into(), "news").await);

        a.bridge.shutdown().await;
        assert!(a.bridge.bindings().await.is_empty());
        assert_eq!(broker.subscriber_count("chat").await, 0);
        assert_eq!(broker.subscriber_count("news").await, 0);
    }
}
