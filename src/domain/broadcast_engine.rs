//! Fan-out of messages to one connection or a whole namespace.
//!
//! [`BroadcastEngine`] references connections through the
//! [`ConnectionRegistry`] and never owns them. It keeps no message history.
//!
//! # Ordering
//!
//! Emits into a namespace pass through that namespace's sequencing lock
//! and enqueue with a non-blocking `try_send`. A connection belongs to
//! exactly one namespace, so every connection observes messages in the
//! order the emits were issued (per-destination FIFO). Namespaces do not
//! wait on each other, and order across different recipients is
//! unspecified.
//!
//! # Membership races
//!
//! A namespace fan-out works on a snapshot of the membership taken at call
//! time. A connection that joins while the fan-out runs may or may not
//! receive the in-flight message; one that leaves is skipped or fails with
//! `ConnectionGone`, which is swallowed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::connection::Delivery;
use super::{ConnectionId, ConnectionRegistry, Message, NamespacePath};
use crate::error::RelayError;

/// Delivers messages to registered connections.
///
/// Cheap to clone: clones share the registry and the sequencing locks.
#[derive(Debug, Clone)]
pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
    sequencers: Arc<Mutex<HashMap<NamespacePath, Arc<Mutex<()>>>>>,
}

impl BroadcastEngine {
    /// Creates an engine over `registry`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            sequencers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn sequencer_for(&self, namespace: &NamespacePath) -> Arc<Mutex<()>> {
        let mut sequencers = self.sequencers.lock().await;
        Arc::clone(sequencers.entry(namespace.clone()).or_default())
    }

    /// Returns the registry this engine delivers through.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Delivers `message` to exactly one connection.
    ///
    /// # Errors
    ///
    /// - [`RelayError::ConnectionGone`] if `id` is not registered or its
    ///   transport has closed. Senders are expected to ignore this: a
    ///   disconnect racing the emit is normal.
    /// - [`RelayError::SlowConsumer`] if the connection's queue is full.
    pub async fn emit_to(
        &self,
        id: ConnectionId,
        message: impl Into<Arc<Message>>,
    ) -> Result<(), RelayError> {
        let message = message.into();
        let namespace = self
            .registry
            .namespace_of(id)
            .await
            .ok_or(RelayError::ConnectionGone(id))?;
        let sequencer = self.sequencer_for(&namespace).await;
        let _order = sequencer.lock().await;
        let entry = self
            .registry
            .get(id)
            .await
            .ok_or(RelayError::ConnectionGone(id))?;
        entry.handle.send(Delivery {
            connection: id,
            namespace: entry.namespace,
            message,
        })
    }

    /// Delivers `message` to every member of `namespace` present at call
    /// time, except `excluding`.
    ///
    /// Returns the number of connections the message was queued for.
    /// Per-recipient failures (`ConnectionGone`, `SlowConsumer`) are logged
    /// and skipped; they never reach the caller.
    pub async fn emit_namespace(
        &self,
        namespace: &NamespacePath,
        message: impl Into<Arc<Message>>,
        excluding: Option<ConnectionId>,
    ) -> usize {
        let message = message.into();
        let sequencer = self.sequencer_for(namespace).await;
        let _order = sequencer.lock().await;
        let targets = self.registry.handles_in(namespace, excluding).await;

        let mut delivered = 0;
        for (id, handle) in targets {
            let delivery = Delivery {
                connection: id,
                namespace: namespace.clone(),
                message: Arc::clone(&message),
            };
            match handle.send(delivery) {
                Ok(()) => delivered += 1,
                Err(RelayError::SlowConsumer(_)) => {
                    tracing::warn!(
                        connection_id = %id,
                        namespace = %namespace,
                        event = message.event(),
                        "outbound queue full; delivery dropped"
                    );
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %id,
                        namespace = %namespace,
                        error = %e,
                        "skipping departed connection"
                    );
                }
            }
        }

        tracing::trace!(namespace = %namespace, event = message.event(), delivered, "broadcast");
        delivered
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::domain::{Connection, ConnectionHandle};

    struct Member {
        id: ConnectionId,
        rx: mpsc::Receiver<Delivery>,
    }

    async fn join(registry: &ConnectionRegistry, ns: &str) -> Member {
        let (handle, rx) = ConnectionHandle::channel(64);
        let id = assert_ok!(registry.register(Connection::new(handle), ns.into()).await);
        Member { id, rx }
    }

    fn drain(member: &mut Member) -> Vec<String> {
        let mut events = Vec::new();
        while let Ok(d) = member.rx.try_recv() {
            events.push(d.message.data()["msg"].as_str().unwrap_or_default().to_string());
        }
        events
    }

    fn msg(text: &str) -> Message {
        Message::new("a message", json!({ "msg": text }))
    }

    #[tokio::test]
    async fn namespace_emit_reaches_every_member_but_excluded() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let mut a = join(&registry, "/chat").await;
        let mut b = join(&registry, "/chat").await;
        let mut c = join(&registry, "/chat").await;
        let mut outsider = join(&registry, "/news").await;

        let delivered = engine
            .emit_namespace(&"/chat".into(), msg("hi"), Some(a.id))
            .await;

        assert_eq!(delivered, 2);
        assert!(drain(&mut a).is_empty());
        assert_eq!(drain(&mut b), vec!["hi"]);
        assert_eq!(drain(&mut c), vec!["hi"]);
        assert!(drain(&mut outsider).is_empty());
    }

    #[tokio::test]
    async fn namespace_emit_without_exclusion_includes_everyone() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let mut a = join(&registry, "/chat").await;
        let mut b = join(&registry, "/chat").await;

        assert_eq!(engine.emit_namespace(&"/chat".into(), msg("all"), None).await, 2);
        assert_eq!(drain(&mut a), vec!["all"]);
        assert_eq!(drain(&mut b), vec!["all"]);
    }

    #[tokio::test]
    async fn emits_to_one_connection_arrive_in_call_order() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let mut a = join(&registry, "/chat").await;

        assert_ok!(engine.emit_to(a.id, msg("m1")).await);
        assert_ok!(engine.emit_to(a.id, msg("m2")).await);
        engine.emit_namespace(&"/chat".into(), msg("m3"), None).await;
        assert_ok!(engine.emit_to(a.id, msg("m4")).await);

        assert_eq!(drain(&mut a), vec!["m1", "m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn busy_namespace_does_not_stall_another() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let mut reader = join(&registry, "/news").await;
        let chatter = join(&registry, "/chat").await;

        let chat = engine.sequencer_for(&"/chat".into()).await;
        let _held = chat.lock().await;

        let news = tokio::time::timeout(
            std::time::Duration::from_millis(500),
            engine.emit_namespace(&"/news".into(), msg("item"), None),
        )
        .await;
        assert_eq!(news.ok(), Some(1));
        assert_eq!(drain(&mut reader), vec!["item"]);

        let chat_emit = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            engine.emit_to(chatter.id, msg("blocked")),
        )
        .await;
        assert!(chat_emit.is_err(), "/chat emits wait for the /chat sequencer");
    }

    #[tokio::test]
    async fn emit_to_unknown_connection_is_connection_gone() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(registry);
        let ghost = ConnectionId::new();
        let err = assert_err!(engine.emit_to(ghost, msg("x")).await);
        assert!(matches!(err, RelayError::ConnectionGone(id) if id == ghost));
    }

    #[tokio::test]
    async fn closed_transport_is_skipped_during_fan_out() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let gone = join(&registry, "/chat").await;
        let mut alive = join(&registry, "/chat").await;
        let gone_id = gone.id;
        drop(gone.rx);

        assert_eq!(engine.emit_namespace(&"/chat".into(), msg("hi"), None).await, 1);
        assert_eq!(drain(&mut alive), vec!["hi"]);

        let err = assert_err!(engine.emit_to(gone_id, msg("late")).await);
        assert!(err.is_connection_race());
    }

    #[tokio::test]
    async fn full_queue_drops_only_for_that_recipient() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let (handle, mut slow_rx) = ConnectionHandle::channel(1);
        assert_ok!(registry.register(Connection::new(handle), "/chat".into()).await);
        let mut fast = join(&registry, "/chat").await;

        assert_eq!(engine.emit_namespace(&"/chat".into(), msg("one"), None).await, 2);
        assert_eq!(engine.emit_namespace(&"/chat".into(), msg("two"), None).await, 1);

        assert_eq!(drain(&mut fast), vec!["one", "two"]);
        let Ok(first) = slow_rx.try_recv() else {
            panic!("slow consumer should hold the first message");
        };
        assert_eq!(first.message.data()["msg"], "one");
        assert!(slow_rx.try_recv().is_err());
    }

    /// Joins racing a fan-out may or may not see the in-flight message.
    /// This is an accepted race: the assertion is only that no joiner sees
    /// it twice, and that members present before the emit always see it.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn join_during_fan_out_may_or_may_not_observe_message() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let mut early = join(&registry, "/chat").await;

        let joiners = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let mut members = Vec::new();
                for _ in 0..32 {
                    members.push(join(&registry, "/chat").await);
                }
                members
            })
        };
        let emitted = engine.emit_namespace(&"/chat".into(), msg("race"), None).await;

        let Ok(mut late) = joiners.await else {
            panic!("joiner task panicked");
        };
        let per_joiner: Vec<usize> = late.iter_mut().map(|m| drain(m).len()).collect();
        let late_received: usize = per_joiner.iter().sum();

        assert_eq!(drain(&mut early), vec!["race"]);
        assert!(per_joiner.iter().all(|n| *n <= 1));
        assert_eq!(emitted, 1 + late_received);
    }

    #[tokio::test]
    async fn leaver_stops_receiving() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let mut a = join(&registry, "/chat").await;
        let mut b = join(&registry, "/chat").await;

        engine.emit_namespace(&"/chat".into(), msg("before"), None).await;
        assert_ok!(registry.unregister(b.id).await);
        engine.emit_namespace(&"/chat".into(), msg("after"), None).await;

        assert_eq!(drain(&mut a), vec!["before", "after"]);
        assert_eq!(drain(&mut b), vec!["before"]);
    }
}
