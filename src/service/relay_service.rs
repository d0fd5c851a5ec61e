//! Relay service: wires the registry, router, engine and bridge together.

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use super::EventContext;
use crate::bridge::BridgeAdapter;
use crate::domain::{
    BroadcastEngine, Connection, ConnectionId, ConnectionRegistry, Message, NamespacePath,
    NamespaceRouter,
};
use crate::error::RelayError;

/// Whether a connection's own broadcasts are delivered back to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SenderPolicy {
    /// The sender receives its own broadcast like every other member.
    #[default]
    IncludeSender,
    /// The sender is left out of its own broadcast.
    ExcludeSender,
}

/// Orchestration layer for the transport boundary.
///
/// Owns references to [`ConnectionRegistry`] for membership,
/// [`NamespaceRouter`] for handlers, [`BroadcastEngine`] for delivery and
/// an optional [`BridgeAdapter`] for cross-process fan-out. The bridge is
/// injected at construction time; there is no global broker handle.
#[derive(Debug, Clone)]
pub struct RelayService {
    registry: Arc<ConnectionRegistry>,
    router: Arc<NamespaceRouter>,
    engine: BroadcastEngine,
    bridge: Option<Arc<BridgeAdapter>>,
    sender_policy: SenderPolicy,
}

impl RelayService {
    /// Creates a relay without a bridge.
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        router: Arc<NamespaceRouter>,
        sender_policy: SenderPolicy,
    ) -> Self {
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        Self {
            registry,
            router,
            engine,
            bridge: None,
            sender_policy,
        }
    }

    /// Attaches a bridge. The adapter must have been built over
    /// [`Self::engine`] so both paths share one delivery order.
    #[must_use]
    pub fn with_bridge(mut self, bridge: Arc<BridgeAdapter>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Returns the connection registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Returns the namespace router.
    #[must_use]
    pub const fn router(&self) -> &Arc<NamespaceRouter> {
        &self.router
    }

    /// Returns the broadcast engine.
    #[must_use]
    pub const fn engine(&self) -> &BroadcastEngine {
        &self.engine
    }

    /// Returns the bridge, if one is attached.
    #[must_use]
    pub const fn bridge(&self) -> Option<&Arc<BridgeAdapter>> {
        self.bridge.as_ref()
    }

    /// Returns the sender policy.
    #[must_use]
    pub const fn sender_policy(&self) -> SenderPolicy {
        self.sender_policy
    }

    /// `onConnect`: joins `connection` to the namespace at `path`, creating
    /// the namespace if needed, then runs the namespace's connect handlers.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DuplicateId`] if the connection id is already
    /// registered.
    pub async fn connect(
        &self,
        connection: Connection,
        path: &NamespacePath,
    ) -> Result<ConnectionId, RelayError> {
        let namespace = self.router.resolve(path).await;
        let id = self.registry.register(connection, path.clone()).await?;
        tracing::info!(connection_id = %id, namespace = %path, "connection joined");

        let ctx = EventContext::new(self, id, path.clone());
        for handler in namespace.connect_handlers().await {
            if let Err(e) = handler.on_connect(&ctx).await {
                tracing::warn!(connection_id = %id, namespace = %path, error = %e, "connect handler failed");
            }
        }
        Ok(id)
    }

    /// `onEvent`: routes an inbound event from connection `id`.
    ///
    /// Returns `true` if a handler ran and `false` if the namespace has no
    /// handler for `event`, which is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotFound`] if `id` is not registered.
    pub async fn handle_event(
        &self,
        id: ConnectionId,
        event: &str,
        data: serde_json::Value,
    ) -> Result<bool, RelayError> {
        let namespace = self
            .registry
            .namespace_of(id)
            .await
            .ok_or(RelayError::NotFound(id))?;
        let ctx = EventContext::new(self, id, namespace);
        Ok(self.router.dispatch(&ctx, Message::new(event, data)).await)
    }

    /// `onDisconnect`: removes connection `id`, returning the namespace it
    /// left.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotFound`] if `id` is not registered.
    pub async fn disconnect(&self, id: ConnectionId) -> Result<NamespacePath, RelayError> {
        let entry = self.registry.unregister(id).await?;
        tracing::info!(connection_id = %id, namespace = %entry.namespace, "connection left");
        Ok(entry.namespace)
    }

    /// Sends `message` to one connection.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConnectionGone`] or
    /// [`RelayError::SlowConsumer`]; both are races callers may ignore.
    pub async fn emit_to(&self, id: ConnectionId, message: Message) -> Result<(), RelayError> {
        self.engine.emit_to(id, message).await
    }

    /// Broadcasts `message` to local members of `namespace` (minus
    /// `excluding`), then publishes it to the bridge when one is attached.
    ///
    /// Returns the number of local deliveries. Remote instances receive the
    /// message after their broker round-trip, which may land after local
    /// delivery completed here.
    pub async fn broadcast(
        &self,
        namespace: &NamespacePath,
        message: Message,
        excluding: Option<ConnectionId>,
    ) -> usize {
        let message = Arc::new(message);
        let delivered = self
            .engine
            .emit_namespace(namespace, Arc::clone(&message), excluding)
            .await;
        if let Some(bridge) = &self.bridge {
            bridge.publish_local_to_remote(namespace, &message).await;
        }
        delivered
    }

    /// Broadcasts on behalf of `sender`, applying [`SenderPolicy`].
    pub async fn broadcast_from(
        &self,
        sender: ConnectionId,
        namespace: &NamespacePath,
        message: Message,
    ) -> usize {
        let excluding = match self.sender_policy {
            SenderPolicy::IncludeSender => None,
            SenderPolicy::ExcludeSender => Some(sender),
        };
        self.broadcast(namespace, message, excluding).await
    }
}
