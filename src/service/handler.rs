//! Handler capabilities registered on namespaces, and the context they run in.

use std::fmt;

use async_trait::async_trait;

use super::RelayService;
use crate::domain::{ConnectionId, Message, NamespacePath};
use crate::error::RelayError;

/// Handles one named event inside one namespace.
///
/// Registered with [`crate::domain::Namespace::on`]. Handlers run on the
/// sending connection's session task; they may emit and broadcast through
/// the context but must not block.
#[async_trait]
pub trait EventHandler: Send + Sync + fmt::Debug {
    /// Handles `message` sent by the connection in `ctx`.
    ///
    /// # Errors
    ///
    /// Returned errors are logged by the router and never reach the client.
    async fn handle(&self, ctx: &EventContext<'_>, message: Message) -> Result<(), RelayError>;
}

/// Runs when a connection joins a namespace.
#[async_trait]
pub trait ConnectHandler: Send + Sync + fmt::Debug {
    /// Called after the connection in `ctx` is registered.
    ///
    /// # Errors
    ///
    /// Returned errors are logged; the connection stays joined.
    async fn on_connect(&self, ctx: &EventContext<'_>) -> Result<(), RelayError>;
}

/// The connection and namespace an event belongs to, plus the relay to
/// answer through.
#[derive(Debug, Clone)]
pub struct EventContext<'a> {
    relay: &'a RelayService,
    connection: ConnectionId,
    namespace: NamespacePath,
}

impl<'a> EventContext<'a> {
    /// Creates a context for `connection` in `namespace`.
    #[must_use]
    pub const fn new(
        relay: &'a RelayService,
        connection: ConnectionId,
        namespace: NamespacePath,
    ) -> Self {
        Self {
            relay,
            connection,
            namespace,
        }
    }

    /// The relay service.
    #[must_use]
    pub const fn relay(&self) -> &'a RelayService {
        self.relay
    }

    /// The connection that triggered the handler.
    #[must_use]
    pub const fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// The namespace the connection belongs to.
    #[must_use]
    pub const fn namespace(&self) -> &NamespacePath {
        &self.namespace
    }

    /// Sends `message` to the triggering connection only.
    ///
    /// Returns `false` if the connection left in the meantime; that race is
    /// expected and not an error.
    pub async fn reply(&self, message: Message) -> bool {
        match self.relay.emit_to(self.connection, message).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(connection_id = %self.connection, error = %e, "reply not delivered");
                false
            }
        }
    }

    /// Broadcasts `message` to the namespace on behalf of the triggering
    /// connection, applying the relay's sender policy. Returns the number
    /// of local deliveries.
    pub async fn broadcast(&self, message: Message) -> usize {
        self.relay
            .broadcast_from(self.connection, &self.namespace, message)
            .await
    }
}
