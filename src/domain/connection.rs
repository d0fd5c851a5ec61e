//! Connections and their transport handles.
//!
//! The relay never touches sockets directly. A [`ConnectionHandle`] is the
//! sending half of a bounded queue drained by whatever transport owns the
//! client (the WebSocket session in production, a plain receiver in tests).
//! Several connections may share one handle when a single socket joins
//! several namespaces; each [`Delivery`] names its target connection and
//! namespace so the transport can frame it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{ConnectionId, Message, NamespacePath};
use crate::error::RelayError;

/// One message queued for one connection.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Target connection.
    pub connection: ConnectionId,
    /// Namespace the target connection belongs to.
    pub namespace: NamespacePath,
    /// Shared, immutable message body.
    pub message: Arc<Message>,
}

/// Sending side of a transport's outbound queue.
///
/// Queue order is delivery order, which gives per-destination FIFO.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<Delivery>,
}

impl ConnectionHandle {
    /// Wraps an existing sender.
    #[must_use]
    pub const fn new(tx: mpsc::Sender<Delivery>) -> Self {
        Self { tx }
    }

    /// Creates a handle and the matching receiver. A zero capacity is
    /// raised to one.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Enqueues a delivery without waiting.
    ///
    /// # Errors
    ///
    /// - [`RelayError::ConnectionGone`] if the transport dropped its receiver.
    /// - [`RelayError::SlowConsumer`] if the queue is full; the delivery is
    ///   dropped.
    pub fn send(&self, delivery: Delivery) -> Result<(), RelayError> {
        match self.tx.try_send(delivery) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(d)) => Err(RelayError::SlowConsumer(d.connection)),
            Err(TrySendError::Closed(d)) => Err(RelayError::ConnectionGone(d.connection)),
        }
    }

    /// Returns `true` once the transport has dropped its receiver.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A client session about to join a namespace.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    handle: ConnectionHandle,
}

impl Connection {
    /// Creates a connection with a fresh random id.
    #[must_use]
    pub fn new(handle: ConnectionHandle) -> Self {
        Self::with_id(ConnectionId::new(), handle)
    }

    /// Creates a connection with a caller-chosen id.
    #[must_use]
    pub const fn with_id(id: ConnectionId, handle: ConnectionHandle) -> Self {
        Self { id, handle }
    }

    /// Returns the connection id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the transport handle.
    #[must_use]
    pub const fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }
}

/// Registry record for a joined connection.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    /// Connection id.
    pub id: ConnectionId,
    /// Owning namespace.
    pub namespace: NamespacePath,
    /// Transport handle.
    pub handle: ConnectionHandle,
    /// Join timestamp.
    pub connected_at: DateTime<Utc>,
}

impl ConnectionEntry {
    /// Builds an entry for `connection` joined to `namespace` now.
    #[must_use]
    pub fn new(connection: Connection, namespace: NamespacePath) -> Self {
        Self {
            id: connection.id,
            namespace,
            handle: connection.handle,
            connected_at: Utc::now(),
        }
    }
}
