//! Per-socket table of joined namespaces.
//!
//! Each namespace a socket joins gets its own [`ConnectionId`]; the table
//! maps namespaces back to those ids and filters stale deliveries.

use std::collections::HashMap;

use crate::domain::{ConnectionId, Delivery, NamespacePath};

/// Namespaces joined by a single WebSocket, at most one connection each.
#[derive(Debug, Default)]
pub struct JoinedNamespaces {
    by_namespace: HashMap<NamespacePath, ConnectionId>,
}

impl JoinedNamespaces {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `id` as this socket's connection in `namespace`.
    ///
    /// Returns `false` without changing anything if the namespace is
    /// already joined.
    pub fn join(&mut self, namespace: NamespacePath, id: ConnectionId) -> bool {
        if self.by_namespace.contains_key(&namespace) {
            return false;
        }
        self.by_namespace.insert(namespace, id);
        true
    }

    /// Forgets the connection in `namespace`, returning its id.
    pub fn leave(&mut self, namespace: &NamespacePath) -> Option<ConnectionId> {
        self.by_namespace.remove(namespace)
    }

    /// Returns this socket's connection in `namespace`.
    #[must_use]
    pub fn connection_in(&self, namespace: &NamespacePath) -> Option<ConnectionId> {
        self.by_namespace.get(namespace).copied()
    }

    /// Returns `true` if `delivery` targets a connection this socket still
    /// holds. Deliveries queued before a `disconnect` fail this check.
    #[must_use]
    pub fn accepts(&self, delivery: &Delivery) -> bool {
        self.connection_in(&delivery.namespace) == Some(delivery.connection)
    }

    /// Returns the number of joined namespaces.
    #[must_use]
    pub fn count(&self) -> usize {
        self.by_namespace.len()
    }

    /// Empties the table, returning every connection id it held.
    pub fn drain(&mut self) -> Vec<ConnectionId> {
        self.by_namespace.drain().map(|(_, id)| id).collect()
    }
}
