//! Live connection storage with namespace membership sets.
//!
//! [`ConnectionRegistry`] owns every [`ConnectionEntry`] and the
//! namespace → members index. Both maps sit behind one
//! [`tokio::sync::RwLock`] so that a connection and its membership are
//! always inserted and removed together: a concurrent reader sees a
//! connection either fully joined or fully gone.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use super::connection::{Connection, ConnectionEntry, ConnectionHandle};
use super::{ConnectionId, NamespacePath};
use crate::error::RelayError;

#[derive(Debug, Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    members: HashMap<NamespacePath, HashSet<ConnectionId>>,
}

/// Central store for all live connections.
///
/// # Concurrency
///
/// - Lookups and membership snapshots take the read lock and may run
///   concurrently.
/// - `register` / `unregister` take the write lock and are serialized.
/// - Invariant: every id in a membership set has exactly one entry, and
///   every entry appears in exactly one membership set.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `connection` as a member of `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DuplicateId`] if a connection with the same id
    /// is already registered (in any namespace).
    pub async fn register(
        &self,
        connection: Connection,
        namespace: NamespacePath,
    ) -> Result<ConnectionId, RelayError> {
        let id = connection.id();
        let mut state = self.state.write().await;
        if state.connections.contains_key(&id) {
            return Err(RelayError::DuplicateId(id));
        }
        state
            .members
            .entry(namespace.clone())
            .or_default()
            .insert(id);
        state
            .connections
            .insert(id, ConnectionEntry::new(connection, namespace));
        Ok(id)
    }

    /// Removes a connection and its namespace membership, returning the
    /// removed entry.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotFound`] if the id is not registered, which
    /// includes a second call for the same id.
    pub async fn unregister(&self, id: ConnectionId) -> Result<ConnectionEntry, RelayError> {
        let mut state = self.state.write().await;
        let entry = state
            .connections
            .remove(&id)
            .ok_or(RelayError::NotFound(id))?;
        if let Some(members) = state.members.get_mut(&entry.namespace) {
            members.remove(&id);
            if members.is_empty() {
                state.members.remove(&entry.namespace);
            }
        }
        Ok(entry)
    }

    /// Returns the ids currently joined to `namespace`. Unknown namespaces
    /// yield an empty set and are not created.
    pub async fn members_of(&self, namespace: &NamespacePath) -> HashSet<ConnectionId> {
        self.state
            .read()
            .await
            .members
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns `(id, handle)` for every member of `namespace` except
    /// `excluding`, taken under a single read lock.
    pub async fn handles_in(
        &self,
        namespace: &NamespacePath,
        excluding: Option<ConnectionId>,
    ) -> Vec<(ConnectionId, ConnectionHandle)> {
        let state = self.state.read().await;
        let Some(members) = state.members.get(namespace) else {
            return Vec::new();
        };
        members
            .iter()
            .filter(|id| Some(**id) != excluding)
            .filter_map(|id| {
                state
                    .connections
                    .get(id)
                    .map(|entry| (*id, entry.handle.clone()))
            })
            .collect()
    }

    /// Returns a clone of the entry for `id`, if registered.
    pub async fn get(&self, id: ConnectionId) -> Option<ConnectionEntry> {
        self.state.read().await.connections.get(&id).cloned()
    }

    /// Returns the namespace `id` belongs to, if registered.
    pub async fn namespace_of(&self, id: ConnectionId) -> Option<NamespacePath> {
        self.state
            .read()
            .await
            .connections
            .get(&id)
            .map(|entry| entry.namespace.clone())
    }

    /// Returns `true` if `id` is registered.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.state.read().await.connections.contains_key(&id)
    }

    /// Returns the number of members in `namespace`.
    pub async fn member_count(&self, namespace: &NamespacePath) -> usize {
        self.state
            .read()
            .await
            .members
            .get(namespace)
            .map_or(0, HashSet::len)
    }

    /// Returns the total number of registered connections.
    pub async fn len(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Returns `true` if no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.connections.is_empty()
    }
}
