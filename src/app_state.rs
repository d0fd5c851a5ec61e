//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::RelayService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Relay service for all connection, routing and delivery logic.
    pub relay: Arc<RelayService>,
    /// Capacity of each WebSocket's outbound queue.
    pub outbound_queue_capacity: usize,
    /// Identifier of this relay process.
    pub instance_id: Arc<str>,
}

impl AppState {
    /// Creates the state shared by every handler.
    #[must_use]
    pub fn new(relay: RelayService, outbound_queue_capacity: usize, instance_id: &str) -> Self {
        Self {
            relay: Arc::new(relay),
            outbound_queue_capacity,
            instance_id: Arc::from(instance_id),
        }
    }
}
