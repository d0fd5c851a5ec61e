//! Service layer: orchestration of the relay components.
//!
//! [`RelayService`] implements the transport boundary (`connect`,
//! `handle_event`, `disconnect`) on top of the domain components and
//! forwards broadcasts to the optional [`crate::bridge::BridgeAdapter`].

pub mod handler;
pub mod relay_service;

pub use handler::{ConnectHandler, EventContext, EventHandler};
pub use relay_service::{RelayService, SenderPolicy};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::{RelayService, SenderPolicy};
    use crate::domain::{ConnectionRegistry, NamespaceRouter};

    /// Bare relay with no namespaces, no bridge and the default policy.
    pub(crate) fn relay() -> RelayService {
        RelayService::new(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(NamespaceRouter::new()),
            SenderPolicy::IncludeSender,
        )
    }
}
