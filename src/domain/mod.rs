//! Domain layer: connection identity, namespaces, messages and delivery.
//!
//! Leaves first: [`ConnectionRegistry`] tracks who is connected where,
//! [`NamespaceRouter`] partitions the connection space and routes events
//! to handlers, and [`BroadcastEngine`] delivers messages to one
//! connection or a whole namespace.

pub mod broadcast_engine;
pub mod connection;
pub mod connection_id;
pub mod connection_registry;
pub mod message;
pub mod namespace_path;
pub mod namespace_router;

pub use broadcast_engine::BroadcastEngine;
pub use connection::{Connection, ConnectionEntry, ConnectionHandle, Delivery};
pub use connection_id::ConnectionId;
pub use connection_registry::ConnectionRegistry;
pub use message::{Message, Origin};
pub use namespace_path::NamespacePath;
pub use namespace_router::{Namespace, NamespaceRouter};
