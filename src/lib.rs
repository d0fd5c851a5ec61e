//! # nsrelay
//!
//! Namespaced real-time broadcast relay with optional cross-process
//! fan-out through a publish/subscribe broker.
//!
//! Clients hold a WebSocket and join any number of namespaces over it.
//! Events a client sends are routed to the handler its namespace
//! registered for that event name; handlers reply to the sender or
//! broadcast to the whole namespace. With a broker configured, broadcasts
//! are published to a topic and every relay process bound to that topic
//! delivers them to its own members, so several processes behave as one.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP)
//!     │
//!     ├── WS session (ws/)         REST handlers (api/)
//!     │
//!     ├── RelayService (service/) ── channel handlers (channels/)
//!     │
//!     ├── NamespaceRouter, ConnectionRegistry, BroadcastEngine (domain/)
//!     │
//!     └── BridgeAdapter (bridge/) ── Broker: memory | Redis
//! ```

pub mod api;
pub mod app_state;
pub mod bridge;
pub mod channels;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod ws;
