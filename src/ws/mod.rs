//! WebSocket layer: session loop, frame types, joined-namespace table.
//!
//! The endpoint at `/ws` carries any number of namespace connections over
//! one socket. Clients send `connect`, `event` and `disconnect` frames;
//! the server answers with `connected`, `event`, `disconnected` and
//! `error` frames.

pub mod connection;
pub mod handler;
pub mod joined;
pub mod messages;
