//! Application namespaces served by the relay.
//!
//! - `/chat`: greeting on join, `echo` back to the sender, `new message`
//!   broadcast to the room.
//! - `/news`: greeting items on join; no client events.

pub mod chat;
pub mod news;

use std::sync::Arc;

use crate::domain::{NamespacePath, NamespaceRouter};

/// Path of the chat namespace.
pub const CHAT: &str = "/chat";

/// Path of the news namespace.
pub const NEWS: &str = "/news";

/// Event name of every chat delivery.
pub const CHAT_EVENT: &str = "a message";

/// Event name of every news delivery.
pub const NEWS_EVENT: &str = "item";

/// Registers the `/chat` and `/news` handlers on `router`.
pub async fn install(router: &NamespaceRouter) {
    let chat = router.resolve(&NamespacePath::new(CHAT)).await;
    chat.on_connect(Arc::new(chat::Greeting)).await;
    chat.on("echo", Arc::new(chat::Echo)).await;
    chat.on("new message", Arc::new(chat::NewMessage)).await;

    let news = router.resolve(&NamespacePath::new(NEWS)).await;
    news.on_connect(Arc::new(news::Greeting)).await;

    tracing::debug!("channels installed: {CHAT}, {NEWS}");
}
