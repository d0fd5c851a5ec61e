//! Namespace table and `(namespace, event)` → handler routing.
//!
//! Each [`Namespace`] carries its own event vocabulary: a map from event
//! name to an [`EventHandler`], plus any number of [`ConnectHandler`]s run
//! when a connection joins. Event names with no handler are ignored
//! silently. This is the relay's permissive vocabulary: clients may emit
//! events a namespace does not listen for, exactly as in the socket-style
//! relays this server replaces, and that is not an error.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{Message, NamespacePath};
use crate::service::{ConnectHandler, EventContext, EventHandler};

/// A logical channel with its own handlers.
///
/// Created lazily by [`NamespaceRouter::resolve`] and kept for the life of
/// the process. Membership lives in [`super::ConnectionRegistry`].
#[derive(Debug)]
pub struct Namespace {
    path: NamespacePath,
    created_at: DateTime<Utc>,
    handlers: RwLock<HashMap<String, Arc<dyn EventHandler>>>,
    connect_handlers: RwLock<Vec<Arc<dyn ConnectHandler>>>,
}

impl Namespace {
    fn new(path: NamespacePath) -> Self {
        Self {
            path,
            created_at: Utc::now(),
            handlers: RwLock::new(HashMap::new()),
            connect_handlers: RwLock::new(Vec::new()),
        }
    }

    /// Namespace path.
    #[must_use]
    pub const fn path(&self) -> &NamespacePath {
        &self.path
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Registers `handler` for `event`, replacing any previous handler for
    /// the same name.
    pub async fn on(&self, event: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers.write().await.insert(event.into(), handler);
    }

    /// Adds a handler run every time a connection joins this namespace.
    pub async fn on_connect(&self, handler: Arc<dyn ConnectHandler>) {
        self.connect_handlers.write().await.push(handler);
    }

    /// Returns the handler registered for `event`.
    pub async fn handler_for(&self, event: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.read().await.get(event).cloned()
    }

    /// Returns a snapshot of the connect handlers, in registration order.
    pub async fn connect_handlers(&self) -> Vec<Arc<dyn ConnectHandler>> {
        self.connect_handlers.read().await.clone()
    }

    /// Returns the registered event names, sorted.
    pub async fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Table of all namespaces known to the process.
#[derive(Debug, Default)]
pub struct NamespaceRouter {
    namespaces: RwLock<HashMap<NamespacePath, Arc<Namespace>>>,
}

impl NamespaceRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the namespace for `path`, creating it on first use.
    /// Every call with the same path returns the same namespace.
    pub async fn resolve(&self, path: &NamespacePath) -> Arc<Namespace> {
        if let Some(ns) = self.namespaces.read().await.get(path) {
            return Arc::clone(ns);
        }
        let mut map = self.namespaces.write().await;
        let ns = map.entry(path.clone()).or_insert_with(|| {
            tracing::debug!(namespace = %path, "namespace created");
            Arc::new(Namespace::new(path.clone()))
        });
        Arc::clone(ns)
    }

    /// Returns the namespace for `path` without creating it.
    pub async fn get(&self, path: &NamespacePath) -> Option<Arc<Namespace>> {
        self.namespaces.read().await.get(path).map(Arc::clone)
    }

    /// Returns every namespace, sorted by path.
    pub async fn list(&self) -> Vec<Arc<Namespace>> {
        let mut all: Vec<Arc<Namespace>> =
            self.namespaces.read().await.values().map(Arc::clone).collect();
        all.sort_by(|a, b| a.path().cmp(b.path()));
        all
    }

    /// Routes `message` from the connection in `ctx` to the handler
    /// registered for `(ctx.namespace, message.event)`.
    ///
    /// Returns `true` if a handler ran. Unknown namespaces and unregistered
    /// event names return `false` and are not errors. Handler failures are
    /// logged and swallowed.
    pub async fn dispatch(&self, ctx: &EventContext<'_>, message: Message) -> bool {
        let Some(ns) = self.get(ctx.namespace()).await else {
            return false;
        };
        let Some(handler) = ns.handler_for(message.event()).await else {
            tracing::trace!(
                namespace = %ctx.namespace(),
                event = message.event(),
                "no handler for event; ignored"
            );
            return false;
        };
        let event = message.event().to_string();
        if let Err(e) = handler.handle(ctx, message).await {
            tracing::warn!(
                namespace = %ctx.namespace(),
                connection_id = %ctx.connection(),
                event,
                error = %e,
                "event handler failed"
            );
        }
        true
    }
}
