//! nsrelay server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints and, when
//! a broker is configured, binds the bridge topics.

use std::sync::Arc;

use anyhow::{Context, bail};
use tracing_subscriber::EnvFilter;

use nsrelay::api;
use nsrelay::app_state::AppState;
use nsrelay::bridge::{BridgeAdapter, Broker, MemoryBroker, maintain_binding};
use nsrelay::channels;
use nsrelay::config::RelayConfig;
use nsrelay::domain::{ConnectionRegistry, NamespaceRouter};
use nsrelay::service::RelayService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = RelayConfig::from_env()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;
    tracing::info!(addr = %config.listen_addr, instance_id = %config.instance_id, "starting nsrelay");

    // Build domain layer
    let registry = Arc::new(ConnectionRegistry::new());
    let router = Arc::new(NamespaceRouter::new());
    channels::install(&router).await;

    // Build service layer, with the bridge when a broker is configured
    let mut relay = RelayService::new(registry, router, config.sender_policy);
    let bridge = match config.broker_url.as_deref() {
        Some(url) => {
            let broker = connect_broker(url, config.memory_broker_capacity)?;
            let bridge = Arc::new(BridgeAdapter::new(
                broker,
                relay.engine().clone(),
                config.instance_id.clone(),
            ));
            relay = relay.with_bridge(Arc::clone(&bridge));
            Some(bridge)
        }
        None => {
            tracing::info!("no BROKER_URL set; bridge disabled");
            None
        }
    };

    // Binding keepers rebind topics the broker drops
    let mut keepers = Vec::new();
    if let Some(bridge) = &bridge {
        for binding in &config.bridge_bindings {
            let bridge = Arc::clone(bridge);
            let binding = binding.clone();
            let policy = config.bind_backoff;
            keepers.push(tokio::spawn(async move {
                let (namespace, topic) = (binding.namespace, binding.topic);
                if let Err(e) =
                    maintain_binding(bridge, namespace.clone(), topic.clone(), policy).await
                {
                    tracing::error!(topic = %topic, namespace = %namespace, error = %e, "bridge binding abandoned");
                }
            }));
        }
    }

    // Build application
    let app_state = AppState::new(relay, config.outbound_queue_capacity, &config.instance_id);
    let app = api::build_app(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for keeper in keepers {
        keeper.abort();
    }
    if let Some(bridge) = bridge {
        bridge.shutdown().await;
    }
    tracing::info!("nsrelay stopped");

    Ok(())
}

/// Selects the broker implementation from `BROKER_URL`.
fn connect_broker(url: &str, memory_capacity: usize) -> anyhow::Result<Arc<dyn Broker>> {
    if url.starts_with("memory://") {
        tracing::info!(capacity = memory_capacity, "using in-process broker");
        return Ok(Arc::new(MemoryBroker::new(memory_capacity)));
    }
    if url.starts_with("redis://") || url.starts_with("rediss://") {
        return redis_broker(url);
    }
    bail!("unsupported BROKER_URL scheme: {url}")
}

#[cfg(feature = "redis")]
fn redis_broker(url: &str) -> anyhow::Result<Arc<dyn Broker>> {
    let broker = nsrelay::bridge::RedisBroker::new(url).context("invalid redis URL")?;
    tracing::info!("using redis broker");
    Ok(Arc::new(broker))
}

#[cfg(not(feature = "redis"))]
fn redis_broker(_url: &str) -> anyhow::Result<Arc<dyn Broker>> {
    bail!("BROKER_URL is a redis URL but nsrelay was built without the `redis` feature")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
