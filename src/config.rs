//! Relay configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`), each with a default.

use std::net::SocketAddr;
use std::time::Duration;

use crate::bridge::BackoffPolicy;
use crate::domain::NamespacePath;
use crate::service::SenderPolicy;

/// Boxed error returned by configuration loading.
pub type ConfigError = Box<dyn std::error::Error + Send + Sync>;

/// One `topic=/namespace` pair from `BRIDGE_BINDINGS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSpec {
    /// Broker topic.
    pub topic: String,
    /// Local namespace.
    pub namespace: NamespacePath,
}

/// Top-level relay configuration.
///
/// Loaded once at startup via [`RelayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8000`).
    pub listen_addr: SocketAddr,

    /// Capacity of each WebSocket's outbound queue.
    pub outbound_queue_capacity: usize,

    /// Whether a connection receives its own broadcasts.
    pub sender_policy: SenderPolicy,

    /// Broker URL: unset disables the bridge, `memory://` selects the
    /// in-process broker, `redis://…` selects Redis (feature `redis`).
    pub broker_url: Option<String>,

    /// Buffer size per topic of the in-process broker.
    pub memory_broker_capacity: usize,

    /// Topic ↔ namespace bindings established at startup.
    pub bridge_bindings: Vec<BindingSpec>,

    /// Retry policy for establishing bindings.
    pub bind_backoff: BackoffPolicy,

    /// Identifier stamped on published envelopes.
    pub instance_id: String,
}

impl RelayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` cannot be parsed as a
    /// [`SocketAddr`] or `BRIDGE_BINDINGS` is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
            .parse()?;

        let outbound_queue_capacity = parse_env("OUTBOUND_QUEUE_CAPACITY", 1024);

        let sender_policy = if parse_env_bool("BROADCAST_INCLUDE_SENDER", true) {
            SenderPolicy::IncludeSender
        } else {
            SenderPolicy::ExcludeSender
        };

        let broker_url = std::env::var("BROKER_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let memory_broker_capacity = parse_env("MEMORY_BROKER_CAPACITY", 1024);

        let bridge_bindings = parse_bindings(
            &std::env::var("BRIDGE_BINDINGS").unwrap_or_else(|_| "chat=/chat".to_string()),
        )?;

        let max_attempts: u32 = parse_env("BRIDGE_BIND_MAX_ATTEMPTS", 0);
        let bind_backoff = BackoffPolicy {
            initial: Duration::from_millis(parse_env("BRIDGE_BIND_BACKOFF_MS", 500)),
            max: Duration::from_millis(parse_env("BRIDGE_BIND_BACKOFF_MAX_MS", 30_000)),
            max_attempts: (max_attempts > 0).then_some(max_attempts),
        };

        let instance_id = std::env::var("INSTANCE_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(Self {
            listen_addr,
            outbound_queue_capacity,
            sender_policy,
            broker_url,
            memory_broker_capacity,
            bridge_bindings,
            bind_backoff,
            instance_id,
        })
    }
}

/// Parses `topic=/namespace` pairs separated by commas. Blank entries are
/// skipped.
///
/// # Errors
///
/// Returns an error for an entry without `=` or with an empty topic.
pub fn parse_bindings(raw: &str) -> Result<Vec<BindingSpec>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> Result<BindingSpec, ConfigError> {
            let (topic, namespace) = entry
                .split_once('=')
                .ok_or_else(|| format!("binding `{entry}` is not topic=/namespace"))?;
            let topic = topic.trim();
            if topic.is_empty() {
                return Err(format!("binding `{entry}` has an empty topic").into());
            }
            Ok(BindingSpec {
                topic: topic.to_string(),
                namespace: NamespacePath::new(namespace),
            })
        })
        .collect()
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key)
        .ok()
        .map(|v| v.trim().to_ascii_lowercase())
        .as_deref()
    {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use tokio_test::assert_ok;

    use super::*;

    #[test]
    fn parses_multiple_bindings() {
        let bindings = assert_ok!(parse_bindings("chat=/chat, news = news ,"));
        assert_eq!(
            bindings,
            vec![
                BindingSpec {
                    topic: "chat".to_string(),
                    namespace: NamespacePath::new("/chat"),
                },
                BindingSpec {
                    topic: "news".to_string(),
                    namespace: NamespacePath::new("/news"),
                },
            ]
        );
    }

    #[test]
    fn empty_bindings_disable_bridging() {
        assert!(assert_ok!(parse_bindings("")).is_empty());
    }

    #[test]
    fn rejects_malformed_bindings() {
        assert!(parse_bindings("chat").is_err());
        assert!(parse_bindings("=/chat").is_err());
    }
}
