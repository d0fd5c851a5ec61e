//! Process-level retry for bridge bindings.
//!
//! [`BridgeAdapter::bind`] fails fast. The process entry point decides how
//! hard to try, using [`bind_with_backoff`] for a single bind or
//! [`maintain_binding`] to also rebind after the broker ends a
//! subscription.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use super::BridgeAdapter;
use crate::domain::NamespacePath;
use crate::error::RelayError;

/// Exponential backoff with a ceiling and an optional attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub initial: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
    /// Give up after this many attempts; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl BackoffPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based):
    /// `initial * 2^(attempt - 1)`, capped at `max`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

/// Calls [`BridgeAdapter::bind`] until it succeeds, retrying
/// [`RelayError::BrokerUnavailable`] with `policy`. Returns the number of
/// attempts made.
///
/// # Errors
///
/// Returns the last `BrokerUnavailable` once `policy.max_attempts` is
/// reached, or any other bind error immediately.
pub async fn bind_with_backoff(
    adapter: &Arc<BridgeAdapter>,
    namespace: &NamespacePath,
    topic: &str,
    policy: BackoffPolicy,
) -> Result<u32, RelayError> {
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        match adapter.bind(namespace, topic).await {
            Ok(()) => return Ok(attempt),
            Err(RelayError::BrokerUnavailable(reason)) => {
                if policy.max_attempts.is_some_and(|max| attempt >= max) {
                    tracing::error!(topic, namespace = %namespace, attempt, reason = %reason, "giving up on bridge binding");
                    return Err(RelayError::BrokerUnavailable(reason));
                }
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    topic,
                    namespace = %namespace,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    reason = %reason,
                    "bridge binding failed; retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Keeps `topic` bound to `namespace` for as long as the adapter lives.
///
/// Binds with [`bind_with_backoff`], then waits for the adapter to report
/// the subscription lost and binds again. Returns `Ok` once the adapter is
/// dropped.
///
/// # Errors
///
/// Returns whatever [`bind_with_backoff`] gives up with.
pub async fn maintain_binding(
    adapter: Arc<BridgeAdapter>,
    namespace: NamespacePath,
    topic: String,
    policy: BackoffPolicy,
) -> Result<(), RelayError> {
    // Subscribed before binding so a loss right after bind is not missed.
    let mut losses = adapter.lost_bindings();
    let adapter = Arc::downgrade(&adapter);
    let mut rebinds: u64 = 0;
    loop {
        let Some(bridge) = adapter.upgrade() else {
            return Ok(());
        };
        let attempts = bind_with_backoff(&bridge, &namespace, &topic, policy).await?;
        drop(bridge);
        tracing::info!(topic, namespace = %namespace, attempts, rebinds, "bridge binding established");

        loop {
            match losses.recv().await {
                Ok(lost) if lost.topic == topic => break,
                Ok(_) => {}
                // Missed notifications; binding again is a no-op if still bound.
                Err(broadcast::error::RecvError::Lagged(_)) => break,
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
        rebinds = rebinds.saturating_add(1);
        tracing::warn!(topic, namespace = %namespace, rebinds, "bridge binding lost; rebinding");
    }
}
