//! Cross-process fan-out through a publish/subscribe broker.
//!
//! [`BridgeAdapter`] publishes local broadcasts to broker topics and feeds
//! messages received from the broker into the local
//! [`crate::domain::BroadcastEngine`], so several relay processes behave
//! like one namespace. The broker itself sits behind the [`Broker`] trait.

pub mod adapter;
pub mod backoff;
pub mod broker;
pub mod envelope;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_broker;

pub use adapter::{BindingInfo, BindingState, BridgeAdapter, BridgeStatsSnapshot};
pub use backoff::{BackoffPolicy, bind_with_backoff, maintain_binding};
pub use broker::{Broker, RemoteFrame, Subscription};
pub use envelope::BridgeEnvelope;
pub use memory::MemoryBroker;
#[cfg(feature = "redis")]
pub use redis_broker::RedisBroker;
