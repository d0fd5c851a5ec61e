//! Bridge status DTO.

use serde::Serialize;
use utoipa::ToSchema;

use crate::bridge::{BindingInfo, BridgeStatsSnapshot};

/// Response for `GET /api/v1/bridge`.
#[derive(Debug, Serialize, ToSchema)]
pub struct BridgeStatusResponse {
    /// Whether a broker is configured.
    pub enabled: bool,
    /// Identifier stamped on envelopes this process publishes.
    pub instance_id: String,
    /// Current topic bindings, sorted by topic.
    pub bindings: Vec<BindingInfo>,
    /// Bridge counters; all zero when the bridge is disabled.
    pub stats: BridgeStatsSnapshot,
}
