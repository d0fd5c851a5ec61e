//! Bridge status handler.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::BridgeStatusResponse;
use crate::app_state::AppState;
use crate::bridge::BridgeStatsSnapshot;

/// `GET /bridge`: Broker bindings and counters.
#[utoipa::path(
    get,
    path = "/api/v1/bridge",
    tag = "Bridge",
    summary = "Bridge status",
    description = "Reports whether cross-process fan-out is enabled, each topic binding with its state, and the bridge counters.",
    responses(
        (status = 200, description = "Bridge status", body = BridgeStatusResponse),
    )
)]
pub async fn bridge_status(State(state): State<AppState>) -> impl IntoResponse {
    let response = match state.relay.bridge() {
        Some(bridge) => BridgeStatusResponse {
            enabled: true,
            instance_id: bridge.instance_id().to_string(),
            bindings: bridge.bindings().await,
            stats: bridge.stats(),
        },
        None => BridgeStatusResponse {
            enabled: false,
            instance_id: state.instance_id.to_string(),
            bindings: Vec::new(),
            stats: BridgeStatsSnapshot::default(),
        },
    };
    Json(response)
}

/// Bridge routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/bridge", get(bridge_status))
}
