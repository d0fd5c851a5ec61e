//! Namespace handlers: list, inspect, server-side emit.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    EmitRequest, EmitResponse, NamespaceDetailResponse, NamespaceListResponse, NamespaceSummaryDto,
};
use crate::app_state::AppState;
use crate::domain::{ConnectionId, Message, NamespacePath};
use crate::error::{ErrorResponse, RelayError};

/// `GET /namespaces`: List resolved namespaces.
#[utoipa::path(
    get,
    path = "/api/v1/namespaces",
    tag = "Namespaces",
    summary = "List namespaces",
    description = "Returns every namespace this process has resolved, with its local member count and handled events.",
    responses(
        (status = 200, description = "Namespace list", body = NamespaceListResponse),
    )
)]
pub async fn list_namespaces(State(state): State<AppState>) -> impl IntoResponse {
    let relay = &state.relay;
    let mut data = Vec::new();
    for ns in relay.router().list().await {
        data.push(NamespaceSummaryDto {
            path: ns.path().to_string(),
            members: relay.registry().member_count(ns.path()).await,
            events: ns.event_names().await,
            created_at: ns.created_at(),
        });
    }
    Json(NamespaceListResponse { data })
}

/// `GET /namespaces/{name}`: Inspect one namespace.
///
/// # Errors
///
/// Returns [`RelayError::NamespaceNotFound`] if nothing resolved `name`.
#[utoipa::path(
    get,
    path = "/api/v1/namespaces/{name}",
    tag = "Namespaces",
    summary = "Get namespace",
    description = "Returns members, handled events and bridge topic of one namespace. `name` is the path without its leading slash.",
    params(("name" = String, Path, description = "Namespace name, e.g. `chat`")),
    responses(
        (status = 200, description = "Namespace detail", body = NamespaceDetailResponse),
        (status = 404, description = "Namespace not found", body = ErrorResponse),
    )
)]
pub async fn get_namespace(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    let path = NamespacePath::new(&name);
    let ns = state
        .relay
        .router()
        .get(&path)
        .await
        .ok_or_else(|| RelayError::NamespaceNotFound(path.to_string()))?;

    let mut members: Vec<uuid::Uuid> = state
        .relay
        .registry()
        .members_of(&path)
        .await
        .into_iter()
        .map(|id| *id.as_uuid())
        .collect();
    members.sort();

    let bridge_topic = match state.relay.bridge() {
        Some(bridge) => bridge
            .bindings()
            .await
            .into_iter()
            .find(|b| b.namespace == path)
            .map(|b| b.topic),
        None => None,
    };

    Ok(Json(NamespaceDetailResponse {
        path: path.to_string(),
        created_at: ns.created_at(),
        events: ns.event_names().await,
        members,
        bridge_topic,
    }))
}

/// `POST /namespaces/{name}/emit`: Emit a message from the server.
///
/// Without `connection_id` the message is broadcast to every member and,
/// when the bridge is enabled, published to the bound topic. With
/// `connection_id` it goes to that connection only.
///
/// # Errors
///
/// Returns [`RelayError::InvalidRequest`] for an empty event name,
/// [`RelayError::NamespaceNotFound`] for an unknown namespace, and
/// [`RelayError::ConnectionGone`] when the target connection is not a
/// member of the namespace.
#[utoipa::path(
    post,
    path = "/api/v1/namespaces/{name}/emit",
    tag = "Namespaces",
    summary = "Emit to namespace",
    description = "Broadcasts an event to a namespace, or sends it to one connection when `connection_id` is set.",
    params(("name" = String, Path, description = "Namespace name, e.g. `news`")),
    request_body = EmitRequest,
    responses(
        (status = 200, description = "Message queued", body = EmitResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Namespace or connection not found", body = ErrorResponse),
        (status = 503, description = "Target connection is not keeping up", body = ErrorResponse),
    )
)]
pub async fn emit(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<EmitRequest>,
) -> Result<impl IntoResponse, RelayError> {
    if req.event.trim().is_empty() {
        return Err(RelayError::InvalidRequest(
            "event must not be empty".to_string(),
        ));
    }

    let path = NamespacePath::new(&name);
    if state.relay.router().get(&path).await.is_none() {
        return Err(RelayError::NamespaceNotFound(path.to_string()));
    }

    let event = req.event;
    let message = Message::new(event.clone(), req.data);
    let delivered = match req.connection_id.map(ConnectionId::from_uuid) {
        Some(id) => {
            let member_of = state.relay.registry().namespace_of(id).await;
            if member_of.as_ref() != Some(&path) {
                return Err(RelayError::ConnectionGone(id));
            }
            state.relay.emit_to(id, message).await?;
            1
        }
        None => state.relay.broadcast(&path, message, None).await,
    };

    tracing::debug!(namespace = %path, event = %event, delivered, "server emit");
    Ok(Json(EmitResponse {
        namespace: path.to_string(),
        event,
        delivered,
    }))
}

/// Namespace routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/namespaces", get(list_namespaces))
        .route("/namespaces/{name}", get(get_namespace))
        .route("/namespaces/{name}/emit", post(emit))
}
