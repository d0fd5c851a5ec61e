//! Namespace DTOs: listing, detail and server-side emit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One namespace in the listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct NamespaceSummaryDto {
    /// Namespace path, e.g. `"/chat"`.
    pub path: String,
    /// Number of local connections currently joined.
    pub members: usize,
    /// Event names with a registered handler, sorted.
    pub events: Vec<String>,
    /// When the namespace was first resolved.
    pub created_at: DateTime<Utc>,
}

/// Response for `GET /api/v1/namespaces`.
#[derive(Debug, Serialize, ToSchema)]
pub struct NamespaceListResponse {
    /// All resolved namespaces, sorted by path.
    pub data: Vec<NamespaceSummaryDto>,
}

/// Response for `GET /api/v1/namespaces/{name}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct NamespaceDetailResponse {
    /// Namespace path.
    pub path: String,
    /// When the namespace was first resolved.
    pub created_at: DateTime<Utc>,
    /// Event names with a registered handler, sorted.
    pub events: Vec<String>,
    /// Ids of the local connections currently joined, sorted.
    pub members: Vec<Uuid>,
    /// Broker topic bound to this namespace, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_topic: Option<String>,
}

/// Request body for `POST /api/v1/namespaces/{name}/emit`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EmitRequest {
    /// Event name to deliver.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
    /// Deliver to this connection only instead of broadcasting.
    #[serde(default)]
    pub connection_id: Option<Uuid>,
}

/// Response for `POST /api/v1/namespaces/{name}/emit`.
#[derive(Debug, Serialize, ToSchema)]
pub struct EmitResponse {
    /// Target namespace.
    pub namespace: String,
    /// Delivered event name.
    pub event: String,
    /// Number of local connections the message was queued for.
    pub delivered: usize,
}
