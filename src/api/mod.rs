//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` and `/ws`
//! sit at the root.

pub mod dto;
pub mod handlers;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// OpenAPI document for the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "nsrelay",
        description = "Namespaced real-time broadcast relay with optional cross-process fan-out."
    ),
    paths(
        handlers::system::health_handler,
        handlers::namespace::list_namespaces,
        handlers::namespace::get_namespace,
        handlers::namespace::emit,
        handlers::bridge::bridge_status,
    ),
    tags(
        (name = "System", description = "Health"),
        (name = "Namespaces", description = "Namespace inspection and server-side emit"),
        (name = "Bridge", description = "Broker bindings and counters"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}

/// Builds the full application: REST, `/ws`, Swagger UI (feature
/// `swagger-ui`) and the HTTP middleware stack.
pub fn build_app(state: AppState) -> Router {
    let app = Router::new()
        .merge(build_router())
        .route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let app = app.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/v1/namespaces",
            "/api/v1/namespaces/{name}",
            "/api/v1/namespaces/{name}/emit",
            "/api/v1/bridge",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
