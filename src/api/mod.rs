//! HTTP surface: diagnostics routes, the `/ws` endpoint, and the OpenAPI
//! document.

pub mod handlers;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// OpenAPI document for the HTTP endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "conveyor-bridge", description = "WebSocket to serial conveyor bridge"),
    paths(
        handlers::system::health_handler,
        handlers::device::device_handler,
        handlers::device::ports_handler,
    ),
    components(schemas(
        handlers::system::HealthResponse,
        crate::device::DeviceSnapshot,
        crate::device::DeviceState,
        crate::device::PortInfo,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "System", description = "Service health"),
        (name = "Device", description = "Controller diagnostics"),
    )
)]
pub struct ApiDoc;

/// Builds the REST router without state.
pub fn build_router() -> Router<AppState> {
    handlers::routes()
}

/// Builds the complete application: REST routes, `/ws`, tracing and CORS.
pub fn build_app(state: AppState) -> Router {
    let router = Router::new()
        .merge(build_router())
        .route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
