pub mod config;
pub mod docs;
pub mod handlers;
pub mod hub;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod ws;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::docs::ApiDoc;
use crate::hub::BroadcastHub;
use crate::services::{CodeExecutor, MockExecutor, SessionService};
use crate::store::SessionStore;

/// Origins for frontend dev servers, used when none are configured.
const DEFAULT_CORS_ORIGINS: &str =
    "http://localhost:5173,http://localhost:3000,http://127.0.0.1:5173,http://127.0.0.1:3000";

/// Shared application state: the session service over the configured store,
/// the broadcast hub and the execution engine.
#[derive(Clone)]
pub struct AppState {
    pub service: SessionService,
    pub hub: Arc<BroadcastHub>,
    pub executor: Arc<dyn CodeExecutor>,
}

impl AppState {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            service: SessionService::new(store),
            hub: Arc::new(BroadcastHub::new()),
            executor: Arc::new(MockExecutor),
        }
    }
}

/// Assemble the full application router: REST API under `/api`, the
/// WebSocket endpoint, Swagger UI and request tracing.
pub fn app(state: AppState) -> Router {
    let api_routes = routes::create_api_routes(state.clone());
    let ws_routes = Router::new()
        .route("/ws/sessions/:session_id", get(ws::websocket_handler))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .merge(ws_routes)
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
}

/// Build the CORS layer from a comma separated origin list.
pub fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .unwrap_or(DEFAULT_CORS_ORIGINS)
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    // Credentialed requests forbid wildcard methods and headers.
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
