use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::{
    broadcast_execution_result, create_session, execute_code, get_session, health_check,
    update_code,
};
use crate::AppState;

/// Create API routes
pub fn create_api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/sessions", post(create_session))
        .route("/sessions/:session_id", get(get_session))
        .route("/sessions/:session_id/code", put(update_code))
        .route("/sessions/:session_id/execute", post(execute_code))
        .route(
            "/sessions/:session_id/execution-result",
            post(broadcast_execution_result),
        )
        .with_state(state)
}
