use utoipa::OpenApi;

use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Create a new collaborative coding session
#[utoipa::path(
    post,
    path = "/api/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = Session),
        (status = 422, description = "Invalid request", body = ApiError)
    )
)]
#[allow(dead_code)]
pub async fn create_session_doc() {}

/// Get a session by id
#[utoipa::path(
    get,
    path = "/api/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "The session", body = Session),
        (status = 404, description = "Session not found", body = ApiError)
    )
)]
#[allow(dead_code)]
pub async fn get_session_doc() {}

/// Update session code
#[utoipa::path(
    put,
    path = "/api/sessions/{session_id}/code",
    params(("session_id" = String, Path, description = "Session identifier")),
    request_body = UpdateCodeRequest,
    responses(
        (status = 200, description = "Updated session", body = Session),
        (status = 404, description = "Session not found", body = ApiError),
        (status = 422, description = "Invalid request", body = ApiError)
    )
)]
#[allow(dead_code)]
pub async fn update_code_doc() {}

/// Execute session code
#[utoipa::path(
    post,
    path = "/api/sessions/{session_id}/execute",
    params(("session_id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Execution result", body = ExecutionResult),
        (status = 404, description = "Session not found", body = ApiError)
    )
)]
#[allow(dead_code)]
pub async fn execute_code_doc() {}

/// Broadcast an execution result to session participants
#[utoipa::path(
    post,
    path = "/api/sessions/{session_id}/execution-result",
    params(("session_id" = String, Path, description = "Session identifier")),
    request_body = ExecutionResult,
    responses(
        (status = 204, description = "Result broadcast"),
        (status = 404, description = "Session not found", body = ApiError)
    )
)]
#[allow(dead_code)]
pub async fn broadcast_execution_result_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        create_session_doc,
        get_session_doc,
        update_code_doc,
        execute_code_doc,
        broadcast_execution_result_doc,
    ),
    components(
        schemas(
            HealthResponse,
            Session,
            Language,
            CreateSessionRequest,
            UpdateCodeRequest,
            ExecutionResult,
            ApiError
        )
    ),
    tags(
        (name = "sessions", description = "Collaborative coding session API")
    )
)]
pub struct ApiDoc;
