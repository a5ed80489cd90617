use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    AppError, CreateSessionRequest, ExecutionResult, Session, SessionUpdate, UpdateCodeRequest,
};
use crate::AppState;

/// Anything that does not parse as a UUID cannot name a stored session, so it
/// is reported as not found rather than as a malformed request.
fn parse_session_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::SessionNotFound(raw.to_string()))
}

/// Create a new collaborative coding session. The body is optional; an empty
/// body means the default language.
pub async fn create_session(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let language = if body.is_empty() {
        None
    } else {
        let request: CreateSessionRequest = serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))?;
        Some(request.language)
    };
    let session = state.service.create_session(language).await?;
    info!(
        "Created session {} (language: {})",
        session.id, session.language
    );
    Ok((StatusCode::CREATED, Json(session)))
}

/// Get a session by id.
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, AppError> {
    let id = parse_session_id(&session_id)?;
    let session = state
        .service
        .get_session(id)
        .await?
        .ok_or(AppError::SessionNotFound(session_id))?;
    Ok(Json(session))
}

/// Update the code (and optionally the language) of a session, then broadcast
/// the new state to every subscriber. The broadcast is issued after the store
/// write is acknowledged so subscribers never observe a state the store does
/// not hold.
pub async fn update_code(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<UpdateCodeRequest>,
) -> Result<Json<Session>, AppError> {
    let id = parse_session_id(&session_id)?;
    let session = state
        .service
        .update_code(id, request)
        .await?
        .ok_or(AppError::SessionNotFound(session_id))?;

    debug!("Broadcasting code update for session {}", id);
    state
        .hub
        .broadcast(
            id,
            SessionUpdate::code_update(id, session.code.clone(), session.language),
        )
        .await;

    Ok(Json(session))
}

/// Run the session's code through the execution engine and broadcast the
/// result to every subscriber.
pub async fn execute_code(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ExecutionResult>, AppError> {
    let id = parse_session_id(&session_id)?;
    let session = state
        .service
        .get_session(id)
        .await?
        .ok_or(AppError::SessionNotFound(session_id))?;

    let result = state.executor.execute(&session).await;
    info!(
        "Executed session {} in {}ms (success: {})",
        id, result.execution_time, result.success
    );
    state
        .hub
        .broadcast(id, SessionUpdate::execution_result(id, result.clone()))
        .await;

    Ok(Json(result))
}

/// Broadcast an externally produced execution result to all session
/// participants.
pub async fn broadcast_execution_result(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(result): Json<ExecutionResult>,
) -> Result<StatusCode, AppError> {
    let id = parse_session_id(&session_id)?;
    if state.service.get_session(id).await?.is_none() {
        return Err(AppError::SessionNotFound(session_id));
    }

    state
        .hub
        .broadcast(id, SessionUpdate::execution_result(id, result))
        .await;

    Ok(StatusCode::NO_CONTENT)
}
