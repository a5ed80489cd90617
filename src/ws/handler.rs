use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::hub::Subscriber;
use crate::AppState;

/// WebSocket endpoint for real-time session updates.
pub async fn websocket_handler(
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    info!("New WebSocket connection attempt for session {}", session_id);
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

/// Handle one subscriber connection: register with the hub, announce the new
/// participant count, pump events into the socket, and undo all of it when
/// the connection ends for any reason.
async fn handle_socket(socket: WebSocket, raw_session_id: String, state: AppState) {
    let Ok(session_id) = Uuid::parse_str(&raw_session_id) else {
        close_with(socket, close_code::POLICY, "Session not found").await;
        return;
    };

    // The session must exist before a subscriber may register.
    match state.service.get_session(session_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            close_with(socket, close_code::POLICY, "Session not found").await;
            return;
        }
        Err(e) => {
            error!("Storage failure checking session {}: {}", session_id, e);
            close_with(socket, close_code::ERROR, "Service unavailable").await;
            return;
        }
    }

    let (subscriber, mut events) = Subscriber::channel();
    let subscriber_id = subscriber.id();

    // Register + increment counter + announce, as one ordered unit.
    let service = state.service.clone();
    let joined = state
        .hub
        .join(session_id, subscriber, || async move {
            let session = service.add_participant(session_id).await?;
            Ok::<_, crate::store::StoreError>(
                session.map(|s| s.participants).unwrap_or(0),
            )
        })
        .await;
    let participants = match joined {
        Ok(participants) => participants,
        Err(e) => {
            error!("Failed to register subscriber on {}: {}", session_id, e);
            close_with(socket, close_code::ERROR, "Service unavailable").await;
            return;
        }
    };
    info!(
        "Subscriber {} joined session {} ({} participants)",
        subscriber_id, session_id, participants
    );

    let (mut sender, mut receiver) = socket.split();

    // Pump hub events into the socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    // Clients do not send application messages; we only watch the stream to
    // detect the close, clean or otherwise.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    // Deregister + decrement counter + announce. Runs on abnormal closes too.
    let service = state.service.clone();
    let left = state
        .hub
        .leave(session_id, subscriber_id, || async move {
            let session = service.remove_participant(session_id).await?;
            Ok::<_, crate::store::StoreError>(
                session.map(|s| s.participants).unwrap_or(0),
            )
        })
        .await;
    match left {
        Ok(Some(participants)) => info!(
            "Subscriber {} left session {} ({} participants)",
            subscriber_id, session_id, participants
        ),
        Ok(None) => {}
        Err(e) => warn!(
            "Failed to record disconnect from session {}: {}",
            session_id, e
        ),
    }
}
