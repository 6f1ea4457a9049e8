//! WebSocket connection handler for download requests and progress.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::downloads::DownloadRequest;
use crate::events::ProgressEvent;
use crate::web::state::AppState;

use super::messages::{ClientMessage, Outbound, ServerMessage};

/// Session ids whose events this connection receives.
type Tracked = Arc<Mutex<HashSet<String>>>;

/// Handle a WebSocket connection.
pub async fn handle_websocket(socket: WebSocket, state: AppState) {
    state.activity.touch();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel for sending messages to the WebSocket
    let (tx, mut rx) = mpsc::channel::<Outbound>(256);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let tracked: Tracked = Arc::new(Mutex::new(HashSet::new()));
    // Subscribe before any download starts so no early event is missed.
    let forward_task = tokio::spawn(forward_events(
        state.bus.subscribe(),
        tracked.clone(),
        tx.clone(),
    ));

    while let Some(result) = ws_receiver.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            // Pings are answered by axum
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("WebSocket error: {}", e);
                break;
            }
        };

        let reply = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(message) => handle_message(message, &state, &tracked),
            Err(e) => Outbound::Control(ServerMessage::error(format!("Invalid message: {}", e))),
        };

        if let Err(send_err) = tx.send(reply).await {
            tracing::debug!(error = ?send_err, "Failed to send reply");
            break;
        }
    }

    forward_task.abort();
    send_task.abort();
    tracing::debug!(sessions = tracked.lock().len(), "WebSocket closed");
}

fn handle_message(message: ClientMessage, state: &AppState, tracked: &Tracked) -> Outbound {
    match message {
        ClientMessage::Ping => Outbound::Control(ServerMessage::Pong),

        ClientMessage::DownloadVideo {
            token,
            url,
            video_code,
            audio_code,
            session_id,
        } => {
            state.activity.touch();
            let session_id = session_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            tracked.lock().insert(session_id.clone());

            let request = DownloadRequest {
                token,
                url,
                video_code,
                audio_code,
                session_id: session_id.clone(),
            };
            match state.downloads.start(request) {
                Ok(download_id) => Outbound::Control(ServerMessage::DownloadAccepted {
                    session_id,
                    download_id,
                }),
                Err(e) => {
                    tracing::info!(%session_id, error = %e, "Rejected download request");
                    Outbound::Event(ProgressEvent::error(&session_id, e.to_string()))
                }
            }
        }

        ClientMessage::Subscribe { session_id } => {
            tracked.lock().insert(session_id.clone());
            Outbound::Control(ServerMessage::Subscribed { session_id })
        }

        ClientMessage::Unsubscribe { session_id } => {
            tracked.lock().remove(&session_id);
            Outbound::Control(ServerMessage::Unsubscribed { session_id })
        }
    }
}

/// Forward bus events for tracked sessions until the socket goes away.
async fn forward_events(
    mut events: broadcast::Receiver<ProgressEvent>,
    tracked: Tracked,
    tx: mpsc::Sender<Outbound>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "WebSocket fell behind the event bus");
                let notice = ServerMessage::error(format!(
                    "Missed {} progress events; fetch /api/download/{{download_id}} for the result",
                    skipped
                ));
                if tx.send(Outbound::Control(notice)).await.is_err() {
                    break;
                }
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if !tracked.lock().contains(event.session_id()) {
            continue;
        }
        if tx.send(Outbound::Event(event)).await.is_err() {
            break;
        }
    }
}
