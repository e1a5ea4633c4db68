// WebSocket feed of a project's change events

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::{
    error::Result,
    middleware::{auth, guard},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
    pub project_id: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Result<Response> {
    // Browsers cannot set headers on the upgrade request, so the token
    // travels in the query string.
    let user = auth::decode_token(&query.token, &state.config.jwt_secret)?;
    auth::ensure_active(&state.db.pool, &user.id).await?;
    let session = auth::open_session(&state, user).await;
    let (user, _) =
        guard::require_project_access(&state.db.pool, &session, &query.project_id).await?;

    tracing::debug!(user_id = %user.id, project_id = %query.project_id, "change feed opened");

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, query.project_id, state)))
}

async fn handle_socket(socket: WebSocket, project_id: String, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let mut events = state.events.subscribe(&project_id).await;

    // Sender wrapped in Arc<Mutex> for sharing
    let sender = Arc::new(tokio::sync::Mutex::new(sender));
    let sender_clone = sender.clone();

    // Task to forward change events to this client
    let forward_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            let mut sender = sender_clone.lock().await;
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // The feed is one-way; only control frames are handled
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Close(_) => break,
            Message::Ping(data) => {
                let mut sender = sender.lock().await;
                let _ = sender.send(Message::Pong(data)).await;
            }
            _ => {}
        }
    }

    forward_task.abort();
    tracing::debug!(project_id = %project_id, "change feed closed");
}
