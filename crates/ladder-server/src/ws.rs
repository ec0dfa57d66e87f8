use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use ladder_core::protocol::PushMessage;

use crate::auth;
use crate::error::ApiError;
use crate::state::{handle_key, AppState, ConnectionHandle};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Access token; browsers cannot set headers on the WS handshake.
    pub token: String,
}

/// Validate the bearer token at handshake time; its username claim is the
/// routing identity for the lifetime of the session.
pub async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let claims = auth::verify_access_token(&state.config, &query.token)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(state, socket, claims.username)))
}

/// Per-connection task. Outbound envelopes arrive over an unbounded mpsc
/// and are forwarded as JSON text frames; delivery is best-effort and
/// in-order per session. Inbound frames are ignored; all state
/// transitions go through REST.
async fn handle_socket(state: Arc<AppState>, mut socket: WebSocket, username: String) {
    let key = handle_key(&username);
    let (tx, mut rx) = mpsc::unbounded_channel::<PushMessage>();

    state.connections.insert(
        key.clone(),
        ConnectionHandle {
            username: username.clone(),
            tx: tx.clone(),
        },
    );
    info!("push session opened for {}", username);

    loop {
        tokio::select! {
            Some(msg) = rx.recv() => {
                if let Ok(json) = serde_json::to_string(&msg) {
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
            }
            maybe_msg = socket.recv() => {
                match maybe_msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => continue,
                }
            }
        }
    }

    // A reconnecting client may already have registered a fresh handle;
    // only remove our own.
    state
        .connections
        .remove_if(&key, |_, conn| conn.tx.same_channel(&tx));
    info!("push session closed for {}", username);
}

/// Fire-and-forget delivery to one user. A disconnected user simply
/// misses the envelope and resyncs over REST on reconnect.
pub fn send_to(state: &AppState, username: &str, msg: PushMessage) {
    if let Some(conn) = state.connections.get(&handle_key(username)) {
        if conn.tx.send(msg).is_err() {
            debug!("dropped envelope for {}: session closing", username);
        }
    } else {
        debug!("no push session for {}", username);
    }
}
