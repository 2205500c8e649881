//! WebSocket bridge
//!
//! One socket per authenticated user. Incoming text frames are chat
//! commands; everything the hub emits for this connection is forwarded
//! back as JSON. The hub owns room membership, so closing the socket
//! (or any send failure) ends with a single `disconnect` sweep.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use rekber_chat::{ChatUser, ClientCommand, ServerEvent};

use crate::error::ApiResult;
use crate::extractors::CallerId;
use crate::state::AppState;

/// Upgrade to the chat WebSocket
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    CallerId(caller): CallerId,
) -> ApiResult<impl IntoResponse> {
    // Resolve the username up front; an unknown caller never upgrades.
    let account = state.store.buyer(caller).await?;
    let user = ChatUser {
        user_id: caller,
        username: account.username,
    };
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user: ChatUser) {
    let (conn, mut events) = state.hub.connect(user);
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(err) => {
                        warn!(%conn, error = %err, "event serialization failed");
                        continue;
                    }
                };
                if sink.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            frame = stream.next() => {
                let Some(Ok(frame)) = frame else { break };
                match frame {
                    Message::Text(text) => {
                        let cmd = match serde_json::from_str::<ClientCommand>(&text) {
                            Ok(cmd) => cmd,
                            Err(err) => {
                                debug!(%conn, error = %err, "unparseable client frame");
                                let event = ServerEvent::Error {
                                    message: format!("unparseable command: {err}"),
                                };
                                if send_event(&mut sink, &event).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };
                        if let Err(err) = state.hub.handle(conn, cmd).await {
                            let event = ServerEvent::Error {
                                message: err.to_string(),
                            };
                            if send_event(&mut sink, &event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    // axum answers pings itself; binary frames are not part
                    // of the protocol
                    _ => {}
                }
            }
        }
    }

    state.hub.disconnect(conn);
    debug!(%conn, "chat socket closed");
}

async fn send_event(
    sink: &mut (impl Sink<Message, Error = axum::Error> + Unpin),
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => sink.send(Message::Text(json)).await,
        Err(err) => {
            warn!(error = %err, "event serialization failed");
            Ok(())
        }
    }
}
