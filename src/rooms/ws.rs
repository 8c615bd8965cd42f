use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::store::StoreError;
use crate::typing::TypingDebouncer;
use crate::{AppState, model::Message};

use super::events::{ClientEvent, ServerEvent};

/// Connection-local state owned by one socket's event loop: its identity,
/// the sender side of its outbound queue, and its typing debouncer.
pub struct Connection {
    pub id: Uuid,
    pub outbound: mpsc::UnboundedSender<ServerEvent>,
    pub typing: TypingDebouncer,
}

impl Connection {
    pub fn new(outbound: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: Uuid::now_v7(),
            outbound,
            typing: TypingDebouncer::new(),
        }
    }
}

pub async fn room_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut queued) = mpsc::unbounded_channel::<ServerEvent>();
    let mut conn = Connection::new(outbound);
    let conn_id = conn.id;
    tracing::info!(%conn_id, "socket connected");

    let pump = tokio::spawn(async move {
        while let Some(event) = queued.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = stream.next().await {
        // Non-protocol frames (pings, malformed payloads) are dropped.
        let Ok(event) = serde_json::from_slice::<ClientEvent>(&frame.into_data()) else {
            continue;
        };
        handle_event(&state, &mut conn, event).await;
    }

    // Disconnect: clear the typing timer, drop the binding, and recompute
    // presence for the vacated room exactly once.
    conn.typing.stop();
    if let Some(session) = state.sessions.leave(conn_id).await {
        broadcast_presence(&state, &session.room).await;
    }
    pump.abort();
    tracing::info!(%conn_id, "socket disconnected");
}

/// Applies one client event against the shared state. Split out from the
/// socket loop so the whole protocol is drivable through plain channels.
pub async fn handle_event(state: &AppState, conn: &mut Connection, event: ClientEvent) {
    match event {
        ClientEvent::JoinRoom { room, username } => {
            let replaced = state
                .sessions
                .join(conn.id, room.clone(), username, conn.outbound.clone())
                .await;
            // A room switch vacates the old room; rejoining the same room
            // still triggers exactly one recompute below.
            if let Some(prev) = replaced
                && prev.room != room
            {
                broadcast_presence(state, &prev.room).await;
            }
            broadcast_presence(state, &room).await;
        }

        ClientEvent::SendMessage {
            username,
            room,
            text,
            image_url,
        } => {
            // Sending implicitly forces typing -> idle.
            if conn.typing.stop() {
                let idle = ServerEvent::TypingStatus {
                    username: username.clone(),
                    is_typing: false,
                };
                state.router.broadcast(&room, &idle, Some(conn.id)).await;
            }

            // Broadcast strictly after successful persistence.
            match state.store.create(&room, &username, text, image_url).await {
                Ok(msg) => {
                    state
                        .router
                        .broadcast(&room, &ServerEvent::ReceiveMessage(msg), None)
                        .await;
                }
                Err(err) => reject(conn, &err),
            }
        }

        ClientEvent::Typing { room, is_typing } => {
            let Some(session) = state.sessions.get(conn.id).await else {
                return;
            };
            let username = session.username;

            if is_typing {
                let router = state.router.clone();
                let conn_id = conn.id;
                let decay_room = room.clone();
                let decay_user = username.clone();
                conn.typing.refresh(async move {
                    let idle = ServerEvent::TypingStatus {
                        username: decay_user,
                        is_typing: false,
                    };
                    router.broadcast(&decay_room, &idle, Some(conn_id)).await;
                });

                let active = ServerEvent::TypingStatus {
                    username,
                    is_typing: true,
                };
                state.router.broadcast(&room, &active, Some(conn.id)).await;
            } else if conn.typing.stop() {
                let idle = ServerEvent::TypingStatus {
                    username,
                    is_typing: false,
                };
                state.router.broadcast(&room, &idle, Some(conn.id)).await;
            }
        }

        ClientEvent::ToggleReaction {
            message_id,
            emoji,
            username,
            room,
        } => {
            let result = state.store.toggle_reaction(message_id, &emoji, &username).await;
            finish_reaction(state, conn, &room, result).await;
        }

        ClientEvent::AddReaction {
            message_id,
            emoji,
            username,
            room,
        } => {
            let result = state.store.add_reaction(message_id, &emoji, &username).await;
            finish_reaction(state, conn, &room, result).await;
        }
    }
}

/// Recomputes membership from the session table and broadcasts the full
/// snapshot to the room.
pub async fn broadcast_presence(state: &AppState, room: &str) {
    let members = state.sessions.members_of(room).await;
    state
        .router
        .broadcast(room, &ServerEvent::RoomUsers(members), None)
        .await;
}

async fn finish_reaction(
    state: &AppState,
    conn: &Connection,
    room: &str,
    result: Result<Message, StoreError>,
) {
    match result {
        Ok(msg) => {
            state
                .router
                .broadcast(room, &ServerEvent::MessageUpdated(msg), None)
                .await;
        }
        Err(err) => reject(conn, &err),
    }
}

/// Acknowledges a failed event to its originator. Nothing is broadcast
/// for a failed operation.
fn reject(conn: &Connection, err: &StoreError) {
    if matches!(err, StoreError::Persistence(_) | StoreError::Decode(_)) {
        tracing::error!(error = %err, conn = %conn.id, "event dropped");
    }
    let _ = conn.outbound.send(ServerEvent::Error {
        reason: err.to_string(),
    });
}
