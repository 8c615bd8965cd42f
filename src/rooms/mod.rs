pub mod events;
pub mod ws;

use axum::extract::{Query, State};
use axum::{Json, Router, debug_handler, routing::get};
use serde::Deserialize;

use crate::model::Message;
use crate::store::{DEFAULT_HISTORY_LIMIT, MessageStore};
use crate::{AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages", get(list_messages))
        .route("/ws", get(ws::room_ws))
}

#[derive(Deserialize)]
struct MessagesQuery {
    room: Option<String>,
}

/// Up to 100 messages for a room, oldest first. An absent or unknown
/// room yields an empty list, not an error.
#[debug_handler(state = AppState)]
async fn list_messages(
    State(store): State<MessageStore>,
    Query(MessagesQuery { room }): Query<MessagesQuery>,
) -> AppResult<Json<Vec<Message>>> {
    let Some(room) = room else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(store.list_by_room(&room, DEFAULT_HISTORY_LIMIT).await?))
}
