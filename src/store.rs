use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::model::{self, Message, Reaction};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY,
    room       TEXT NOT NULL,
    username   TEXT NOT NULL,
    text       TEXT,
    image_url  TEXT,
    reactions  TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_room_created_at
    ON messages (room, created_at);
";

pub const DEFAULT_HISTORY_LIMIT: u32 = 100;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("message needs text or an image")]
    Validation,
    #[error("message {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Persistence(#[from] sqlx::Error),
    #[error("corrupt reactions column: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Durable message store plus the serialized reaction mutator.
///
/// Reaction updates are read-modify-write cycles; two interleaved toggles
/// on the same message would lose one party's update without coordination.
/// A per-message-id async mutex is held across the whole cycle, so toggles
/// on different messages still run freely.
#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
    reaction_locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

type Row = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    i64,
);

impl MessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            reaction_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Creates the messages table and index if they do not exist yet.
    pub async fn init_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Persists a new message. Fails with `Validation` when both `text`
    /// and `image_url` are empty or absent; nothing is stored in that case.
    pub async fn create(
        &self,
        room: &str,
        username: &str,
        text: Option<String>,
        image_url: Option<String>,
    ) -> StoreResult<Message> {
        let text = text.filter(|t| !t.trim().is_empty());
        let image_url = image_url.filter(|u| !u.trim().is_empty());
        if text.is_none() && image_url.is_none() {
            return Err(StoreError::Validation);
        }

        let msg = Message {
            id: Uuid::now_v7(),
            room: room.to_owned(),
            username: username.to_owned(),
            text,
            image_url,
            reactions: Vec::new(),
            created_at: now_millis(),
        };

        sqlx::query(
            "INSERT INTO messages (id,room,username,text,image_url,reactions,created_at) \
             VALUES (?,?,?,?,?,?,?)",
        )
        .bind(msg.id.to_string())
        .bind(&msg.room)
        .bind(&msg.username)
        .bind(&msg.text)
        .bind(&msg.image_url)
        .bind("[]")
        .bind(msg.created_at)
        .execute(&self.pool)
        .await?;

        Ok(msg)
    }

    /// The newest `limit` messages of `room`, presented oldest-first.
    /// Unknown rooms yield an empty vec.
    pub async fn list_by_room(&self, room: &str, limit: u32) -> StoreResult<Vec<Message>> {
        let rows: Vec<Row> = sqlx::query_as(
            "SELECT id,room,username,text,image_url,reactions,created_at \
             FROM messages WHERE room=? \
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(room)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows
            .into_iter()
            .map(from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Toggles `username` on `emoji` for the message, serialized per
    /// message id. Returns the full updated message.
    pub async fn toggle_reaction(
        &self,
        message_id: Uuid,
        emoji: &str,
        username: &str,
    ) -> StoreResult<Message> {
        self.mutate_reactions(message_id, |reactions| {
            model::toggle_user(reactions, emoji, username);
        })
        .await
    }

    /// Add-only variant of `toggle_reaction`; never removes a user.
    pub async fn add_reaction(
        &self,
        message_id: Uuid,
        emoji: &str,
        username: &str,
    ) -> StoreResult<Message> {
        self.mutate_reactions(message_id, |reactions| {
            model::add_user(reactions, emoji, username);
        })
        .await
    }

    async fn mutate_reactions<F>(&self, message_id: Uuid, apply: F) -> StoreResult<Message>
    where
        F: FnOnce(&mut Vec<Reaction>),
    {
        let lock = {
            let mut locks = self.reaction_locks.lock().await;
            Arc::clone(locks.entry(message_id).or_default())
        };

        let result = {
            let _guard = lock.lock().await;
            self.mutate_locked(message_id, apply).await
        };

        drop(lock);
        let mut locks = self.reaction_locks.lock().await;
        if locks
            .get(&message_id)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            locks.remove(&message_id);
        }

        result
    }

    /// The read-modify-write cycle proper; caller holds the per-message lock.
    async fn mutate_locked<F>(&self, message_id: Uuid, apply: F) -> StoreResult<Message>
    where
        F: FnOnce(&mut Vec<Reaction>),
    {
        let row: Option<Row> = sqlx::query_as(
            "SELECT id,room,username,text,image_url,reactions,created_at \
             FROM messages WHERE id=?",
        )
        .bind(message_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(StoreError::NotFound(message_id));
        };

        let mut msg = from_row(row)?;
        apply(&mut msg.reactions);
        sqlx::query("UPDATE messages SET reactions=? WHERE id=?")
            .bind(serde_json::to_string(&msg.reactions)?)
            .bind(message_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(msg)
    }
}

fn from_row((id, room, username, text, image_url, reactions, created_at): Row) -> StoreResult<Message> {
    Ok(Message {
        id: Uuid::parse_str(&id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        room,
        username,
        text,
        image_url,
        reactions: serde_json::from_str(&reactions)?,
        created_at,
    })
}

fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
