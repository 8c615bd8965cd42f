use std::collections::{BTreeSet, HashMap};

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::rooms::events::ServerEvent;

/// The live binding of one connection to a room and username, plus the
/// sender side of its outbound event queue.
#[derive(Debug, Clone)]
pub struct Session {
    pub room: String,
    pub username: String,
    pub outbound: mpsc::UnboundedSender<ServerEvent>,
}

/// Authoritative map from connection id to live session.
///
/// Presence is always recomputed from this table rather than patched
/// incrementally, so a connection that vanishes without a clean leave can
/// never leave a stale counter behind.
#[derive(Default)]
pub struct SessionTable {
    inner: RwLock<HashMap<Uuid, Session>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces the binding for `conn`. Returns the binding
    /// that was replaced, if any, so the caller can recompute presence for
    /// a vacated room.
    pub async fn join(
        &self,
        conn: Uuid,
        room: String,
        username: String,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) -> Option<Session> {
        self.inner.write().await.insert(
            conn,
            Session {
                room,
                username,
                outbound,
            },
        )
    }

    /// The current binding for `conn`, if it has joined a room.
    pub async fn get(&self, conn: Uuid) -> Option<Session> {
        self.inner.read().await.get(&conn).cloned()
    }

    /// Removes the binding for `conn`, returning it if one existed.
    /// Called on disconnect or explicit leave.
    pub async fn leave(&self, conn: Uuid) -> Option<Session> {
        self.inner.write().await.remove(&conn)
    }

    /// De-duplicated usernames of all live sessions bound to `room`,
    /// sorted so the snapshot is deterministic.
    pub async fn members_of(&self, room: &str) -> Vec<String> {
        self.inner
            .read()
            .await
            .values()
            .filter(|s| s.room == room)
            .map(|s| s.username.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Outbound senders of every connection bound to `room`, minus an
    /// optional excluded connection. Used by the broadcast router.
    pub(crate) async fn peers_of(
        &self,
        room: &str,
        exclude: Option<Uuid>,
    ) -> Vec<mpsc::UnboundedSender<ServerEvent>> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|(id, s)| s.room == room && Some(**id) != exclude)
            .map(|(_, s)| s.outbound.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> mpsc::UnboundedSender<ServerEvent> {
        mpsc::unbounded_channel().0
    }

    #[tokio::test]
    async fn membership_tracks_joins_and_leaves() {
        let table = SessionTable::new();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());

        table
            .join(a, "general".into(), "alice".into(), sender())
            .await;
        assert_eq!(table.members_of("general").await, ["alice"]);

        table.join(b, "general".into(), "bob".into(), sender()).await;
        assert_eq!(table.members_of("general").await, ["alice", "bob"]);

        table.leave(a).await;
        assert_eq!(table.members_of("general").await, ["bob"]);
    }

    #[tokio::test]
    async fn usernames_are_deduplicated() {
        let table = SessionTable::new();
        for _ in 0..2 {
            table
                .join(Uuid::now_v7(), "general".into(), "alice".into(), sender())
                .await;
        }
        assert_eq!(table.members_of("general").await, ["alice"]);
    }

    #[tokio::test]
    async fn rejoin_replaces_the_binding() {
        let table = SessionTable::new();
        let conn = Uuid::now_v7();

        table
            .join(conn, "general".into(), "alice".into(), sender())
            .await;
        let replaced = table
            .join(conn, "random".into(), "alice".into(), sender())
            .await
            .unwrap();

        assert_eq!(replaced.room, "general");
        assert!(table.members_of("general").await.is_empty());
        assert_eq!(table.members_of("random").await, ["alice"]);
    }

    #[tokio::test]
    async fn leave_of_unknown_connection_is_a_noop() {
        let table = SessionTable::new();
        assert!(table.leave(Uuid::now_v7()).await.is_none());
    }
}
