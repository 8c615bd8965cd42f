use std::sync::Arc;

use uuid::Uuid;

use crate::rooms::events::ServerEvent;
use crate::sessions::SessionTable;

/// Fans events out to every connection currently bound to a room.
///
/// Pure delivery: no payload transformation and no buffering across rooms.
/// A closed receiver is skipped; the session itself is torn down by the
/// connection's own disconnect path.
#[derive(Clone)]
pub struct RoomRouter {
    sessions: Arc<SessionTable>,
}

impl RoomRouter {
    pub fn new(sessions: Arc<SessionTable>) -> Self {
        Self { sessions }
    }

    /// Delivers `event` to every connection in `room`, minus `exclude`
    /// (used for typing events, which must not echo back to the typist).
    /// Returns the number of connections the event was queued for.
    pub async fn broadcast(
        &self,
        room: &str,
        event: &ServerEvent,
        exclude: Option<Uuid>,
    ) -> usize {
        let peers = self.sessions.peers_of(room, exclude).await;
        let mut delivered = 0;
        for peer in peers {
            if peer.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        tracing::debug!(room, delivered, "broadcast");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn events_stay_inside_the_room() {
        let sessions = Arc::new(SessionTable::new());
        let router = RoomRouter::new(Arc::clone(&sessions));

        let (general_tx, mut general_rx) = mpsc::unbounded_channel();
        let (random_tx, mut random_rx) = mpsc::unbounded_channel();
        sessions
            .join(Uuid::now_v7(), "general".into(), "alice".into(), general_tx)
            .await;
        sessions
            .join(Uuid::now_v7(), "random".into(), "bob".into(), random_tx)
            .await;

        let event = ServerEvent::RoomUsers(vec!["alice".into()]);
        let delivered = router.broadcast("general", &event, None).await;

        assert_eq!(delivered, 1);
        assert!(general_rx.try_recv().is_ok());
        assert!(random_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn exclusion_skips_the_originator() {
        let sessions = Arc::new(SessionTable::new());
        let router = RoomRouter::new(Arc::clone(&sessions));

        let typist = Uuid::now_v7();
        let (typist_tx, mut typist_rx) = mpsc::unbounded_channel();
        let (peer_tx, mut peer_rx) = mpsc::unbounded_channel();
        sessions
            .join(typist, "general".into(), "alice".into(), typist_tx)
            .await;
        sessions
            .join(Uuid::now_v7(), "general".into(), "bob".into(), peer_tx)
            .await;

        let event = ServerEvent::TypingStatus {
            username: "alice".into(),
            is_typing: true,
        };
        router.broadcast("general", &event, Some(typist)).await;

        assert!(typist_rx.try_recv().is_err());
        assert!(peer_rx.try_recv().is_ok());
    }
}
