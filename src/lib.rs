pub mod fanout;
pub mod model;
pub mod rooms;
pub mod sessions;
pub mod store;
pub mod typing;

use std::sync::Arc;

use axum::extract::FromRef;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sqlx::SqlitePool;

use fanout::RoomRouter;
use sessions::SessionTable;
use store::MessageStore;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: MessageStore,
    pub sessions: Arc<SessionTable>,
    pub router: RoomRouter,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Self {
        let sessions = Arc::new(SessionTable::new());
        Self {
            store: MessageStore::new(pool),
            router: RoomRouter::new(Arc::clone(&sessions)),
            sessions,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}\n\n{}", self.0, self.0.backtrace()),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
