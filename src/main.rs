use axum::http::{HeaderValue, Method};
use axum::{Json, Router, routing::get};
use emberchat::{AppState, rooms};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url =
        dotenv::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_owned());
    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(&database_url)
        .await?;

    let state = AppState::new(db_pool);
    state.store.init_schema().await?;

    let client_origin =
        dotenv::var("CLIENT_ORIGIN").unwrap_or_else(|_| "http://localhost:5173".to_owned());
    let cors = CorsLayer::new()
        .allow_origin(client_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST]);

    let app = Router::new()
        .route("/health", get(health))
        .merge(rooms::router())
        .with_state(state)
        .layer(cors);

    let port = dotenv::var("PORT").unwrap_or_else(|_| "4000".to_owned());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(%port, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}
