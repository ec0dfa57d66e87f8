pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod matches;
pub mod pool;
pub mod rankings;
pub mod rating;
pub mod state;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::CorsLayer;

pub use crate::config::Config;
use crate::state::AppState;

/// Build a fully configured Router + shared state.
pub async fn build_app(db_url: &str, config: Config) -> (Router, Arc<AppState>) {
    // In-memory SQLite gives every pooled connection its own database;
    // keep a single one there.
    let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await
        .expect("Failed to connect to SQLite");

    db::init_db(&pool)
        .await
        .expect("Failed to initialize database");

    let state = Arc::new(AppState::new(pool, config));

    let app = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/matches/invite", post(matches::invite))
        .route("/matches/accept", post(matches::accept))
        .route("/matches/decline", post(matches::decline))
        .route("/matches/cancel", post(matches::cancel))
        .route("/matches/report", post(matches::report))
        .route("/matches/confirm", post(matches::confirm))
        .route("/matches/rematch", post(matches::rematch))
        .route("/pool", get(pool::list))
        .route("/pool/search", get(pool::search))
        .route("/pool/checkin", post(pool::check_in))
        .route("/pool/checkout", post(pool::check_out))
        .route("/rankings", get(rankings::rankings))
        .route("/players/{username}", get(rankings::profile))
        .route("/players/{username}/matches", get(rankings::player_matches))
        .route("/ws", get(ws::ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    (app, state)
}

async fn health() -> &'static str {
    "ok"
}
