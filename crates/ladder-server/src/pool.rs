use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use ladder_core::protocol::PoolPlayer;

use crate::auth::AuthenticatedUser;
use crate::db;
use crate::error::ApiError;
use crate::state::{handle_key, AppState};

#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    pub character: String,
}

/// Check in to the live pool with the character you're currently playing.
/// The coordinator reads this selection at match-creation time.
pub async fn check_in(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CheckInRequest>,
) -> Result<(), ApiError> {
    let character = req.character.trim();
    if character.is_empty() {
        return Err(ApiError::Validation("Character is required.".to_string()));
    }

    let elo = db::get_player_by_username(&state.db, &user.username)
        .await?
        .map(|p| p.elo)
        .unwrap_or(ladder_core::DEFAULT_RATING);

    state.pool.insert(
        handle_key(&user.username),
        PoolPlayer {
            username: user.username.clone(),
            character: character.to_string(),
            elo,
        },
    );
    info!("{} checked in as {}", user.username, character);
    Ok(())
}

pub async fn check_out(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<(), ApiError> {
    state.pool.remove(&handle_key(&user.username));
    info!("{} checked out", user.username);
    Ok(())
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
) -> Json<Vec<PoolPlayer>> {
    let mut players: Vec<PoolPlayer> = state.pool.iter().map(|e| e.value().clone()).collect();
    players.sort_by(|a, b| a.username.to_lowercase().cmp(&b.username.to_lowercase()));
    Json(players)
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

/// Case-insensitive prefix search over checked-in handles.
pub async fn search(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<PoolPlayer>> {
    let prefix = query.q.to_lowercase();
    if prefix.is_empty() {
        return Json(Vec::new());
    }

    let mut players: Vec<PoolPlayer> = state
        .pool
        .iter()
        .filter(|e| e.key().starts_with(&prefix))
        .map(|e| e.value().clone())
        .take(20)
        .collect();
    players.sort_by(|a, b| a.username.to_lowercase().cmp(&b.username.to_lowercase()));
    Json(players)
}
