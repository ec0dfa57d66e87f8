use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use ladder_core::elo;

use crate::db::{self, CharacterStatsRow, MatchRow};
use crate::error::ApiError;
use crate::state::AppState;

/// One participant's rating movement from a finalized match.
#[derive(Debug, Clone)]
pub struct SideResult {
    pub username: String,
    pub character: String,
    pub elo_before: i32,
    pub elo_after: i32,
    pub delta: i32,
    pub k_factor: i32,
}

/// Rating movements for both participants, in match row order.
#[derive(Debug, Clone)]
pub struct EloResult {
    pub player1: SideResult,
    pub player2: SideResult,
}

/// Apply an agreed result to both per-character rating rows and the
/// denormalized player aggregates, atomically. The caller has already set
/// `winner_username` on the match; audit fields are written back onto it
/// and the caller persists the row afterwards.
///
/// Locking: both stats rows are claimed in ascending row-id order under a
/// bounded timeout. This is the only function that takes more than one
/// row lock; timing out leaves nothing committed and surfaces as a
/// retriable server error.
pub async fn apply_match_result(
    state: &AppState,
    m: &mut MatchRow,
) -> Result<EloResult, ApiError> {
    let winner = m
        .winner_username
        .clone()
        .ok_or_else(|| ApiError::Internal("match has no winner set".to_string()))?;

    let p1 = db::get_player_by_username(&state.db, &m.player1_username)
        .await?
        .ok_or_else(|| {
            ApiError::Internal(format!("player not found: {}", m.player1_username))
        })?;
    let p2 = db::get_player_by_username(&state.db, &m.player2_username)
        .await?
        .ok_or_else(|| {
            ApiError::Internal(format!("player not found: {}", m.player2_username))
        })?;

    let p1_character = m.player1_character.as_deref().unwrap_or("Unknown");
    let p2_character = m.player2_character.as_deref().unwrap_or("Unknown");

    // Mains and pocket picks are independent skill pools: a fresh
    // (player, character) row starts at 1200 regardless of global rating.
    let p1_stats = db::get_or_create_character_stats(&state.db, &p1.id, p1_character).await?;
    let p2_stats = db::get_or_create_character_stats(&state.db, &p2.id, p2_character).await?;

    let _guards = lock_stats_pair(state, p1_stats.id, p2_stats.id).await?;

    let mut tx = state.db.begin().await?;

    // Authoritative pre-images, re-read under the lock.
    let p1_pre = fetch_locked(&mut tx, p1_stats.id).await?;
    let p2_pre = fetch_locked(&mut tx, p2_stats.id).await?;

    let p1_won = winner.eq_ignore_ascii_case(&m.player1_username);

    // K is per-player, per-character: own rating, own game count,
    // opponent's pre-image rating.
    let p1_after =
        elo::calculate_new_rating(p1_pre.elo, p2_pre.elo, p1_won, p1_pre.total_games());
    let p2_after =
        elo::calculate_new_rating(p2_pre.elo, p1_pre.elo, !p1_won, p2_pre.total_games());
    let p1_k = elo::k_factor(p1_pre.total_games());
    let p2_k = elo::k_factor(p2_pre.total_games());

    db::apply_character_result(&mut *tx, p1_pre.id, p1_after, p1_won).await?;
    db::apply_character_result(&mut *tx, p2_pre.id, p2_after, !p1_won).await?;

    db::sync_player_aggregate(&mut *tx, &p1.id, p1_won).await?;
    db::sync_player_aggregate(&mut *tx, &p2.id, !p1_won).await?;

    tx.commit().await?;

    m.player1_elo_before = Some(p1_pre.elo);
    m.player1_elo_after = Some(p1_after);
    m.player2_elo_before = Some(p2_pre.elo);
    m.player2_elo_after = Some(p2_after);
    m.player1_k_factor = Some(p1_k);
    m.player2_k_factor = Some(p2_k);

    info!(
        "match {}: {} {} -> {}, {} {} -> {}",
        m.id, m.player1_username, p1_pre.elo, p1_after, m.player2_username, p2_pre.elo, p2_after
    );

    Ok(EloResult {
        player1: SideResult {
            username: m.player1_username.clone(),
            character: p1_character.to_string(),
            elo_before: p1_pre.elo,
            elo_after: p1_after,
            delta: p1_after - p1_pre.elo,
            k_factor: p1_k,
        },
        player2: SideResult {
            username: m.player2_username.clone(),
            character: p2_character.to_string(),
            elo_before: p2_pre.elo,
            elo_after: p2_after,
            delta: p2_after - p2_pre.elo,
            k_factor: p2_k,
        },
    })
}

/// Claim both row locks, always in ascending row-id order, each bounded
/// by the configured timeout.
async fn lock_stats_pair(
    state: &AppState,
    a: i64,
    b: i64,
) -> Result<(OwnedMutexGuard<()>, OwnedMutexGuard<()>), ApiError> {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    let g1 = lock_row(state, first).await?;
    let g2 = lock_row(state, second).await?;
    Ok((g1, g2))
}

async fn lock_row(state: &AppState, id: i64) -> Result<OwnedMutexGuard<()>, ApiError> {
    let lock: Arc<tokio::sync::Mutex<()>> = state.stats_locks.entry(id).or_default().clone();
    let timeout = Duration::from_millis(state.config.lock_timeout_ms);
    match tokio::time::timeout(timeout, lock.lock_owned()).await {
        Ok(guard) => {
            debug!("locked stats row {}", id);
            Ok(guard)
        }
        Err(_) => Err(ApiError::ResourceBusy(format!(
            "rating row {} is busy; try again",
            id
        ))),
    }
}

async fn fetch_locked(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: i64,
) -> Result<CharacterStatsRow, ApiError> {
    db::get_character_stats_by_id(&mut **tx, id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("stats row {} vanished", id)))
}
