use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use ladder_core::protocol::{CharacterStatsEntry, MatchSummary, PlayerProfile, RankingEntry};

use crate::auth::AuthenticatedUser;
use crate::db;
use crate::error::ApiError;
use crate::state::AppState;

/// Global leaderboard over the denormalized player rating (each player's
/// best character Elo).
pub async fn rankings(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
) -> Result<Json<Vec<RankingEntry>>, ApiError> {
    let players = db::get_rankings(&state.db, 100).await?;

    let entries = players
        .into_iter()
        .enumerate()
        .map(|(i, p)| RankingEntry {
            rank: (i + 1) as u32,
            username: p.username,
            elo: p.elo,
            peak_elo: p.peak_elo,
            wins: p.wins,
            losses: p.losses,
        })
        .collect();

    Ok(Json(entries))
}

pub async fn profile(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(username): Path<String>,
) -> Result<Json<PlayerProfile>, ApiError> {
    let player = db::get_player_by_username(&state.db, &username)
        .await?
        .ok_or_else(|| ApiError::NotFound("No such player.".to_string()))?;

    let characters = db::get_character_stats_for_player(&state.db, &player.id)
        .await?
        .into_iter()
        .map(|s| CharacterStatsEntry {
            character: s.character_name,
            elo: s.elo,
            peak_elo: s.peak_elo,
            wins: s.wins,
            losses: s.losses,
        })
        .collect();

    let total_matches =
        db::count_completed_matches_by_participant(&state.db, &player.username).await?;

    Ok(Json(PlayerProfile {
        username: player.username,
        elo: player.elo,
        peak_elo: player.peak_elo,
        wins: player.wins,
        losses: player.losses,
        total_matches,
        characters,
    }))
}

#[derive(Debug, Deserialize)]
pub struct MatchHistoryQuery {
    pub character: Option<String>,
}

/// Recent matches for a player, newest first, optionally restricted to
/// one of their characters.
pub async fn player_matches(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(username): Path<String>,
    Query(query): Query<MatchHistoryQuery>,
) -> Result<Json<Vec<MatchSummary>>, ApiError> {
    let rows = db::recent_matches_by_participant(
        &state.db,
        &username,
        query.character.as_deref(),
        50,
    )
    .await?;

    let summaries = rows
        .into_iter()
        .map(|m| MatchSummary {
            player1_elo_delta: m.player1_elo_delta(),
            player2_elo_delta: m.player2_elo_delta(),
            id: m.id,
            player1: m.player1_username,
            player2: m.player2_username,
            player1_character: m.player1_character,
            player2_character: m.player2_character,
            status: m.status,
            winner: m.winner_username,
            played_at: m.played_at,
        })
        .collect();

    Ok(Json(summaries))
}
