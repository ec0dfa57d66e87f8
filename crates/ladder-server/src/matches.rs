use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::Json;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ladder_core::protocol::{
    InviteNotice, InviteStatus, MatchOutcome, MatchUpdate, MatchUpdateStatus, PushMessage,
};

use crate::auth::AuthenticatedUser;
use crate::db::{self, MatchRow};
use crate::error::ApiError;
use crate::rating;
use crate::state::{handle_key, AppState, PendingRematch, PendingReport};
use crate::ws;

// ── Request bodies ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    pub challenger_username: String,
    pub target_username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRequest {
    pub invite_id: String,
    pub challenger_username: String,
    pub opponent_username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclineRequest {
    pub invite_id: String,
    pub challenger_username: String,
    pub opponent_username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub invite_id: String,
    pub challenger_username: String,
    pub opponent_username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub match_id: String,
    pub reporter_username: String,
    pub claimed_winner: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub match_id: String,
    pub confirmer_username: String,
    pub claimed_winner: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RematchRequest {
    pub match_id: String,
    pub username: String,
    pub accept: bool,
}

// ── Step 1: invite ──────────────────────────────────────────────────────

/// Claim both handles under one interaction id. The idle check and the
/// claim happen inside one critical section so two overlapping invites
/// cannot both succeed.
pub async fn invite(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Json(req): Json<InviteRequest>,
) -> Result<String, ApiError> {
    let challenger = req.challenger_username.trim();
    let target = req.target_username.trim();
    info!("invite request from {} to {}", challenger, target);

    if challenger.is_empty() || target.is_empty() {
        return Err(ApiError::Validation("Both usernames are required.".to_string()));
    }
    let challenger_key = handle_key(challenger);
    let target_key = handle_key(target);
    if challenger_key == target_key {
        return Err(ApiError::Validation("You cannot invite yourself.".to_string()));
    }

    let invite_id = Uuid::new_v4().to_string();
    {
        let _claim = state.invite_guard.lock().await;
        if state.player_locks.contains_key(&challenger_key) {
            warn!("invite failed: {} already engaged", challenger);
            return Err(ApiError::Busy(
                "You already have a pending invite.".to_string(),
            ));
        }
        if state.player_locks.contains_key(&target_key) {
            warn!("invite failed: {} is busy", target);
            return Err(ApiError::Busy(
                "Player is busy (likely sending you an invite!)".to_string(),
            ));
        }
        state.player_locks.insert(challenger_key, invite_id.clone());
        state.player_locks.insert(target_key, invite_id.clone());
    }
    debug!("{} and {} locked under invite {}", challenger, target, invite_id);

    ws::send_to(
        &state,
        target,
        PushMessage::Invites(InviteNotice {
            invite_id: invite_id.clone(),
            from: challenger.to_string(),
            status: InviteStatus::Pending,
        }),
    );

    Ok(invite_id)
}

// ── Step 2: accept ──────────────────────────────────────────────────────

pub async fn accept(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Json(req): Json<AcceptRequest>,
) -> Result<(), ApiError> {
    info!(
        "accepting invite {} for {} and {}",
        req.invite_id, req.challenger_username, req.opponent_username
    );

    let locked = state
        .player_locks
        .get(&handle_key(&req.challenger_username))
        .map(|v| v.clone());
    if locked.as_deref() != Some(req.invite_id.as_str()) {
        warn!("accept failed: invite {} expired or invalid", req.invite_id);
        return Err(ApiError::InvalidState(
            "Invite expired or invalid.".to_string(),
        ));
    }

    let challenger_id =
        db::get_player_id_by_username(&state.db, &req.challenger_username).await?;
    let opponent_id = db::get_player_id_by_username(&state.db, &req.opponent_username).await?;

    // Characters come from the live pool at match-creation time.
    let challenger_character = checked_in_character(&state, &req.challenger_username);
    let opponent_character = checked_in_character(&state, &req.opponent_username);

    let m = MatchRow::new(
        Uuid::new_v4().to_string(),
        req.challenger_username.clone(),
        req.opponent_username.clone(),
        challenger_id,
        opponent_id,
        Some(challenger_character),
        Some(opponent_character),
    );
    db::insert_match(&state.db, &m).await?;
    info!("match created: {}", m.id);

    let event = MatchUpdate {
        player1_character: m.player1_character.clone(),
        player2_character: m.player2_character.clone(),
        ..MatchUpdate::new(
            Some(m.id.clone()),
            MatchUpdateStatus::Started,
            &m.player1_username,
            &m.player2_username,
        )
    };
    send_to_both(&state, &m.player1_username, &m.player2_username, event);

    Ok(())
}

fn checked_in_character(state: &AppState, username: &str) -> String {
    state
        .pool
        .get(&handle_key(username))
        .map(|p| p.character.clone())
        .unwrap_or_else(|| "Unknown".to_string())
}

// ── Step 2b: decline ────────────────────────────────────────────────────

/// Lenient release: the locks are soft, so both entries are dropped
/// unconditionally. Only a named participant may trigger it.
pub async fn decline(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<DeclineRequest>,
) -> Result<(), ApiError> {
    if !user.username.eq_ignore_ascii_case(&req.challenger_username)
        && !user.username.eq_ignore_ascii_case(&req.opponent_username)
    {
        return Err(ApiError::Forbidden(
            "You are not part of this invite.".to_string(),
        ));
    }
    info!(
        "invite declined for {} and {}",
        req.challenger_username, req.opponent_username
    );

    state.player_locks.remove(&handle_key(&req.challenger_username));
    state.player_locks.remove(&handle_key(&req.opponent_username));

    let event = MatchUpdate::new(
        None,
        MatchUpdateStatus::Declined,
        &req.challenger_username,
        &req.opponent_username,
    );
    ws::send_to(
        &state,
        &req.challenger_username,
        PushMessage::MatchUpdates(event),
    );

    Ok(())
}

// ── Step 2c: cancel ─────────────────────────────────────────────────────

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Json(req): Json<CancelRequest>,
) -> Result<String, ApiError> {
    info!(
        "cancelling invite {} from {}",
        req.invite_id, req.challenger_username
    );

    let locked = state
        .player_locks
        .get(&handle_key(&req.challenger_username))
        .map(|v| v.clone());
    if locked.as_deref() != Some(req.invite_id.as_str()) {
        warn!("cancel failed: no matching invite {}", req.invite_id);
        return Err(ApiError::Busy("No matching invite to cancel.".to_string()));
    }

    state.player_locks.remove(&handle_key(&req.challenger_username));
    state.player_locks.remove(&handle_key(&req.opponent_username));

    ws::send_to(
        &state,
        &req.opponent_username,
        PushMessage::Invites(InviteNotice {
            invite_id: req.invite_id,
            from: req.challenger_username,
            status: InviteStatus::Cancelled,
        }),
    );

    Ok("Invite cancelled.".to_string())
}

// ── Step 3: report ──────────────────────────────────────────────────────

/// First claim wins: insert-if-absent into the pending-report map. A
/// second report never overwrites the first; that caller must confirm.
pub async fn report(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Json(req): Json<ReportRequest>,
) -> Result<String, ApiError> {
    info!(
        "result reported for match {}: reporter={}, winner={}",
        req.match_id, req.reporter_username, req.claimed_winner
    );

    let m = db::get_match(&state.db, &req.match_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No such match.".to_string()))?;

    if m.status != "ACTIVE" {
        return Err(ApiError::InvalidState(
            "Match is already finalized.".to_string(),
        ));
    }
    if !m.is_participant(&req.claimed_winner) {
        return Err(ApiError::Validation(
            "Claimed winner is not part of this match.".to_string(),
        ));
    }

    match state.pending_reports.entry(req.match_id.clone()) {
        Entry::Occupied(_) => {
            warn!("report failed: match {} already has a report", req.match_id);
            return Err(ApiError::Busy(
                "A result has already been reported for this match. Waiting for confirmation."
                    .to_string(),
            ));
        }
        Entry::Vacant(vacant) => {
            vacant.insert(PendingReport {
                reporter: req.reporter_username.clone(),
                claimed_winner: req.claimed_winner.clone(),
            });
        }
    }

    let event = MatchUpdate {
        reporter_username: Some(req.reporter_username),
        claimed_winner: Some(req.claimed_winner),
        player1_character: m.player1_character.clone(),
        player2_character: m.player2_character.clone(),
        ..MatchUpdate::new(
            Some(m.id.clone()),
            MatchUpdateStatus::AwaitingConfirmation,
            &m.player1_username,
            &m.player2_username,
        )
    };
    send_to_both(&state, &m.player1_username, &m.player2_username, event);

    Ok("Report received. Waiting for opponent to confirm.".to_string())
}

// ── Step 4: confirm ─────────────────────────────────────────────────────

/// Second player's independent view. Agreement finalizes the match and
/// moves ratings; disagreement marks it DISPUTED and leaves ratings
/// alone. Either way a rematch offer opens for both players.
///
/// The pending report is removed only after the rating transaction has
/// committed and the match row is persisted, so a transient engine
/// failure can be retried.
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Json(req): Json<ConfirmRequest>,
) -> Result<String, ApiError> {
    info!(
        "confirming result for match {}: confirmer={}, winner={}",
        req.match_id, req.confirmer_username, req.claimed_winner
    );

    let pending = state
        .pending_reports
        .get(&req.match_id)
        .map(|p| p.clone())
        .ok_or_else(|| ApiError::Busy("No pending report for this match.".to_string()))?;

    if pending.reporter.eq_ignore_ascii_case(&req.confirmer_username) {
        warn!(
            "confirm failed: {} tried to confirm their own report",
            req.confirmer_username
        );
        return Err(ApiError::Busy(
            "You already reported. Waiting for opponent.".to_string(),
        ));
    }

    let mut m = db::get_match(&state.db, &req.match_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No such match.".to_string()))?;
    if m.status != "ACTIVE" {
        return Err(ApiError::InvalidState(
            "Match is already finalized.".to_string(),
        ));
    }

    let agreed = pending
        .claimed_winner
        .eq_ignore_ascii_case(&req.claimed_winner);

    let (outcome, elo_result) = if agreed {
        m.winner_username = Some(pending.claimed_winner.clone());
        m.winner_id = db::get_player_id_by_username(&state.db, &pending.claimed_winner).await?;
        m.status = "COMPLETED".to_string();

        let result = rating::apply_match_result(&state, &mut m).await?;
        db::update_match_result(&state.db, &m).await?;
        (MatchOutcome::Completed, Some(result))
    } else {
        m.winner_username = None;
        m.winner_id = None;
        m.status = "DISPUTED".to_string();
        db::update_match_result(&state.db, &m).await?;
        (MatchOutcome::Disputed, None)
    };

    state.pending_reports.remove(&req.match_id);

    // Rematch offer opens for both outcomes: disputed sets get replayed.
    state.pending_rematches.insert(
        req.match_id.clone(),
        PendingRematch {
            player1: m.player1_username.clone(),
            player2: m.player2_username.clone(),
            accepted: HashSet::new(),
        },
    );
    spawn_rematch_expiry(state.clone(), req.match_id.clone());

    let event = MatchUpdate {
        claimed_winner: m.winner_username.clone(),
        result: Some(outcome),
        player1_elo_delta: elo_result.as_ref().map(|r| r.player1.delta),
        player2_elo_delta: elo_result.as_ref().map(|r| r.player2.delta),
        player1_new_elo: elo_result.as_ref().map(|r| r.player1.elo_after),
        player2_new_elo: elo_result.as_ref().map(|r| r.player2.elo_after),
        player1_character: m.player1_character.clone(),
        player2_character: m.player2_character.clone(),
        ..MatchUpdate::new(
            Some(m.id.clone()),
            MatchUpdateStatus::RematchOffered,
            &m.player1_username,
            &m.player2_username,
        )
    };
    send_to_both(&state, &m.player1_username, &m.player2_username, event);

    info!("match {} finalized: {}", m.id, outcome.as_str());
    Ok(outcome.as_str().to_string())
}

// ── Step 5: rematch ─────────────────────────────────────────────────────

pub async fn rematch(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Json(req): Json<RematchRequest>,
) -> Result<String, ApiError> {
    info!(
        "rematch response from {} for match {}: accept={}",
        req.username, req.match_id, req.accept
    );

    let responder_key = handle_key(&req.username);

    // Membership and duplicate checks, plus the accept itself, happen
    // under the map entry so two concurrent responses serialize.
    let accepted_count = {
        let mut pending = state
            .pending_rematches
            .get_mut(&req.match_id)
            .ok_or_else(|| ApiError::Busy("No pending rematch for this match.".to_string()))?;

        if !pending.player1.eq_ignore_ascii_case(&req.username)
            && !pending.player2.eq_ignore_ascii_case(&req.username)
        {
            return Err(ApiError::Forbidden(
                "You are not part of this match.".to_string(),
            ));
        }
        if pending.accepted.contains(&responder_key) {
            return Err(ApiError::Busy(
                "You already responded to this rematch.".to_string(),
            ));
        }

        if req.accept {
            pending.accepted.insert(responder_key);
            pending.accepted.len()
        } else {
            0
        }
    };

    if !req.accept {
        // First decliner wins; a response racing the expiry timer loses
        // to whoever removes the entry first.
        let (_, pending) = state
            .pending_rematches
            .remove(&req.match_id)
            .ok_or_else(|| ApiError::Busy("No pending rematch for this match.".to_string()))?;

        release_pair(&state, &pending.player1, &pending.player2);
        info!("rematch declined by {} for match {}", req.username, req.match_id);

        let event = MatchUpdate::new(
            Some(req.match_id),
            MatchUpdateStatus::RematchDeclined,
            &pending.player1,
            &pending.player2,
        );
        send_to_both(&state, &pending.player1, &pending.player2, event);
        return Ok("Rematch declined.".to_string());
    }

    if accepted_count == 1 {
        // Only one side has accepted; tell them they're waiting.
        let m = db::get_match(&state.db, &req.match_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("No such match.".to_string()))?;
        let event = MatchUpdate {
            player1_character: m.player1_character.clone(),
            player2_character: m.player2_character.clone(),
            ..MatchUpdate::new(
                Some(req.match_id),
                MatchUpdateStatus::RematchWaiting,
                &m.player1_username,
                &m.player2_username,
            )
        };
        ws::send_to(&state, &req.username, PushMessage::MatchUpdates(event));
        return Ok("Waiting for opponent.".to_string());
    }

    // Both accepted: start the new match. PlayerLocks stay held; the
    // players are continuously busy across the transition.
    let (_, pending) = state
        .pending_rematches
        .remove(&req.match_id)
        .ok_or_else(|| ApiError::Busy("No pending rematch for this match.".to_string()))?;
    info!("rematch accepted by both for match {}", req.match_id);

    let old = db::get_match(&state.db, &req.match_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No such match.".to_string()))?;

    let player1_id = db::get_player_id_by_username(&state.db, &pending.player1).await?;
    let player2_id = db::get_player_id_by_username(&state.db, &pending.player2).await?;

    // Characters carry over; there is no re-pick inside a rematch.
    let new_match = MatchRow::new(
        Uuid::new_v4().to_string(),
        pending.player1.clone(),
        pending.player2.clone(),
        player1_id,
        player2_id,
        old.player1_character.clone(),
        old.player2_character.clone(),
    );
    db::insert_match(&state.db, &new_match).await?;

    let event = MatchUpdate {
        player1_character: new_match.player1_character.clone(),
        player2_character: new_match.player2_character.clone(),
        ..MatchUpdate::new(
            Some(new_match.id.clone()),
            MatchUpdateStatus::Started,
            &new_match.player1_username,
            &new_match.player2_username,
        )
    };
    send_to_both(&state, &pending.player1, &pending.player2, event);

    Ok(format!("Rematch started! New match ID: {}", new_match.id))
}

/// Expire the rematch window: treated exactly like a decline. Whoever
/// removes the PendingRematch first wins the race against in-flight
/// responses.
fn spawn_rematch_expiry(state: Arc<AppState>, match_id: String) {
    let window = Duration::from_secs(state.config.rematch_window_secs);
    tokio::spawn(async move {
        tokio::time::sleep(window).await;
        if let Some((_, pending)) = state.pending_rematches.remove(&match_id) {
            release_pair(&state, &pending.player1, &pending.player2);
            info!("rematch window expired for match {}", match_id);

            let event = MatchUpdate::new(
                Some(match_id),
                MatchUpdateStatus::RematchDeclined,
                &pending.player1,
                &pending.player2,
            );
            send_to_both(&state, &pending.player1, &pending.player2, event);
        }
    });
}

fn release_pair(state: &AppState, player1: &str, player2: &str) {
    state.player_locks.remove(&handle_key(player1));
    state.player_locks.remove(&handle_key(player2));
    debug!("locks released for {} and {}", player1, player2);
}

fn send_to_both(state: &AppState, player1: &str, player2: &str, event: MatchUpdate) {
    ws::send_to(state, player1, PushMessage::MatchUpdates(event.clone()));
    ws::send_to(state, player2, PushMessage::MatchUpdates(event));
}
