use serde::{Deserialize, Serialize};

/// Lifecycle states pushed on the `match-updates` inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchUpdateStatus {
    Started,
    AwaitingConfirmation,
    RematchOffered,
    RematchWaiting,
    RematchDeclined,
    Declined,
}

/// Outcome of a finalized match. Doubles as the `/matches/confirm`
/// response body and the `result` field of `REMATCH_OFFERED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchOutcome {
    Completed,
    Disputed,
}

impl MatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOutcome::Completed => "COMPLETED",
            MatchOutcome::Disputed => "DISPUTED",
        }
    }
}

/// Envelope for the `match-updates` inbox. Optional fields are serialized
/// as null when not applicable; Elo fields are populated only on
/// `REMATCH_OFFERED` with `result` = `COMPLETED`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchUpdate {
    pub match_id: Option<String>,
    pub status: MatchUpdateStatus,
    pub player1: String,
    pub player2: String,
    pub reporter_username: Option<String>,
    pub claimed_winner: Option<String>,
    pub result: Option<MatchOutcome>,
    pub player1_elo_delta: Option<i32>,
    pub player2_elo_delta: Option<i32>,
    pub player1_new_elo: Option<i32>,
    pub player2_new_elo: Option<i32>,
    pub player1_character: Option<String>,
    pub player2_character: Option<String>,
}

impl MatchUpdate {
    /// Envelope with every optional field null.
    pub fn new(
        match_id: Option<String>,
        status: MatchUpdateStatus,
        player1: impl Into<String>,
        player2: impl Into<String>,
    ) -> Self {
        MatchUpdate {
            match_id,
            status,
            player1: player1.into(),
            player2: player2.into(),
            reporter_username: None,
            claimed_winner: None,
            result: None,
            player1_elo_delta: None,
            player2_elo_delta: None,
            player1_new_elo: None,
            player2_new_elo: None,
            player1_character: None,
            player2_character: None,
        }
    }
}

/// Invite lifecycle states pushed on the `invites` inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InviteStatus {
    Pending,
    Cancelled,
}

/// Envelope for the `invites` inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteNotice {
    pub invite_id: String,
    pub from: String,
    pub status: InviteStatus,
}

/// A single frame on the per-user push channel, discriminated by inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "inbox")]
pub enum PushMessage {
    #[serde(rename = "invites")]
    Invites(InviteNotice),
    #[serde(rename = "match-updates")]
    MatchUpdates(MatchUpdate),
}

// ── REST DTOs ───────────────────────────────────────────────────────────

/// Token pair returned by register, login, and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub username: String,
}

/// One row of the global leaderboard, ordered by denormalized elo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub rank: u32,
    pub username: String,
    pub elo: i32,
    pub peak_elo: i32,
    pub wins: i32,
    pub losses: i32,
}

/// Per-character rating line inside a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterStatsEntry {
    pub character: String,
    pub elo: i32,
    pub peak_elo: i32,
    pub wins: i32,
    pub losses: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    pub username: String,
    pub elo: i32,
    pub peak_elo: i32,
    pub wins: i32,
    pub losses: i32,
    /// Completed matches on record across all characters.
    pub total_matches: i64,
    pub characters: Vec<CharacterStatsEntry>,
}

/// A finished or in-flight match as seen in history queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub id: String,
    pub player1: String,
    pub player2: String,
    pub player1_character: Option<String>,
    pub player2_character: Option<String>,
    pub status: String,
    pub winner: Option<String>,
    pub player1_elo_delta: Option<i32>,
    pub player2_elo_delta: Option<i32>,
    pub played_at: String,
}

/// A player currently checked in to the live pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolPlayer {
    pub username: String,
    pub character: String,
    pub elo: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_update_serializes_nulls() {
        let update = MatchUpdate::new(
            Some("m-1".into()),
            MatchUpdateStatus::Started,
            "a",
            "b",
        );
        let json = serde_json::to_value(PushMessage::MatchUpdates(update)).unwrap();
        assert_eq!(json["inbox"], "match-updates");
        assert_eq!(json["matchId"], "m-1");
        assert_eq!(json["status"], "STARTED");
        assert!(json["claimedWinner"].is_null());
        assert!(json["player1EloDelta"].is_null());
    }

    #[test]
    fn invite_notice_wire_shape() {
        let notice = InviteNotice {
            invite_id: "i-1".into(),
            from: "a".into(),
            status: InviteStatus::Pending,
        };
        let json = serde_json::to_value(PushMessage::Invites(notice)).unwrap();
        assert_eq!(json["inbox"], "invites");
        assert_eq!(json["inviteId"], "i-1");
        assert_eq!(json["from"], "a");
        assert_eq!(json["status"], "PENDING");
    }
}
