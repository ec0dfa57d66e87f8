use sqlx::sqlite::Sqlite;
use sqlx::{Executor, Row, SqlitePool};

/// Create all tables if they don't exist.
pub async fn init_db(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS players (
            id TEXT PRIMARY KEY,
            username TEXT UNIQUE COLLATE NOCASE NOT NULL,
            password_hash TEXT NOT NULL,
            elo INTEGER NOT NULL DEFAULT 1200,
            peak_elo INTEGER NOT NULL DEFAULT 1200,
            wins INTEGER NOT NULL DEFAULT 0,
            losses INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS refresh_tokens (
            token TEXT PRIMARY KEY,
            player_id TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            revoked INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (player_id) REFERENCES players(id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS character_stats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            player_id TEXT NOT NULL,
            character_name TEXT NOT NULL,
            elo INTEGER NOT NULL DEFAULT 1200,
            peak_elo INTEGER NOT NULL DEFAULT 1200,
            wins INTEGER NOT NULL DEFAULT 0,
            losses INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (player_id, character_name),
            FOREIGN KEY (player_id) REFERENCES players(id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS matches (
            id TEXT PRIMARY KEY,
            player1_username TEXT NOT NULL,
            player2_username TEXT NOT NULL,
            winner_username TEXT,
            player1_id TEXT,
            player2_id TEXT,
            winner_id TEXT,
            player1_character TEXT,
            player2_character TEXT,
            status TEXT NOT NULL DEFAULT 'ACTIVE',
            played_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            player1_elo_before INTEGER,
            player1_elo_after INTEGER,
            player2_elo_before INTEGER,
            player2_elo_after INTEGER,
            player1_k_factor INTEGER,
            player2_k_factor INTEGER
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

// ── Players ─────────────────────────────────────────────────────────────

pub async fn create_player(
    pool: &SqlitePool,
    id: &str,
    username: &str,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO players (id, username, password_hash) VALUES (?1, ?2, ?3)")
        .bind(id)
        .bind(username)
        .bind(password_hash)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_player_by_username(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<PlayerRow>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, username, password_hash, elo, peak_elo, wins, losses
         FROM players WHERE username = ?1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(player_from_row))
}

pub async fn username_taken(pool: &SqlitePool, username: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT 1 FROM players WHERE username = ?1")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Identity resolver: handle -> stable id. Case-insensitive on the handle.
pub async fn get_player_id_by_username(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query("SELECT id FROM players WHERE username = ?1")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get("id")))
}

/// Identity resolver: stable id -> handle.
pub async fn get_username_by_id(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query("SELECT username FROM players WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get("username")))
}

pub async fn get_rankings(pool: &SqlitePool, limit: i64) -> Result<Vec<PlayerRow>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, username, password_hash, elo, peak_elo, wins, losses
         FROM players ORDER BY elo DESC, username ASC LIMIT ?1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(player_from_row).collect())
}

/// Bump the denormalized player aggregate after a finalized match:
/// elo = max over the player's character rows, peak raised if exceeded,
/// win/loss counters incremented. Runs on the engine's transaction so it
/// observes the just-updated character row.
pub async fn sync_player_aggregate<'e, E>(
    executor: E,
    player_id: &str,
    won: bool,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE players SET
            elo = (SELECT MAX(elo) FROM character_stats WHERE player_id = ?1),
            peak_elo = MAX(peak_elo,
                (SELECT MAX(elo) FROM character_stats WHERE player_id = ?1)),
            wins = wins + ?2,
            losses = losses + ?3,
            updated_at = CURRENT_TIMESTAMP
         WHERE id = ?1",
    )
    .bind(player_id)
    .bind(if won { 1 } else { 0 })
    .bind(if won { 0 } else { 1 })
    .execute(executor)
    .await?;
    Ok(())
}

// ── Refresh tokens ──────────────────────────────────────────────────────

pub async fn insert_refresh_token(
    pool: &SqlitePool,
    token: &str,
    player_id: &str,
    expires_at: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO refresh_tokens (token, player_id, expires_at) VALUES (?1, ?2, ?3)")
        .bind(token)
        .bind(player_id)
        .bind(expires_at)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_refresh_token(
    pool: &SqlitePool,
    token: &str,
) -> Result<Option<RefreshTokenRow>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT token, player_id, expires_at, revoked FROM refresh_tokens WHERE token = ?1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| RefreshTokenRow {
        token: r.get("token"),
        player_id: r.get("player_id"),
        expires_at: r.get("expires_at"),
        revoked: r.get::<i64, _>("revoked") != 0,
    }))
}

pub async fn revoke_refresh_token(pool: &SqlitePool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE token = ?1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

// ── Character stats ─────────────────────────────────────────────────────

/// Get existing (player, character) stats or create a fresh row at 1200.
/// A player's first game with a new character starts at the default, not
/// at their global rating.
pub async fn get_or_create_character_stats(
    pool: &SqlitePool,
    player_id: &str,
    character: &str,
) -> Result<CharacterStatsRow, sqlx::Error> {
    sqlx::query(
        "INSERT OR IGNORE INTO character_stats (player_id, character_name) VALUES (?1, ?2)",
    )
    .bind(player_id)
    .bind(character)
    .execute(pool)
    .await?;

    let row = sqlx::query(
        "SELECT id, player_id, character_name, elo, peak_elo, wins, losses
         FROM character_stats WHERE player_id = ?1 AND character_name = ?2",
    )
    .bind(player_id)
    .bind(character)
    .fetch_one(pool)
    .await?;

    Ok(character_stats_from_row(row))
}

/// Authoritative re-read of a stats row, used under the paired row lock.
pub async fn get_character_stats_by_id<'e, E>(
    executor: E,
    id: i64,
) -> Result<Option<CharacterStatsRow>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT id, player_id, character_name, elo, peak_elo, wins, losses
         FROM character_stats WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(character_stats_from_row))
}

/// Apply one side's result to its stats row: new rating, raised peak,
/// bumped counter.
pub async fn apply_character_result<'e, E>(
    executor: E,
    id: i64,
    new_elo: i32,
    won: bool,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE character_stats SET
            elo = ?2,
            peak_elo = MAX(peak_elo, ?2),
            wins = wins + ?3,
            losses = losses + ?4,
            updated_at = CURRENT_TIMESTAMP
         WHERE id = ?1",
    )
    .bind(id)
    .bind(new_elo)
    .bind(if won { 1 } else { 0 })
    .bind(if won { 0 } else { 1 })
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get_character_stats_for_player(
    pool: &SqlitePool,
    player_id: &str,
) -> Result<Vec<CharacterStatsRow>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, player_id, character_name, elo, peak_elo, wins, losses
         FROM character_stats WHERE player_id = ?1 ORDER BY elo DESC",
    )
    .bind(player_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(character_stats_from_row).collect())
}

// ── Matches ─────────────────────────────────────────────────────────────

pub async fn insert_match(pool: &SqlitePool, m: &MatchRow) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO matches (id, player1_username, player2_username,
            player1_id, player2_id, player1_character, player2_character,
            status, played_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )
    .bind(&m.id)
    .bind(&m.player1_username)
    .bind(&m.player2_username)
    .bind(&m.player1_id)
    .bind(&m.player2_id)
    .bind(&m.player1_character)
    .bind(&m.player2_character)
    .bind(&m.status)
    .bind(&m.played_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_match(pool: &SqlitePool, id: &str) -> Result<Option<MatchRow>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM matches WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(match_from_row))
}

/// Persist a finalization: terminal status, winner, and the rating audit.
pub async fn update_match_result<'e, E>(executor: E, m: &MatchRow) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE matches SET
            status = ?2,
            winner_username = ?3,
            winner_id = ?4,
            player1_elo_before = ?5,
            player1_elo_after = ?6,
            player2_elo_before = ?7,
            player2_elo_after = ?8,
            player1_k_factor = ?9,
            player2_k_factor = ?10
         WHERE id = ?1",
    )
    .bind(&m.id)
    .bind(&m.status)
    .bind(&m.winner_username)
    .bind(&m.winner_id)
    .bind(m.player1_elo_before)
    .bind(m.player1_elo_after)
    .bind(m.player2_elo_before)
    .bind(m.player2_elo_after)
    .bind(m.player1_k_factor)
    .bind(m.player2_k_factor)
    .execute(executor)
    .await?;
    Ok(())
}

/// Recent finalized matches for one participant, newest first, optionally
/// filtered to the character they played. Only COMPLETED rows appear in
/// history; ACTIVE and DISPUTED matches carry no rating audit.
pub async fn recent_matches_by_participant(
    pool: &SqlitePool,
    username: &str,
    character: Option<&str>,
    limit: i64,
) -> Result<Vec<MatchRow>, sqlx::Error> {
    let rows = match character {
        None => {
            sqlx::query(
                "SELECT * FROM matches
                 WHERE status = 'COMPLETED'
                   AND (player1_username = ?1 COLLATE NOCASE
                     OR player2_username = ?1 COLLATE NOCASE)
                 ORDER BY played_at DESC LIMIT ?2",
            )
            .bind(username)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        Some(character) => {
            sqlx::query(
                "SELECT * FROM matches
                 WHERE status = 'COMPLETED'
                   AND ((player1_username = ?1 COLLATE NOCASE AND player1_character = ?2)
                     OR (player2_username = ?1 COLLATE NOCASE AND player2_character = ?2))
                 ORDER BY played_at DESC LIMIT ?3",
            )
            .bind(username)
            .bind(character)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows.into_iter().map(match_from_row).collect())
}

/// Count completed matches for a player.
pub async fn count_completed_matches_by_participant(
    pool: &SqlitePool,
    username: &str,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS n FROM matches
         WHERE status = 'COMPLETED'
           AND (player1_username = ?1 COLLATE NOCASE
             OR player2_username = ?1 COLLATE NOCASE)",
    )
    .bind(username)
    .fetch_one(pool)
    .await?;
    Ok(row.get("n"))
}

// ── Row types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PlayerRow {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub elo: i32,
    pub peak_elo: i32,
    pub wins: i32,
    pub losses: i32,
}

#[derive(Debug, Clone)]
pub struct RefreshTokenRow {
    pub token: String,
    pub player_id: String,
    pub expires_at: String,
    pub revoked: bool,
}

#[derive(Debug, Clone)]
pub struct CharacterStatsRow {
    pub id: i64,
    pub player_id: String,
    pub character_name: String,
    pub elo: i32,
    pub peak_elo: i32,
    pub wins: i32,
    pub losses: i32,
}

impl CharacterStatsRow {
    pub fn total_games(&self) -> i32 {
        self.wins + self.losses
    }
}

#[derive(Debug, Clone)]
pub struct MatchRow {
    pub id: String,
    pub player1_username: String,
    pub player2_username: String,
    pub winner_username: Option<String>,
    pub player1_id: Option<String>,
    pub player2_id: Option<String>,
    pub winner_id: Option<String>,
    pub player1_character: Option<String>,
    pub player2_character: Option<String>,
    pub status: String,
    pub played_at: String,
    pub player1_elo_before: Option<i32>,
    pub player1_elo_after: Option<i32>,
    pub player2_elo_before: Option<i32>,
    pub player2_elo_after: Option<i32>,
    pub player1_k_factor: Option<i32>,
    pub player2_k_factor: Option<i32>,
}

impl MatchRow {
    /// Fresh ACTIVE match between two participants.
    pub fn new(
        id: String,
        player1_username: String,
        player2_username: String,
        player1_id: Option<String>,
        player2_id: Option<String>,
        player1_character: Option<String>,
        player2_character: Option<String>,
    ) -> Self {
        MatchRow {
            id,
            player1_username,
            player2_username,
            winner_username: None,
            player1_id,
            player2_id,
            winner_id: None,
            player1_character,
            player2_character,
            status: "ACTIVE".to_string(),
            played_at: chrono::Utc::now().to_rfc3339(),
            player1_elo_before: None,
            player1_elo_after: None,
            player2_elo_before: None,
            player2_elo_after: None,
            player1_k_factor: None,
            player2_k_factor: None,
        }
    }

    pub fn is_participant(&self, username: &str) -> bool {
        self.player1_username.eq_ignore_ascii_case(username)
            || self.player2_username.eq_ignore_ascii_case(username)
    }

    pub fn player1_elo_delta(&self) -> Option<i32> {
        Some(self.player1_elo_after? - self.player1_elo_before?)
    }

    pub fn player2_elo_delta(&self) -> Option<i32> {
        Some(self.player2_elo_after? - self.player2_elo_before?)
    }
}

fn player_from_row(r: sqlx::sqlite::SqliteRow) -> PlayerRow {
    PlayerRow {
        id: r.get("id"),
        username: r.get("username"),
        password_hash: r.get("password_hash"),
        elo: r.get("elo"),
        peak_elo: r.get("peak_elo"),
        wins: r.get("wins"),
        losses: r.get("losses"),
    }
}

fn character_stats_from_row(r: sqlx::sqlite::SqliteRow) -> CharacterStatsRow {
    CharacterStatsRow {
        id: r.get("id"),
        player_id: r.get("player_id"),
        character_name: r.get("character_name"),
        elo: r.get("elo"),
        peak_elo: r.get("peak_elo"),
        wins: r.get("wins"),
        losses: r.get("losses"),
    }
}

fn match_from_row(r: sqlx::sqlite::SqliteRow) -> MatchRow {
    MatchRow {
        id: r.get("id"),
        player1_username: r.get("player1_username"),
        player2_username: r.get("player2_username"),
        winner_username: r.get("winner_username"),
        player1_id: r.get("player1_id"),
        player2_id: r.get("player2_id"),
        winner_id: r.get("winner_id"),
        player1_character: r.get("player1_character"),
        player2_character: r.get("player2_character"),
        status: r.get("status"),
        played_at: r.get("played_at"),
        player1_elo_before: r.get("player1_elo_before"),
        player1_elo_after: r.get("player1_elo_after"),
        player2_elo_before: r.get("player2_elo_before"),
        player2_elo_after: r.get("player2_elo_after"),
        player1_k_factor: r.get("player1_k_factor"),
        player2_k_factor: r.get("player2_k_factor"),
    }
}
