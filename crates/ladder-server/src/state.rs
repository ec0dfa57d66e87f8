use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use sqlx::SqlitePool;
use tokio::sync::mpsc;

use ladder_core::protocol::{PoolPlayer, PushMessage};

use crate::config::Config;

/// Handle to push envelopes to a connected WebSocket client.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub username: String,
    pub tx: mpsc::UnboundedSender<PushMessage>,
}

/// First result claim for a match, awaiting the other player's confirm.
#[derive(Debug, Clone)]
pub struct PendingReport {
    pub reporter: String,
    pub claimed_winner: String,
}

/// Rematch offer created at finalization, alive until both accept,
/// either declines, or the window expires.
#[derive(Debug, Clone)]
pub struct PendingRematch {
    pub player1: String,
    pub player2: String,
    /// Lowercased handles that have accepted so far.
    pub accepted: HashSet<String>,
}

/// Shared application state. The coordination maps are process-local;
/// the service runs as a single instance.
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,

    /// Lowercased handle -> interaction id. A handle is present iff the
    /// player is engaged (invite, active match, or rematch window).
    pub player_locks: DashMap<String, String>,
    /// Serializes the both-players-idle check in `invite` so two
    /// overlapping invites cannot both claim the same handle.
    pub invite_guard: tokio::sync::Mutex<()>,
    /// Match id -> first report. Insert-if-absent only.
    pub pending_reports: DashMap<String, PendingReport>,
    /// Match id -> rematch offer.
    pub pending_rematches: DashMap<String, PendingRematch>,
    /// Character-stats row id -> write lock. The rating engine acquires
    /// pairs of these in ascending id order.
    pub stats_locks: DashMap<i64, Arc<tokio::sync::Mutex<()>>>,

    /// Lowercased handle -> live push channel.
    pub connections: DashMap<String, ConnectionHandle>,
    /// Lowercased handle -> pool check-in (current character selection).
    pub pool: DashMap<String, PoolPlayer>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Config) -> Self {
        AppState {
            db,
            config,
            player_locks: DashMap::new(),
            invite_guard: tokio::sync::Mutex::new(()),
            pending_reports: DashMap::new(),
            pending_rematches: DashMap::new(),
            stats_locks: DashMap::new(),
            connections: DashMap::new(),
            pool: DashMap::new(),
        }
    }
}

/// Canonical map key for a handle. Handles are case-preserved for display
/// and lowercase-normalized for every comparison and lookup.
pub fn handle_key(username: &str) -> String {
    username.to_lowercase()
}
