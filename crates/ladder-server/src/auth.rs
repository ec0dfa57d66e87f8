use std::sync::Arc;

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use ladder_core::protocol::AuthResponse;

use crate::config::Config;
use crate::db;
use crate::error::ApiError;
use crate::state::AppState;

/// Access-token claims: `sub` is the stable player id, `username` the
/// routing handle for push delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn generate_access_token(config: &Config, user_id: &str, username: &str) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::milliseconds(config.access_token_ttl_ms)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::AuthFailure(format!("could not sign token: {}", e)))
}

/// Validate signature + expiry and return the claims.
pub fn verify_access_token(config: &Config, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::AuthFailure("invalid or expired token".to_string()))
}

// ── Password digests ────────────────────────────────────────────────────

/// `salt$digest`, both hex. Digest = SHA-256 over `salt:password`.
pub fn encode_password(password: &str) -> String {
    let salt: [u8; 16] = rand::random();
    let salt = hex::encode(salt);
    let digest = digest_password(&salt, password);
    format!("{}${}", salt, digest)
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, digest)) => digest_password(salt, password) == digest,
        None => false,
    }
}

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

// ── Bearer extraction ───────────────────────────────────────────────────

/// Identity established from the `Authorization: Bearer` header. Every
/// non-auth endpoint requires it.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub username: String,
}

impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::AuthFailure("missing bearer token".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::AuthFailure("missing bearer token".to_string()))?;

        let claims = verify_access_token(&state.config, token)?;
        Ok(AuthenticatedUser {
            user_id: claims.sub,
            username: claims.username,
        })
    }
}

// ── Handlers ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let username = req.username.trim();

    if username.is_empty() {
        return Err(ApiError::Validation("Username is required.".to_string()));
    }
    if username.len() > 20 {
        return Err(ApiError::Validation(
            "Username must be 20 characters or fewer.".to_string(),
        ));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::Validation(
            "Username can only contain letters, numbers, and underscores.".to_string(),
        ));
    }
    if req.password.len() < 6 {
        return Err(ApiError::Validation(
            "Password must be at least 6 characters.".to_string(),
        ));
    }
    if db::username_taken(&state.db, username).await? {
        return Err(ApiError::Busy("Username is already taken.".to_string()));
    }

    let user_id = Uuid::new_v4().to_string();
    db::create_player(&state.db, &user_id, username, &encode_password(&req.password)).await?;
    info!("registered player {} ({})", username, user_id);

    issue_tokens(&state, &user_id, username).await
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let player = db::get_player_by_username(&state.db, &req.username)
        .await?
        .ok_or_else(|| ApiError::AuthFailure("Invalid username or password.".to_string()))?;

    if !verify_password(&req.password, &player.password_hash) {
        warn!("failed login for {}", req.username);
        return Err(ApiError::AuthFailure(
            "Invalid username or password.".to_string(),
        ));
    }

    issue_tokens(&state, &player.id, &player.username).await
}

/// Rotate: the presented refresh token is revoked and a new pair issued.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let stored = db::get_refresh_token(&state.db, &req.refresh_token)
        .await?
        .ok_or_else(|| ApiError::AuthFailure("Invalid refresh token.".to_string()))?;

    let expired = DateTime::parse_from_rfc3339(&stored.expires_at)
        .map(|t| t < Utc::now())
        .unwrap_or(true);
    if stored.revoked || expired {
        return Err(ApiError::AuthFailure(
            "Refresh token is expired or revoked.".to_string(),
        ));
    }

    db::revoke_refresh_token(&state.db, &stored.token).await?;

    let username = db::get_username_by_id(&state.db, &stored.player_id)
        .await?
        .ok_or_else(|| ApiError::AuthFailure("Invalid refresh token.".to_string()))?;

    issue_tokens(&state, &stored.player_id, &username).await
}

async fn issue_tokens(
    state: &AppState,
    user_id: &str,
    username: &str,
) -> Result<Json<AuthResponse>, ApiError> {
    let access_token = generate_access_token(&state.config, user_id, username)?;

    let refresh_token = Uuid::new_v4().to_string();
    let expires_at =
        (Utc::now() + Duration::days(state.config.refresh_token_ttl_days)).to_rfc3339();
    db::insert_refresh_token(&state.db, &refresh_token, user_id, &expires_at).await?;

    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user_id: user_id.to_string(),
        username: username.to_string(),
    }))
}
