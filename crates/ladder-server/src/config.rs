use std::str::FromStr;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// HMAC secret for access-token signing. Required.
    pub jwt_secret: String,
    pub access_token_ttl_ms: i64,
    pub refresh_token_ttl_days: i64,
    /// Recognized but unused by the coordinator: pending reports never
    /// time out in-process.
    pub confirm_window_secs: u64,
    pub rematch_window_secs: u64,
    pub lock_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            jwt_secret: std::env::var("LADDER_JWT_SECRET")
                .expect("LADDER_JWT_SECRET must be set"),
            access_token_ttl_ms: env_or("LADDER_ACCESS_TOKEN_TTL_MS", 3_600_000),
            refresh_token_ttl_days: env_or("LADDER_REFRESH_TOKEN_TTL_DAYS", 30),
            confirm_window_secs: env_or("LADDER_CONFIRM_WINDOW_SECS", 20),
            rematch_window_secs: env_or("LADDER_REMATCH_WINDOW_SECS", 20),
            lock_timeout_ms: env_or("LADDER_LOCK_TIMEOUT_MS", 5_000),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
