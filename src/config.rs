use std::env;
use std::path::PathBuf;

use crate::economy::RewardSplit;

/// Runtime configuration, resolved once at startup from the environment
/// (`.env` supported via dotenvy) and injected through `AppState`. Live
/// economic parameters are tuned later through the admin surface, never by
/// re-reading the environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    pub store_path: PathBuf,
    pub tick_ms: u64,
    pub flush_ms: u64,
    pub leaderboard_ms: u64,
    /// Sessions idle longer than this stop receiving tick folds.
    pub session_idle_ms: i64,
    pub initial_difficulty: f64,
    pub split: RewardSplit,
    /// Admin endpoints are disabled when unset.
    pub admin_key: Option<String>,
    /// External-currency purchases are disabled when unset.
    pub payment_pubkey: Option<String>,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, &'static str> {
        let split = RewardSplit {
            closer_pct: env_parse("REWARD_CLOSER_PCT", 0.70),
            shared_pct: env_parse("REWARD_SHARED_PCT", 0.20),
            fee_pct: env_parse("REWARD_FEE_PCT", 0.10),
        };
        split.validate()?;

        let config = Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_parse("PORT", 8080),
            store_path: env::var("STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("hashgrid-state.json")),
            tick_ms: env_parse("TICK_MS", 1_000),
            flush_ms: env_parse("FLUSH_MS", 30_000),
            leaderboard_ms: env_parse("LEADERBOARD_MS", 5_000),
            session_idle_ms: env_parse("SESSION_IDLE_MS", 60_000),
            initial_difficulty: env_parse("INITIAL_DIFFICULTY", 10_000.0),
            split,
            admin_key: env::var("ADMIN_KEY").ok().filter(|k| !k.is_empty()),
            payment_pubkey: env::var("PAYMENT_PUBKEY").ok().filter(|k| !k.is_empty()),
        };

        if config.tick_ms == 0 {
            return Err("TICK_MS must be positive");
        }
        if config.initial_difficulty <= 0.0 {
            return Err("INITIAL_DIFFICULTY must be positive");
        }
        Ok(config)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            store_path: PathBuf::from("hashgrid-state.json"),
            tick_ms: 1_000,
            flush_ms: 30_000,
            leaderboard_ms: 5_000,
            session_idle_ms: 60_000,
            initial_difficulty: 10_000.0,
            split: RewardSplit::default(),
            admin_key: None,
            payment_pubkey: None,
        }
    }
}
