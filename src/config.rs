//! Bot configuration from environment variables
//!
//! Community token tables live in a separate JSON file (see
//! `engine::tokens::TokenRegistry::load`); everything else is env vars with
//! defaults.

use std::env;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite ledger database
    pub db_path: String,

    /// Path to the community tokens JSON file
    pub tokens_path: String,

    /// Tip command trigger token
    pub tip_trigger: String,

    /// Register command trigger token
    pub register_trigger: String,

    /// Bot's own handle on the platform; its comments are skipped
    pub bot_username: String,

    /// URL of the published governance-weight snapshot, if any
    pub weights_url: Option<String>,

    /// Snapshot refresh interval in seconds
    pub weight_refresh_secs: u64,

    /// Raw weight that maps to a computed weight of 1.0
    pub max_weight: u64,

    /// Help link used in registration prompts and reply signatures
    pub register_help_url: String,

    /// Base URL for the on-chain tipping fallback link
    pub tip_link_base: String,

    /// Channel buffer size for inbound comments
    pub channel_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `TIPSTREAM_DB_PATH` (default: tipstream.db)
    /// - `TIPSTREAM_TOKENS_PATH` (default: community_tokens.json)
    /// - `TIP_TRIGGER` (default: !tip)
    /// - `REGISTER_TRIGGER` (default: !register)
    /// - `BOT_USERNAME` (default: tipstream-bot)
    /// - `WEIGHTS_URL` (default: unset; weights stay 0)
    /// - `WEIGHT_REFRESH_SECS` (default: 21600, i.e. 6h)
    /// - `MAX_WEIGHT` (default: 20000)
    /// - `REGISTER_HELP_URL` (default: https://example.org/register)
    /// - `TIP_LINK_BASE` (default: https://www.donut.finance/tip/)
    /// - `COMMENT_CHANNEL_BUFFER` (default: 1000)
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("TIPSTREAM_DB_PATH").unwrap_or_else(|_| "tipstream.db".to_string()),

            tokens_path: env::var("TIPSTREAM_TOKENS_PATH")
                .unwrap_or_else(|_| "community_tokens.json".to_string()),

            tip_trigger: env::var("TIP_TRIGGER").unwrap_or_else(|_| "!tip".to_string()),

            register_trigger: env::var("REGISTER_TRIGGER")
                .unwrap_or_else(|_| "!register".to_string()),

            bot_username: env::var("BOT_USERNAME").unwrap_or_else(|_| "tipstream-bot".to_string()),

            weights_url: env::var("WEIGHTS_URL").ok().filter(|s| !s.is_empty()),

            weight_refresh_secs: env::var("WEIGHT_REFRESH_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(21_600),

            max_weight: env::var("MAX_WEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20_000),

            register_help_url: env::var("REGISTER_HELP_URL")
                .unwrap_or_else(|_| "https://example.org/register".to_string()),

            tip_link_base: env::var("TIP_LINK_BASE")
                .unwrap_or_else(|_| "https://www.donut.finance/tip/".to_string()),

            channel_buffer: env::var("COMMENT_CHANNEL_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1_000),
        }
    }
}
