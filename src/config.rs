use crate::error::{AppError, Result};

pub const ESI_BASE_URL: &str = "https://esi.evetech.net";
pub const LOGIN_TOKEN_URL: &str = "https://login.eveonline.com/oauth/token";

/// Per-request timeout for all outbound HTTP calls (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Access tokens are considered expired this many seconds before their
/// nominal lifetime runs out, so a token never dies mid-request.
pub const TOKEN_EXPIRY_BUFFER_SECS: i64 = 120;

/// Concurrent name-resolution calls during a location search.
pub const MAX_CONCURRENT_RESOLVES: usize = 50;

/// Search terms shorter than this are not forwarded to ESI.
pub const MIN_SEARCH_TERM_LEN: usize = 4;

/// A search response is capped at this many locations.
pub const SEARCH_RESULT_CAP: usize = 10;

/// A watch with no matching snapshot is left alone until it is at least
/// this old — the market may simply not have been swept yet.
pub const MISSING_SNAPSHOT_GRACE_SECS: i64 = 10 * 60;

/// Maximum watches per notification mail.
pub const MAIL_CHUNK_SIZE: usize = 100;

/// Consecutive auth failures before an account is deactivated.
pub const MAX_AUTH_ERRORS: i64 = 5;

/// Watch notifications outrank administrative mail in the send queue.
pub const NOTIFICATION_PRIORITY: i64 = 10;
pub const ADMIN_PRIORITY: i64 = 1;

/// Structure type ids that can never host a market.
pub const IGNORED_STRUCTURE_TYPES: &[i64] = &[
    35825, // Raitaru
    35835, // Athanor
    35836, // Tatara
    35841, // Ansiblex jump gate
    35840, // Pharolux cyno beacon
    37534, // Tenebrex cyno jammer
    27674, // Cynosural system jammer
];

#[derive(Debug, Clone)]
pub struct Config {
    pub esi_base_url: String,
    pub token_url: String,
    pub log_level: String,
    pub db_path: String,
    /// OAuth client for user token refresh (APP_CLIENT_ID / APP_CLIENT_SECRET)
    pub client_id: String,
    pub client_secret: String,
    /// Dedicated outbound-mail character (MAIL_CHARACTER_ID, MAIL_CLIENT_ID,
    /// MAIL_CLIENT_SECRET, MAIL_REFRESH_TOKEN)
    pub mail_character_id: i64,
    pub mail_client_id: String,
    pub mail_client_secret: String,
    pub mail_refresh_token: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            esi_base_url: std::env::var("ESI_BASE_URL")
                .unwrap_or_else(|_| ESI_BASE_URL.to_string()),
            token_url: std::env::var("TOKEN_URL")
                .unwrap_or_else(|_| LOGIN_TOKEN_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "marketwatch.db".to_string()),
            client_id: std::env::var("APP_CLIENT_ID").unwrap_or_default(),
            client_secret: std::env::var("APP_CLIENT_SECRET").unwrap_or_default(),
            mail_character_id: std::env::var("MAIL_CHARACTER_ID")
                .unwrap_or_else(|_| "0".to_string())
                .parse::<i64>()
                .map_err(|_| {
                    AppError::Config("MAIL_CHARACTER_ID must be a character id".to_string())
                })?,
            mail_client_id: std::env::var("MAIL_CLIENT_ID").unwrap_or_default(),
            mail_client_secret: std::env::var("MAIL_CLIENT_SECRET").unwrap_or_default(),
            mail_refresh_token: std::env::var("MAIL_REFRESH_TOKEN").unwrap_or_default(),
        })
    }
}
