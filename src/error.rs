use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("no stored credential for character {0}")]
    UnknownAccount(i64),

    #[error("credential rejected upstream (HTTP {0})")]
    InvalidCredential(u16),

    #[error("market access denied (HTTP {0})")]
    AccessDenied(u16),

    #[error("upstream temporarily unavailable (HTTP {0})")]
    Transient(u16),

    #[error("unexpected upstream response (HTTP {0})")]
    Unclassified(u16),

    #[error("no account could read market at location {0}")]
    MarketUnavailable(i64),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }
}

/// Map a non-success ESI status onto the pipeline's failure kinds.
///
/// 420 is ESI's error-rate limit and clears on its own, so it is grouped
/// with the 5xx class.
pub fn classify_status(status: reqwest::StatusCode) -> AppError {
    match status.as_u16() {
        401 => AppError::InvalidCredential(401),
        403 => AppError::AccessDenied(403),
        420 => AppError::Transient(420),
        s if s >= 500 => AppError::Transient(s),
        s => AppError::Unclassified(s),
    }
}
