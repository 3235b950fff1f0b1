use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// Which half of the order book a watch or snapshot refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Sell,
    Buy,
}

impl Side {
    pub fn from_is_buy(is_buy: bool) -> Self {
        if is_buy { Side::Buy } else { Side::Sell }
    }

    pub fn is_buy(self) -> bool {
        matches!(self, Side::Buy)
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Sell => write!(f, "sell"),
            Side::Buy => write!(f, "buy"),
        }
    }
}

// ---------------------------------------------------------------------------
// Comparator
// ---------------------------------------------------------------------------

/// The threshold relation a watch tests. Unknown strings fall back to `Lt`,
/// which is also the default for watches created without a comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    pub fn parse(s: &str) -> Self {
        match s {
            "le" => Comparator::Le,
            "gt" => Comparator::Gt,
            "ge" => Comparator::Ge,
            _ => Comparator::Lt,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Comparator::Lt => "lt",
            Comparator::Le => "le",
            Comparator::Gt => "gt",
            Comparator::Ge => "ge",
        }
    }

    pub fn holds(self, amount: i64, threshold: i64) -> bool {
        match self {
            Comparator::Lt => amount < threshold,
            Comparator::Le => amount <= threshold,
            Comparator::Gt => amount > threshold,
            Comparator::Ge => amount >= threshold,
        }
    }

    /// Notification wording for a crossed threshold.
    pub fn phrase(self) -> &'static str {
        match self {
            Comparator::Lt => "below",
            Comparator::Le => "at or below",
            Comparator::Gt => "above",
            Comparator::Ge => "at or above",
        }
    }

    /// Whether a missing snapshot (no orders at all) satisfies this
    /// comparator. `gt`/`ge` can never fire on an empty market.
    pub fn absence_sensitive(self, threshold: i64) -> bool {
        match self {
            Comparator::Lt => true,
            Comparator::Le => threshold > 0,
            Comparator::Gt | Comparator::Ge => false,
        }
    }
}

impl std::fmt::Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stored entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Watch {
    pub id: i64,
    pub character_id: i64,
    pub location_id: i64,
    pub type_id: i64,
    pub type_name: String,
    pub side: Side,
    pub comparator: Comparator,
    pub threshold: i64,
    pub triggered: bool,
    pub mail_sent: bool,
    pub disabled: bool,
    /// Unix seconds.
    pub created: i64,
}

/// A market venue — either an NPC station or a player-owned structure.
/// `market_service` is only reported for NPC stations; `region_id` stays
/// empty until the sweep first needs it.
#[derive(Debug, Clone)]
pub struct Structure {
    pub structure_id: i64,
    pub structure_name: String,
    pub type_id: i64,
    pub npc_station: bool,
    pub market_service: bool,
    pub region_id: Option<i64>,
}

/// Latest aggregated order volume for one (item, location, side).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub type_id: i64,
    pub location_id: i64,
    pub side: Side,
    pub amount: i64,
}

#[derive(Debug, Clone)]
pub struct Account {
    pub character_id: i64,
    pub refresh_token: String,
    pub access_token: Option<String>,
    /// Unix seconds, already shortened by the expiry buffer.
    pub access_token_expiry: Option<i64>,
    pub error_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailStatus {
    New,
    Sent,
    Failed,
}

impl MailStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "SENT" => MailStatus::Sent,
            "FAILED" => MailStatus::Failed,
            _ => MailStatus::New,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MailStatus::New => "NEW",
            MailStatus::Sent => "SENT",
            MailStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for MailStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Mail {
    pub id: i64,
    pub recipient: i64,
    pub subject: String,
    pub body: String,
    pub status: MailStatus,
    pub priority: i64,
    pub created: i64,
}
