//! Typed ESI response/request bodies. Only the fields the pipeline reads
//! are declared; everything else in the payloads is ignored.

use serde::{Deserialize, Serialize};

/// One open order, as returned by both the structure and the region
/// market endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketOrder {
    pub type_id: i64,
    pub location_id: i64,
    #[serde(default)]
    pub is_buy_order: bool,
    pub volume_remain: i64,
}

/// `/v2/search/` and `/v3/characters/{id}/search/` — each category key is
/// absent when nothing matched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub station: Option<Vec<i64>>,
    #[serde(default)]
    pub structure: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationInfo {
    pub name: String,
    pub type_id: i64,
    pub system_id: i64,
    #[serde(default)]
    pub services: Vec<String>,
}

/// `/v2/universe/structures/{id}/` — `type_id` is genuinely optional in
/// the upstream schema.
#[derive(Debug, Clone, Deserialize)]
pub struct StructureInfo {
    pub name: String,
    #[serde(default)]
    pub type_id: Option<i64>,
    pub solar_system_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemInfo {
    pub constellation_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConstellationInfo {
    pub region_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub expires_in: i64,
}

// ---------------------------------------------------------------------------
// Outbound mail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct MailRecipient {
    pub recipient_id: i64,
    pub recipient_type: &'static str,
}

impl MailRecipient {
    pub fn character(character_id: i64) -> Self {
        Self { recipient_id: character_id, recipient_type: "character" }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MailRequest {
    pub recipients: Vec<MailRecipient>,
    pub subject: String,
    pub body: String,
}
