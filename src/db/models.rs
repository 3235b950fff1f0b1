//! Database row types. Kept separate from the domain types so enum and
//! side columns can stay plain SQLite scalars.

use crate::types::{Account, Comparator, Mail, MailStatus, Side, Snapshot, Structure, Watch};

#[derive(Debug, sqlx::FromRow)]
pub struct WatchRow {
    pub id: i64,
    pub character_id: i64,
    pub location_id: i64,
    pub type_id: i64,
    pub type_name: String,
    pub is_buy: bool,
    pub comparator: String,
    pub threshold: i64,
    pub triggered: bool,
    pub mail_sent: bool,
    pub disabled: bool,
    pub created: i64,
}

impl From<WatchRow> for Watch {
    fn from(row: WatchRow) -> Self {
        Watch {
            id: row.id,
            character_id: row.character_id,
            location_id: row.location_id,
            type_id: row.type_id,
            type_name: row.type_name,
            side: Side::from_is_buy(row.is_buy),
            comparator: Comparator::parse(&row.comparator),
            threshold: row.threshold,
            triggered: row.triggered,
            mail_sent: row.mail_sent,
            disabled: row.disabled,
            created: row.created,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct StructureRow {
    pub structure_id: i64,
    pub structure_name: String,
    pub type_id: i64,
    pub npc_station: bool,
    pub market_service: bool,
    pub region_id: Option<i64>,
}

impl From<StructureRow> for Structure {
    fn from(row: StructureRow) -> Self {
        Structure {
            structure_id: row.structure_id,
            structure_name: row.structure_name,
            type_id: row.type_id,
            npc_station: row.npc_station,
            market_service: row.market_service,
            region_id: row.region_id,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct SnapshotRow {
    pub type_id: i64,
    pub location_id: i64,
    pub is_buy: bool,
    pub amount: i64,
}

impl From<SnapshotRow> for Snapshot {
    fn from(row: SnapshotRow) -> Self {
        Snapshot {
            type_id: row.type_id,
            location_id: row.location_id,
            side: Side::from_is_buy(row.is_buy),
            amount: row.amount,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct AccountRow {
    pub character_id: i64,
    pub refresh_token: String,
    pub access_token: Option<String>,
    pub access_token_expiry: Option<i64>,
    pub error_count: i64,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            character_id: row.character_id,
            refresh_token: row.refresh_token,
            access_token: row.access_token,
            access_token_expiry: row.access_token_expiry,
            error_count: row.error_count,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct MailRow {
    pub id: i64,
    pub recipient: i64,
    pub subject: String,
    pub body: String,
    pub status: String,
    pub priority: i64,
    pub created: i64,
}

impl From<MailRow> for Mail {
    fn from(row: MailRow) -> Self {
        Mail {
            id: row.id,
            recipient: row.recipient,
            subject: row.subject,
            body: row.body,
            status: MailStatus::parse(&row.status),
            priority: row.priority,
            created: row.created,
        }
    }
}
