use sqlx::SqlitePool;

use crate::db::models::WatchRow;
use crate::error::Result;
use crate::types::Watch;

#[derive(Clone)]
pub struct WatchRepo {
    pool: SqlitePool,
}

impl WatchRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn enabled(&self) -> Result<Vec<Watch>> {
        let rows = sqlx::query_as::<_, WatchRow>("SELECT * FROM watches WHERE disabled = 0")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Watch::from).collect())
    }

    pub async fn disabled(&self) -> Result<Vec<Watch>> {
        let rows = sqlx::query_as::<_, WatchRow>("SELECT * FROM watches WHERE disabled = 1")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Watch::from).collect())
    }

    /// Watches waiting for a notification mail.
    pub async fn triggered_unnotified(&self) -> Result<Vec<Watch>> {
        let rows = sqlx::query_as::<_, WatchRow>(
            "SELECT * FROM watches WHERE disabled = 0 AND triggered = 1 AND mail_sent = 0",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Watch::from).collect())
    }

    pub async fn find(&self, id: i64) -> Result<Option<Watch>> {
        let row = sqlx::query_as::<_, WatchRow>("SELECT * FROM watches WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Watch::from))
    }

    pub async fn create(&self, watch: &Watch) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO watches \
             (character_id, location_id, type_id, type_name, is_buy, comparator, \
              threshold, triggered, mail_sent, disabled, created) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(watch.character_id)
        .bind(watch.location_id)
        .bind(watch.type_id)
        .bind(&watch.type_name)
        .bind(watch.side.is_buy())
        .bind(watch.comparator.as_str())
        .bind(watch.threshold)
        .bind(watch.triggered)
        .bind(watch.mail_sent)
        .bind(watch.disabled)
        .bind(watch.created)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn save(&self, watch: &Watch) -> Result<()> {
        sqlx::query(
            "UPDATE watches SET character_id = ?, location_id = ?, type_id = ?, \
             type_name = ?, is_buy = ?, comparator = ?, threshold = ?, \
             triggered = ?, mail_sent = ?, disabled = ?, created = ? WHERE id = ?",
        )
        .bind(watch.character_id)
        .bind(watch.location_id)
        .bind(watch.type_id)
        .bind(&watch.type_name)
        .bind(watch.side.is_buy())
        .bind(watch.comparator.as_str())
        .bind(watch.threshold)
        .bind(watch.triggered)
        .bind(watch.mail_sent)
        .bind(watch.disabled)
        .bind(watch.created)
        .bind(watch.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_mail_sent(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut query = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "UPDATE watches SET mail_sent = 1 WHERE id IN (",
        );
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        query.push(")");
        query.build().execute(&self.pool).await?;
        Ok(())
    }

    /// ACL revocation: only the affected (character, location) watches go dark.
    pub async fn disable_at_location(&self, character_id: i64, location_id: i64) -> Result<()> {
        sqlx::query("UPDATE watches SET disabled = 1 WHERE character_id = ? AND location_id = ?")
            .bind(character_id)
            .bind(location_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn disable_for_character(&self, character_id: i64) -> Result<()> {
        sqlx::query("UPDATE watches SET disabled = 1 WHERE character_id = ?")
            .bind(character_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn enable_at_location(&self, character_id: i64, location_id: i64) -> Result<()> {
        sqlx::query("UPDATE watches SET disabled = 0 WHERE character_id = ? AND location_id = ?")
            .bind(character_id)
            .bind(location_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
