use sqlx::SqlitePool;

use crate::db::models::SnapshotRow;
use crate::error::Result;
use crate::types::{Side, Snapshot};

#[derive(Clone)]
pub struct SnapshotRepo {
    pool: SqlitePool,
}

impl SnapshotRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(
        &self,
        type_id: i64,
        location_id: i64,
        side: Side,
    ) -> Result<Option<Snapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM snapshots WHERE type_id = ? AND location_id = ? AND is_buy = ?",
        )
        .bind(type_id)
        .bind(location_id)
        .bind(side.is_buy())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Snapshot::from))
    }

    pub async fn all(&self) -> Result<Vec<Snapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>("SELECT * FROM snapshots")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Snapshot::from).collect())
    }

    /// Write the snapshot unless the stored amount already matches.
    /// Returns whether a row was written.
    pub async fn upsert_if_changed(&self, snapshot: &Snapshot) -> Result<bool> {
        let existing = self
            .find(snapshot.type_id, snapshot.location_id, snapshot.side)
            .await?;
        if existing.map(|s| s.amount) == Some(snapshot.amount) {
            return Ok(false);
        }
        sqlx::query(
            "INSERT INTO snapshots (type_id, location_id, is_buy, amount) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(type_id, location_id, is_buy) DO UPDATE SET \
             amount = excluded.amount",
        )
        .bind(snapshot.type_id)
        .bind(snapshot.location_id)
        .bind(snapshot.side.is_buy())
        .bind(snapshot.amount)
        .execute(&self.pool)
        .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn snapshot(amount: i64) -> Snapshot {
        Snapshot { type_id: 608, location_id: 60003760, side: Side::Sell, amount }
    }

    #[tokio::test]
    async fn unchanged_amount_is_not_rewritten() {
        let repo = SnapshotRepo::new(test_pool().await);

        assert!(repo.upsert_if_changed(&snapshot(42)).await.unwrap());
        assert!(!repo.upsert_if_changed(&snapshot(42)).await.unwrap());
        assert!(repo.upsert_if_changed(&snapshot(43)).await.unwrap());

        let stored = repo.find(608, 60003760, Side::Sell).await.unwrap().unwrap();
        assert_eq!(stored.amount, 43);
    }

    #[tokio::test]
    async fn sides_are_tracked_independently() {
        let repo = SnapshotRepo::new(test_pool().await);

        repo.upsert_if_changed(&snapshot(10)).await.unwrap();
        let buy = Snapshot { side: Side::Buy, ..snapshot(7) };
        repo.upsert_if_changed(&buy).await.unwrap();

        assert_eq!(repo.find(608, 60003760, Side::Sell).await.unwrap().unwrap().amount, 10);
        assert_eq!(repo.find(608, 60003760, Side::Buy).await.unwrap().unwrap().amount, 7);
    }
}
