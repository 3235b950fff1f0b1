use sqlx::SqlitePool;

use crate::db::models::StructureRow;
use crate::error::Result;
use crate::types::Structure;

#[derive(Clone)]
pub struct StructureRepo {
    pool: SqlitePool,
}

impl StructureRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, structure_id: i64) -> Result<Option<Structure>> {
        let row =
            sqlx::query_as::<_, StructureRow>("SELECT * FROM structures WHERE structure_id = ?")
                .bind(structure_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Structure::from))
    }

    pub async fn all(&self) -> Result<Vec<Structure>> {
        let rows = sqlx::query_as::<_, StructureRow>("SELECT * FROM structures")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Structure::from).collect())
    }

    pub async fn save(&self, structure: &Structure) -> Result<()> {
        sqlx::query(
            "INSERT INTO structures \
             (structure_id, structure_name, type_id, npc_station, market_service, region_id) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(structure_id) DO UPDATE SET \
             structure_name = excluded.structure_name, \
             type_id = excluded.type_id, \
             npc_station = excluded.npc_station, \
             market_service = excluded.market_service, \
             region_id = excluded.region_id",
        )
        .bind(structure.structure_id)
        .bind(&structure.structure_name)
        .bind(structure.type_id)
        .bind(structure.npc_station)
        .bind(structure.market_service)
        .bind(structure.region_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a lazily resolved region so later sweeps skip the lookup hops.
    pub async fn set_region(&self, structure_id: i64, region_id: i64) -> Result<()> {
        sqlx::query("UPDATE structures SET region_id = ? WHERE structure_id = ?")
            .bind(region_id)
            .bind(structure_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
