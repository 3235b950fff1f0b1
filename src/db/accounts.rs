use sqlx::SqlitePool;

use crate::db::models::AccountRow;
use crate::error::Result;
use crate::types::Account;

#[derive(Clone)]
pub struct AccountRepo {
    pool: SqlitePool,
}

impl AccountRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, character_id: i64) -> Result<Option<Account>> {
        let row =
            sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE character_id = ?")
                .bind(character_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Account::from))
    }

    pub async fn all(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Account::from).collect())
    }

    pub async fn save(&self, account: &Account) -> Result<()> {
        sqlx::query(
            "INSERT INTO accounts \
             (character_id, refresh_token, access_token, access_token_expiry, error_count) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(character_id) DO UPDATE SET \
             refresh_token = excluded.refresh_token, \
             access_token = excluded.access_token, \
             access_token_expiry = excluded.access_token_expiry, \
             error_count = excluded.error_count",
        )
        .bind(account.character_id)
        .bind(&account.refresh_token)
        .bind(&account.access_token)
        .bind(account.access_token_expiry)
        .bind(account.error_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, character_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM accounts WHERE character_id = ?")
            .bind(character_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
