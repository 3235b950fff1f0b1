use sqlx::SqlitePool;

use crate::db::models::MailRow;
use crate::error::Result;
use crate::types::{now_secs, Mail, MailStatus};

#[derive(Clone)]
pub struct MailRepo {
    pool: SqlitePool,
}

impl MailRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Queue a mail for dispatch. Returns the new mail's id.
    pub async fn queue(
        &self,
        recipient: i64,
        subject: &str,
        body: &str,
        priority: i64,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO mails (recipient, subject, body, status, priority, created) \
             VALUES (?, ?, ?, 'NEW', ?, ?)",
        )
        .bind(recipient)
        .bind(subject)
        .bind(body)
        .bind(priority)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// The next mail to dispatch: highest priority first, oldest within a
    /// priority.
    pub async fn next_new(&self) -> Result<Option<Mail>> {
        let row = sqlx::query_as::<_, MailRow>(
            "SELECT * FROM mails WHERE status = 'NEW' \
             ORDER BY priority DESC, created ASC, id ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Mail::from))
    }

    pub async fn find(&self, id: i64) -> Result<Option<Mail>> {
        let row = sqlx::query_as::<_, MailRow>("SELECT * FROM mails WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Mail::from))
    }

    pub async fn all(&self) -> Result<Vec<Mail>> {
        let rows = sqlx::query_as::<_, MailRow>("SELECT * FROM mails ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Mail::from).collect())
    }

    pub async fn set_status(&self, id: i64, status: MailStatus) -> Result<()> {
        sqlx::query("UPDATE mails SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn highest_priority_dispatches_first() {
        let repo = MailRepo::new(test_pool().await);

        let bulk = repo.queue(1, "maintenance", "downtime", 1).await.unwrap();
        let notify = repo.queue(2, "watch", "triggered", 10).await.unwrap();

        let next = repo.next_new().await.unwrap().unwrap();
        assert_eq!(next.id, notify);

        repo.set_status(notify, MailStatus::Sent).await.unwrap();
        let next = repo.next_new().await.unwrap().unwrap();
        assert_eq!(next.id, bulk);

        repo.set_status(bulk, MailStatus::Failed).await.unwrap();
        assert!(repo.next_new().await.unwrap().is_none());
    }
}
