pub mod accounts;
pub mod mails;
pub mod models;
pub mod snapshots;
pub mod structures;
pub mod watches;

pub use accounts::AccountRepo;
pub use mails::MailRepo;
pub use snapshots::SnapshotRepo;
pub use structures::StructureRepo;
pub use watches::WatchRepo;

/// Single-connection in-memory database with the schema applied. SQLite
/// gives every connection its own `:memory:` database, so the pool must
/// not grow past one.
#[cfg(test)]
pub async fn test_pool() -> sqlx::SqlitePool {
    use sqlx::sqlite::SqlitePoolOptions;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");
    pool
}
