use anyhow::Result;
use sqlx::{Pool, Sqlite, migrate::MigrateDatabase, sqlite::SqlitePoolOptions};
use std::time::Duration;

pub mod api_key_store;
pub mod email_log_store;
pub mod location_store;
pub mod shipment_store;

pub type DbPool = Pool<Sqlite>;

/// Initialize the database connection pool
pub async fn init_db_pool(database_url: &str, max_connections: u32) -> Result<DbPool> {
    // Create the database if it doesn't exist
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        Sqlite::create_database(database_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await?;

    setup_database(&pool).await?;

    Ok(pool)
}

/// Set up the database schema
pub async fn setup_database(pool: &DbPool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS locations (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL UNIQUE,
        recipient_emails TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS shipments (
        id TEXT PRIMARY KEY NOT NULL,
        short_id TEXT NOT NULL UNIQUE,
        status TEXT NOT NULL DEFAULT 'PENDING',
        sender_name TEXT NOT NULL,
        sender_email TEXT NOT NULL,
        carrier TEXT,
        tracking_number TEXT,
        notes TEXT,
        recipient_name TEXT,
        recipient_email TEXT,
        signature TEXT,
        received_at TEXT,
        notify_emails TEXT NOT NULL DEFAULT '[]',
        location_id TEXT NOT NULL REFERENCES locations(id),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS devices (
        id TEXT PRIMARY KEY NOT NULL,
        shipment_id TEXT NOT NULL REFERENCES shipments(id) ON DELETE CASCADE,
        serial_number TEXT NOT NULL,
        asset_tag TEXT,
        model TEXT,
        is_checked_in INTEGER NOT NULL DEFAULT 0,
        checked_in_at TEXT,
        is_extra INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        UNIQUE (shipment_id, serial_number),
        CHECK ((is_checked_in = 0 AND checked_in_at IS NULL)
            OR (is_checked_in = 1 AND checked_in_at IS NOT NULL))
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS api_keys (
        id TEXT PRIMARY KEY NOT NULL,
        key_hash TEXT NOT NULL,
        description TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        last_used_at TEXT,
        created_at TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS email_logs (
        id TEXT PRIMARY KEY NOT NULL,
        shipment_id TEXT REFERENCES shipments(id) ON DELETE SET NULL,
        recipient TEXT NOT NULL,
        subject TEXT NOT NULL,
        kind TEXT NOT NULL,
        status TEXT NOT NULL,
        error TEXT,
        created_at TEXT NOT NULL
    );
    "#,
    "CREATE INDEX IF NOT EXISTS idx_devices_shipment ON devices (shipment_id);",
    "CREATE INDEX IF NOT EXISTS idx_shipments_location ON shipments (location_id);",
    "CREATE INDEX IF NOT EXISTS idx_email_logs_shipment ON email_logs (shipment_id);",
];

#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    // A single connection keeps every query on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    setup_database(&pool)
        .await
        .expect("Failed to create schema");
    pool
}

/// File-backed pool for tests that need several connections racing each
/// other. The database lives as long as the returned directory.
#[cfg(test)]
pub(crate) async fn file_test_pool(max_connections: u32) -> (tempfile::TempDir, DbPool) {
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("shipments.db"))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(10));
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .expect("Failed to open file database");
    setup_database(&pool)
        .await
        .expect("Failed to create schema");
    (dir, pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_setup_database_is_idempotent() {
        let pool = test_pool().await;
        setup_database(&pool).await.unwrap();

        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('locations', 'shipments', 'devices', 'api_keys', 'email_logs')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count.0, 5);
    }

    #[tokio::test]
    async fn test_foreign_keys_are_enforced() {
        let pool = test_pool().await;
        let result = sqlx::query(
            "INSERT INTO shipments (id, short_id, sender_name, sender_email, location_id, created_at, updated_at) \
             VALUES ('s1', 'ABCDEF', 'A', 'a@x.io', 'missing', '2024-01-01', '2024-01-01')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }
}
