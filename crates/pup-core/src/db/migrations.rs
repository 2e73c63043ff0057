//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

async fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    // inside a transaction for atomicity
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(())
}

/// Migration to version 1: collection tables and the sync queue
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // One mirror table per synced collection. All share the same shape:
        // the full record JSON in `data`, plus denormalized columns for the
        // equality queries the facade exposes.
        "CREATE TABLE IF NOT EXISTS dogs (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            dog_id TEXT,
            date TEXT,
            record_type TEXT,
            data TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_dogs_user ON dogs(user_id)",
        "CREATE TABLE IF NOT EXISTS activities (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            dog_id TEXT,
            date TEXT,
            record_type TEXT,
            data TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_activities_user ON activities(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_activities_dog ON activities(dog_id)",
        "CREATE INDEX IF NOT EXISTS idx_activities_date ON activities(date)",
        "CREATE TABLE IF NOT EXISTS health_records (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            dog_id TEXT,
            date TEXT,
            record_type TEXT,
            data TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_health_records_user ON health_records(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_health_records_dog ON health_records(dog_id)",
        "CREATE INDEX IF NOT EXISTS idx_health_records_type ON health_records(record_type)",
        "CREATE TABLE IF NOT EXISTS vaccinations (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            dog_id TEXT,
            date TEXT,
            record_type TEXT,
            data TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_vaccinations_user ON vaccinations(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_vaccinations_dog ON vaccinations(dog_id)",
        "CREATE INDEX IF NOT EXISTS idx_vaccinations_date ON vaccinations(date)",
        // Durable FIFO queue of mutations awaiting remote replay
        "CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            op_uid TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL,
            collection TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            data TEXT,
            field TEXT,
            value TEXT,
            queued_at INTEGER NOT NULL
        )",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    apply(conn, &statements).await?;
    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: dead-letter table for terminally rejected ops
async fn migrate_v2(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS dead_letter (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            op_uid TEXT NOT NULL,
            kind TEXT NOT NULL,
            collection TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            data TEXT,
            field TEXT,
            value TEXT,
            queued_at INTEGER NOT NULL,
            failed_at INTEGER NOT NULL,
            reason TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_dead_letter_failed_at ON dead_letter(failed_at DESC)",
        "INSERT INTO schema_version (version) VALUES (2)",
    ];

    apply(conn, &statements).await?;
    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap(); // Should not fail

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migration_creates_collection_and_queue_tables() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        for table in [
            "dogs",
            "activities",
            "health_records",
            "vaccinations",
            "sync_queue",
            "dead_letter",
        ] {
            let mut rows = conn
                .query(
                    "SELECT EXISTS(
                        SELECT 1 FROM sqlite_master
                        WHERE type = 'table' AND name = ?
                    )",
                    libsql::params![table],
                )
                .await
                .unwrap();

            let exists = rows
                .next()
                .await
                .unwrap()
                .is_some_and(|row| row.get::<i32>(0).unwrap() != 0);

            assert!(exists, "missing table {table}");
        }
    }
}
