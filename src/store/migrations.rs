//! Schema migrations for the job database.
//!
//! Migrations are numbered and applied in order; the `_migrations` table
//! records what has already run, so startup against an existing database
//! only executes the versions it is missing.

use libsql::Connection;

use crate::error::StoreError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Ordered migration list; append new versions, never edit applied ones.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "jobs_table",
    sql: r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            spec TEXT NOT NULL,
            log TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            last_updated TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
        CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);
    "#,
}];

/// Bring the schema up to the latest version, creating the bookkeeping
/// table on first contact.
pub async fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| StoreError::Migration(format!("migration bookkeeping table: {e}")))?;

    let applied = current_version(conn).await?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applying schema migration"
        );
        conn.execute_batch(migration.sql).await.map_err(|e| {
            StoreError::Migration(format!("apply V{} ({}): {e}", migration.version, migration.name))
        })?;
        record_version(conn, migration.version, migration.name).await?;
    }

    let version = current_version(conn).await?;
    tracing::info!(version, "Job database schema is up to date");

    Ok(())
}

/// Highest version recorded in `_migrations`, 0 for a fresh database.
async fn current_version(conn: &Connection) -> Result<i64, StoreError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| StoreError::Migration(format!("read version: {e}")))?;

    match rows.next().await {
        Ok(Some(row)) => row
            .get(0)
            .map_err(|e| StoreError::Migration(format!("version column: {e}"))),
        Ok(None) => Ok(0),
        Err(e) => Err(StoreError::Migration(format!("read version: {e}"))),
    }
}

async fn record_version(conn: &Connection, version: i64, name: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| StoreError::Migration(format!("record V{version}: {e}")))?;
    Ok(())
}
