//! Database schema migrations.
//!
//! Applies the initial schema: the `emails` and `phone_numbers` tables and
//! the `schema_migrations` bookkeeping table.

use rusqlite::Connection;
use tracing::info;

use hostrelay_core::error::RelayError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), RelayError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| RelayError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| RelayError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: one text column per table, no uniqueness constraint.
fn apply_v1(conn: &Connection) -> Result<(), RelayError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS emails (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            email   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS phone_numbers (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            value   TEXT NOT NULL
        );

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| RelayError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
