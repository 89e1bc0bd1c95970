//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Configures WAL mode and recommended PRAGMAs on initialization.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use hostrelay_core::error::RelayError;

use crate::migrations;

/// Thread-safe SQLite database wrapper.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path and run pending
    /// migrations.
    pub fn new(path: &Path) -> Result<Self, RelayError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| RelayError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| RelayError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, RelayError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RelayError::Storage(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| RelayError::Storage(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, RelayError>
    where
        F: FnOnce(&Connection) -> Result<T, RelayError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RelayError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a closure inside a transaction.
    ///
    /// Commits when the closure returns `Ok`; the transaction is rolled back
    /// when it returns `Err` or panics.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, RelayError>
    where
        F: FnOnce(&Connection) -> Result<T, RelayError>,
    {
        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| RelayError::Storage(format!("Failed to begin transaction: {}", e)))?;
            let value = f(&tx)?;
            tx.commit()
                .map_err(|e| RelayError::Storage(format!("Failed to commit transaction: {}", e)))?;
            Ok(value)
        })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_rows(db: &Database, table: &str) -> i64 {
        db.with_conn(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .map_err(|e| RelayError::Storage(e.to_string()))
        })
        .unwrap()
    }

    #[test]
    fn test_in_memory_database() {
        let db = Database::in_memory().unwrap();
        assert_eq!(count_rows(&db, "emails"), 0);
        assert_eq!(count_rows(&db, "phone_numbers"), 0);
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("relay.db");
        let db = Database::new(&path).unwrap();
        assert_eq!(count_rows(&db, "emails"), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_wal_mode_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("wal.db")).unwrap();
        db.with_conn(|conn| {
            let mode: String = conn
                .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                .map_err(|e| RelayError::Storage(e.to_string()))?;
            assert_eq!(mode, "wal");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let db = Database::in_memory().unwrap();
        db.with_transaction(|conn| {
            conn.execute("INSERT INTO emails (email) VALUES ('a@b.io')", [])
                .map_err(|e| RelayError::Storage(e.to_string()))?;
            Ok(())
        })
        .unwrap();
        assert_eq!(count_rows(&db, "emails"), 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_err() {
        let db = Database::in_memory().unwrap();
        let result: Result<(), RelayError> = db.with_transaction(|conn| {
            conn.execute("INSERT INTO emails (email) VALUES ('a@b.io')", [])
                .map_err(|e| RelayError::Storage(e.to_string()))?;
            Err(RelayError::Storage("simulated failure".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(count_rows(&db, "emails"), 0);

        // The connection is still usable afterwards.
        db.with_transaction(|conn| {
            conn.execute("INSERT INTO emails (email) VALUES ('c@d.io')", [])
                .map_err(|e| RelayError::Storage(e.to_string()))?;
            Ok(())
        })
        .unwrap();
        assert_eq!(count_rows(&db, "emails"), 1);
    }
}
