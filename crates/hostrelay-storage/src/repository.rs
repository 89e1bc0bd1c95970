//! Repository over the extraction result tables.

use std::sync::Arc;

use tracing::debug;

use hostrelay_core::error::RelayError;
use hostrelay_core::store::RecordStore;
use hostrelay_core::types::RecordTable;

use crate::db::Database;

/// SQLite-backed [`RecordStore`].
pub struct RecordRepository {
    db: Arc<Database>,
}

impl RecordRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl RecordStore for RecordRepository {
    fn insert_batch(&self, table: RecordTable, values: &[String]) -> Result<usize, RelayError> {
        if values.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES (?1)",
            table.table_name(),
            table.column_name()
        );
        let written = self.db.with_transaction(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| RelayError::Storage(e.to_string()))?;
            for value in values {
                stmt.execute(rusqlite::params![value]).map_err(|e| {
                    RelayError::Storage(format!("Failed to insert into {}: {}", table, e))
                })?;
            }
            Ok(values.len())
        })?;
        debug!(table = %table, count = written, "Records inserted");
        Ok(written)
    }

    fn list(&self, table: RecordTable) -> Result<Vec<String>, RelayError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY id ASC",
            table.column_name(),
            table.table_name()
        );
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| RelayError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| RelayError::Storage(e.to_string()))?;

            let mut values = Vec::new();
            for row in rows {
                values.push(row.map_err(|e| RelayError::Storage(e.to_string()))?);
            }
            Ok(values)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_repo() -> RecordRepository {
        RecordRepository::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_insert_and_list_phone_numbers() {
        let repo = make_repo();
        let phones = strings(&["89123456789", "+7 (912) 345-67-89"]);
        assert_eq!(repo.insert_batch(RecordTable::PhoneNumbers, &phones).unwrap(), 2);
        assert_eq!(repo.list(RecordTable::PhoneNumbers).unwrap(), phones);
        assert!(repo.list(RecordTable::Emails).unwrap().is_empty());
    }

    #[test]
    fn test_insert_and_list_emails_in_insertion_order() {
        let repo = make_repo();
        repo.insert_batch(RecordTable::Emails, &strings(&["z@z.io"]))
            .unwrap();
        repo.insert_batch(RecordTable::Emails, &strings(&["a@a.io", "z@z.io"]))
            .unwrap();
        assert_eq!(
            repo.list(RecordTable::Emails).unwrap(),
            strings(&["z@z.io", "a@a.io", "z@z.io"])
        );
    }

    #[test]
    fn test_insert_empty_batch_is_noop() {
        let repo = make_repo();
        assert_eq!(repo.insert_batch(RecordTable::Emails, &[]).unwrap(), 0);
        assert!(repo.list(RecordTable::Emails).unwrap().is_empty());
    }

    #[test]
    fn test_values_are_bound_not_interpolated() {
        let repo = make_repo();
        let hostile = strings(&["x'); DROP TABLE emails; --@evil.io"]);
        repo.insert_batch(RecordTable::Emails, &hostile).unwrap();
        assert_eq!(repo.list(RecordTable::Emails).unwrap(), hostile);
    }

    #[test]
    fn test_failed_batch_writes_nothing() {
        let db = Arc::new(Database::in_memory().unwrap());
        // Reject the second value so the batch fails midway.
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON phone_numbers
                 WHEN NEW.value = 'bad'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .map_err(|e| RelayError::Storage(e.to_string()))
        })
        .unwrap();
        let repo = RecordRepository::new(Arc::clone(&db));

        let err = repo
            .insert_batch(RecordTable::PhoneNumbers, &strings(&["89123456789", "bad"]))
            .unwrap_err();
        assert!(matches!(err, RelayError::Storage(_)));
        assert!(repo.list(RecordTable::PhoneNumbers).unwrap().is_empty());
    }
}
