//! Persistent store abstraction for confirmed extraction results.

use crate::error::Result;
use crate::types::RecordTable;

/// Relational store holding one string per row.
///
/// Implementations are blocking; async callers run them on the blocking
/// thread pool.
pub trait RecordStore: Send + Sync {
    /// Insert every value as its own row, all-or-nothing. Returns the
    /// number of rows written.
    fn insert_batch(&self, table: RecordTable, values: &[String]) -> Result<usize>;

    /// All stored values of `table` in insertion order.
    fn list(&self, table: RecordTable) -> Result<Vec<String>>;
}
