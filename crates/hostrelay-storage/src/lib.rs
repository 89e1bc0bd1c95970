//! SQLite persistence for confirmed extraction results.
//!
//! Provides a WAL-mode SQLite database with versioned migrations and a
//! repository implementing [`hostrelay_core::RecordStore`] over the
//! `emails` and `phone_numbers` tables.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::RecordRepository;
