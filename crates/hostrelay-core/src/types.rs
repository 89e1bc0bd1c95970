//! Shared types used across the relay crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport-assigned identity of a chat user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An inbound text event received from a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Who sent the message.
    pub user: UserId,
    /// Human-readable name, used for greetings and log lines.
    pub display_name: String,
    /// Raw message text.
    pub text: String,
}

impl IncomingMessage {
    pub fn new(
        user: impl Into<String>,
        display_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            user: UserId::new(user),
            display_name: display_name.into(),
            text: text.into(),
        }
    }
}

/// A single outbound text reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub user: UserId,
    pub text: String,
}

/// Logical tables of the persistent store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordTable {
    Emails,
    PhoneNumbers,
}

impl RecordTable {
    /// SQL table name.
    pub fn table_name(self) -> &'static str {
        match self {
            RecordTable::Emails => "emails",
            RecordTable::PhoneNumbers => "phone_numbers",
        }
    }

    /// Name of the single value column.
    pub fn column_name(self) -> &'static str {
        match self {
            RecordTable::Emails => "email",
            RecordTable::PhoneNumbers => "value",
        }
    }
}

impl fmt::Display for RecordTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}
