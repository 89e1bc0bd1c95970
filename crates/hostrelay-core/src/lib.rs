pub mod channel;
pub mod config;
pub mod error;
pub mod extract;
pub mod password;
pub mod store;
pub mod types;

pub use channel::Channel;
pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use extract::{extract_emails, extract_phone_numbers, ExtractionCandidateSet};
pub use password::{classify, PasswordStrength};
pub use store::RecordStore;
pub use types::*;
