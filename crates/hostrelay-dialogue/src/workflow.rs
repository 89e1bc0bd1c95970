//! Workflow kinds and their stage graphs.
//!
//! Each workflow kind owns its stages:
//! - PhoneExtraction: PhoneAwaitingText -> PhoneAwaitingConfirmation
//! - EmailExtraction: EmailAwaitingText -> EmailAwaitingConfirmation
//! - PasswordCheck: PasswordAwaitingText
//!
//! Terminal outcomes are not stages; a session reaching one is removed.

use std::fmt;

use hostrelay_core::types::RecordTable;

use crate::error::DialogueError;

/// One of the independent conversational flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkflowKind {
    PhoneExtraction,
    EmailExtraction,
    PasswordCheck,
}

impl WorkflowKind {
    /// Routing priority for plain text when a user has several open sessions.
    pub const ALL: [WorkflowKind; 3] = [
        WorkflowKind::PhoneExtraction,
        WorkflowKind::EmailExtraction,
        WorkflowKind::PasswordCheck,
    ];

    /// Command that enters this workflow.
    pub fn entry_command(self) -> &'static str {
        match self {
            WorkflowKind::PhoneExtraction => "find_phone_number",
            WorkflowKind::EmailExtraction => "find_email",
            WorkflowKind::PasswordCheck => "verify_password",
        }
    }

    /// Table confirmed candidates are written to, if the workflow saves any.
    pub fn record_table(self) -> Option<RecordTable> {
        match self {
            WorkflowKind::PhoneExtraction => Some(RecordTable::PhoneNumbers),
            WorkflowKind::EmailExtraction => Some(RecordTable::Emails),
            WorkflowKind::PasswordCheck => None,
        }
    }

    /// Reply sent on entry.
    pub fn prompt(self) -> &'static str {
        match self {
            WorkflowKind::PhoneExtraction => "Enter text to find phone numbers:",
            WorkflowKind::EmailExtraction => "Enter text to find email addresses:",
            WorkflowKind::PasswordCheck => "Enter the password for checking complexity:",
        }
    }

    pub(crate) fn not_found(self) -> &'static str {
        match self {
            WorkflowKind::EmailExtraction => "Email addresses were not found in the provided text.",
            _ => "Phone numbers were not found in the provided text.",
        }
    }

    pub(crate) fn save_question(self) -> &'static str {
        match self {
            WorkflowKind::EmailExtraction => {
                "Do you want to save found email addresses in the database? (Yes/No)"
            }
            _ => "Do you want to save found phone numbers in the database? (Yes/No)",
        }
    }

    pub(crate) fn saved(self) -> &'static str {
        match self {
            WorkflowKind::EmailExtraction => "Email addresses successfully saved!",
            _ => "Phone numbers successfully saved!",
        }
    }

    pub(crate) fn save_failed(self) -> &'static str {
        match self {
            WorkflowKind::EmailExtraction => "Failed to save email addresses. Nothing was written.",
            _ => "Failed to save phone numbers. Nothing was written.",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowKind::PhoneExtraction => write!(f, "phone_extraction"),
            WorkflowKind::EmailExtraction => write!(f, "email_extraction"),
            WorkflowKind::PasswordCheck => write!(f, "password_check"),
        }
    }
}

/// A point in a workflow awaiting a specific category of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    PhoneAwaitingText,
    PhoneAwaitingConfirmation,
    EmailAwaitingText,
    EmailAwaitingConfirmation,
    PasswordAwaitingText,
}

impl Stage {
    /// Stage a freshly entered workflow starts in.
    pub fn initial(kind: WorkflowKind) -> Self {
        match kind {
            WorkflowKind::PhoneExtraction => Stage::PhoneAwaitingText,
            WorkflowKind::EmailExtraction => Stage::EmailAwaitingText,
            WorkflowKind::PasswordCheck => Stage::PasswordAwaitingText,
        }
    }

    /// Workflow kind that owns this stage.
    pub fn kind(self) -> WorkflowKind {
        match self {
            Stage::PhoneAwaitingText | Stage::PhoneAwaitingConfirmation => {
                WorkflowKind::PhoneExtraction
            }
            Stage::EmailAwaitingText | Stage::EmailAwaitingConfirmation => {
                WorkflowKind::EmailExtraction
            }
            Stage::PasswordAwaitingText => WorkflowKind::PasswordCheck,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::PhoneAwaitingText => "phone_awaiting_text",
            Stage::PhoneAwaitingConfirmation => "phone_awaiting_confirmation",
            Stage::EmailAwaitingText => "email_awaiting_text",
            Stage::EmailAwaitingConfirmation => "email_awaiting_confirmation",
            Stage::PasswordAwaitingText => "password_awaiting_text",
        };
        f.write_str(name)
    }
}

/// Validate a move between two non-terminal stages.
///
/// Valid transitions:
/// - PhoneAwaitingText -> PhoneAwaitingConfirmation
/// - EmailAwaitingText -> EmailAwaitingConfirmation
///
/// Staying in a confirmation stage after a malformed answer is not a
/// transition.
pub fn validate_transition(from: Stage, to: Stage) -> Result<(), DialogueError> {
    let valid = matches!(
        (from, to),
        (Stage::PhoneAwaitingText, Stage::PhoneAwaitingConfirmation)
            | (Stage::EmailAwaitingText, Stage::EmailAwaitingConfirmation)
    );

    if valid {
        Ok(())
    } else {
        Err(DialogueError::InvalidTransition(from, to))
    }
}
