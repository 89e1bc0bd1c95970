//! Conversational extraction-and-confirmation engine.
//!
//! Keeps one session per (user, workflow kind), drives each session through
//! its stage graph, and commits confirmed extraction results to the store.

pub mod engine;
pub mod error;
pub mod machine;
pub mod registry;
pub mod session;
pub mod workflow;

pub use engine::{Advance, DialogueEngine};
pub use error::DialogueError;
pub use machine::{Commit, Outcome, Step, TerminalReason};
pub use registry::{SessionRegistry, SessionSlot};
pub use session::{Session, SessionKey};
pub use workflow::{Stage, WorkflowKind};
