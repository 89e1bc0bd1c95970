//! Message gateway: command parsing, host diagnostics, and the event loop
//! that connects a chat channel to the dialogue engine.

pub mod command;
pub mod console;
pub mod diagnostics;
pub mod error;
pub mod gateway;

pub use command::{Command, Inbound};
pub use console::ConsoleChannel;
pub use diagnostics::{CommandExecutor, CommandOutput, DiagnosticQuery, ShellExecutor};
pub use error::GatewayError;
pub use gateway::Gateway;
