//! Inbound message classification.

use hostrelay_core::types::RecordTable;
use hostrelay_dialogue::WorkflowKind;

use crate::diagnostics::DiagnosticQuery;

/// A recognised slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// Enter a conversational workflow.
    Enter(WorkflowKind),
    /// Read-only query against the managed host.
    Diagnostic(DiagnosticQuery),
    /// Replication log lines from the relay host.
    ReplLogs,
    /// Stored extraction results.
    ListRecords(RecordTable),
    Unknown(String),
}

impl Command {
    fn from_parts(name: &str, args: &str) -> Self {
        match name {
            "start" => Command::Start,
            "help" => Command::Help,
            "get_repl_logs" => Command::ReplLogs,
            "get_emails" => Command::ListRecords(RecordTable::Emails),
            "get_phone_numbers" => Command::ListRecords(RecordTable::PhoneNumbers),
            _ => {
                if let Some(kind) = WorkflowKind::ALL
                    .into_iter()
                    .find(|kind| kind.entry_command() == name)
                {
                    return Command::Enter(kind);
                }
                match DiagnosticQuery::from_command(name, args) {
                    Some(query) => Command::Diagnostic(query),
                    None => Command::Unknown(name.to_string()),
                }
            }
        }
    }
}

/// What an inbound message is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Command(Command),
    Text(String),
}

/// Classify raw message text.
///
/// A command is `/name` at the very start of the message, optionally
/// followed by `@botname` and whitespace separated arguments. Anything else
/// is plain text.
pub fn parse(text: &str) -> Inbound {
    let Some(body) = text.strip_prefix('/') else {
        return Inbound::Text(text.to_string());
    };

    let (head, args) = match body.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (body, ""),
    };
    let name = head.split('@').next().unwrap_or(head);

    Inbound::Command(Command::from_parts(name, args))
}

pub const HELP_TEXT: &str = "All commands:
1) /find_phone_number - find phone numbers in text;
2) /find_email - find email addresses in text;
3) /verify_password - check password complexity;
4) /get_release - get system release information;
5) /get_uname - get system uname information;
6) /get_uptime - get system uptime;
7) /get_df - get file system information;
8) /get_free - get free memory information;
9) /get_mpstat - get system performance;
10) /get_w - get information about logged in users;
11) /get_auths - get the last 10 logins;
12) /get_critical - get the last 5 critical events;
13) /get_ps - get running processes;
14) /get_ss - get used ports;
15) /get_apt_list - get installed packages (add a package name to look up a specific package);
16) /get_services - get running services;
17) /get_emails - get saved email addresses;
18) /get_phone_numbers - get saved phone numbers;
19) /get_repl_logs - get replication logs.";
