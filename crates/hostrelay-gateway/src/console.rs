//! Line-oriented console channel over stdin/stdout.
//!
//! Each input line is one message from the default user. A line of the
//! form `@name text` is sent as user `name` instead, which lets a single
//! terminal drive several concurrent conversations.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use hostrelay_core::channel::Channel;
use hostrelay_core::error::{RelayError, Result};
use hostrelay_core::types::{IncomingMessage, OutgoingMessage, UserId};

const INBOUND_BUFFER: usize = 64;

pub struct ConsoleChannel {
    default_user: UserId,
    display_name: String,
    stdout: Mutex<Stdout>,
}

impl ConsoleChannel {
    pub fn new(default_user: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            default_user: UserId::new(default_user),
            display_name: display_name.into(),
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }
}

/// Turn one console line into a message. Blank lines are dropped.
pub(crate) fn parse_line(
    line: &str,
    default_user: &UserId,
    display_name: &str,
) -> Option<IncomingMessage> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    if let Some(rest) = line.strip_prefix('@') {
        let (name, text) = rest.split_once(' ').unwrap_or((rest, ""));
        if !name.is_empty() && !text.trim().is_empty() {
            return Some(IncomingMessage::new(name, name, text));
        }
    }

    Some(IncomingMessage {
        user: default_user.clone(),
        display_name: display_name.to_string(),
        text: line.to_string(),
    })
}

fn render(message: &OutgoingMessage) -> String {
    let mut out = String::new();
    for line in message.text.lines() {
        out.push_str(&format!("[{}] {}\n", message.user, line));
    }
    if out.is_empty() {
        out = format!("[{}]\n", message.user);
    }
    out
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>> {
        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        let default_user = self.default_user.clone();
        let display_name = self.display_name.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(message) = parse_line(&line, &default_user, &display_name) else {
                            continue;
                        };
                        debug!(user = %message.user, "Console line received");
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Console input closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read console input");
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        let mut stdout = self.stdout.lock().await;
        stdout
            .write_all(render(&message).as_bytes())
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))
    }
}
