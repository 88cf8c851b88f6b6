//! CLI channel — stdin/stdout REPL.

use std::io::Write;

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, IncomingMessage, MessageStream, StatusUpdate};
use crate::conversation::{Role, Turn};
use crate::error::ChannelError;

/// Reads operator lines from stdin; turns go to stdout, statuses to stderr.
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a turn the way the REPL prints it.
pub fn format_turn(turn: &Turn) -> String {
    let who = match turn.role {
        Role::User => "you",
        Role::Assistant => "bot",
    };
    format!("{who}> {}", turn.content)
}

/// Render a status update as one or more stderr lines.
pub fn format_status(status: &StatusUpdate) -> String {
    match status {
        StatusUpdate::Status(msg) => format!("ℹ️  {msg}"),
        StatusUpdate::Success(msg) => format!("✅ {msg}"),
        StatusUpdate::Error(msg) => format!("❌ {msg}"),
        StatusUpdate::ConfirmationNeeded { rule, offers } => {
            let mut out = format!("⚠️  Email ready to send (trigger: {rule}). Choose:");
            for (i, offer) in offers.iter().enumerate() {
                out.push_str(&format!("\n   [{}] {}", i + 1, offer.label));
            }
            out.push_str("\n   /confirm <n> [attachment path] to send, /dismiss to cancel");
            out
        }
    }
}

fn send_failed(e: std::io::Error) -> ChannelError {
    ChannelError::SendFailed {
        name: "cli".to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let msg = IncomingMessage::new("cli", &line);
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn show_turn(&self, turn: &Turn) -> Result<(), ChannelError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", format_turn(turn)).map_err(send_failed)
    }

    async fn send_status(&self, status: StatusUpdate) -> Result<(), ChannelError> {
        let mut err = std::io::stderr().lock();
        writeln!(err, "{}", format_status(&status)).map_err(send_failed)
    }

    async fn ready(&self) -> Result<(), ChannelError> {
        let mut err = std::io::stderr().lock();
        write!(err, "> ")
            .and_then(|()| err.flush())
            .map_err(send_failed)
    }
}
