//! Operator command channel.
//!
//! Commands arrive from a [`CommandSource`] (Telegram in production, the
//! console otherwise). The only command is `update_price <price>`, which
//! writes the reference-price override read by the scheduler.

use crate::notify::Notifier;
use crate::strategy::OverrideWriter;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const UPDATE_PRICE: &str = "update_price";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    UpdatePrice(Decimal),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Invalid price format. Use /update_price <new_price>")]
    InvalidFormat,

    #[error("unknown command: {0}")]
    Unknown(String),
}

/// Largest override magnitude accepted from the operator.
pub const MAX_OVERRIDE_PRICE: Decimal = dec!(1000000000000);

/// Parse `update_price <price>`, optionally written `/update_price` or
/// `/update_price@botname`.
///
/// Zero and negatives are accepted; the planner turns a non-positive
/// reference into an all-zero grid. Magnitudes above [`MAX_OVERRIDE_PRICE`]
/// are rejected as malformed.
pub fn parse_command(text: &str) -> Result<Command, CommandError> {
    let mut parts = text.split_whitespace();
    let head = parts.next().unwrap_or_default();
    let name = head.trim_start_matches('/');
    let name = name.split('@').next().unwrap_or(name);

    if name != UPDATE_PRICE {
        return Err(CommandError::Unknown(head.to_string()));
    }

    let (Some(raw), None) = (parts.next(), parts.next()) else {
        return Err(CommandError::InvalidFormat);
    };

    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
        .filter(|price| price.abs() <= MAX_OVERRIDE_PRICE)
        .map(Command::UpdatePrice)
        .ok_or(CommandError::InvalidFormat)
}

/// A message received from the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub text: String,
    /// Transport id used to thread replies, if the transport has one
    pub message_id: Option<i64>,
}

impl IncomingMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            message_id: None,
        }
    }
}

/// Source of operator messages. `None` means the source is closed.
#[async_trait]
pub trait CommandSource: Send + Sync {
    async fn next_message(&mut self) -> Option<IncomingMessage>;

    async fn reply(&self, to: &IncomingMessage, text: &str);
}

/// Applies operator commands to the override cell.
pub struct CommandChannel<S> {
    source: S,
    writer: OverrideWriter,
    notifier: Arc<dyn Notifier>,
}

impl<S: CommandSource> CommandChannel<S> {
    pub fn new(source: S, writer: OverrideWriter, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            source,
            writer,
            notifier,
        }
    }

    /// Handle messages until the source closes.
    pub async fn run(mut self) {
        info!("Command listener started");
        while let Some(message) = self.source.next_message().await {
            self.handle(&message).await;
        }
        info!("Command source closed");
    }

    async fn handle(&self, message: &IncomingMessage) {
        match parse_command(&message.text) {
            Ok(Command::UpdatePrice(price)) => {
                self.writer.set(price);
                info!(%price, "Updated default mid-price");
                self.source
                    .reply(message, &format!("Mid-price updated to {}", price))
                    .await;
                self.notifier
                    .notify(&format!("Updated default mid-price to: {}", price))
                    .await;
            }
            Err(CommandError::InvalidFormat) => {
                warn!(text = %message.text, "Rejected malformed command");
                self.source
                    .reply(message, &CommandError::InvalidFormat.to_string())
                    .await;
            }
            Err(CommandError::Unknown(name)) => {
                debug!(%name, "Ignoring message");
            }
        }
    }
}

/// Commands typed on standard input, one per line.
///
/// Lines are read on a detached OS thread, off the runtime's blocking pool.
pub struct StdinCommands {
    lines: mpsc::Receiver<String>,
}

impl StdinCommands {
    /// Start the reader thread.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(STDIN_BUFFER);
        let spawned = std::thread::Builder::new()
            .name("stdin-commands".to_string())
            .spawn(move || forward_lines(std::io::stdin().lock(), &tx));
        if let Err(e) = spawned {
            warn!("Failed to start stdin command reader: {}", e);
        }
        Self { lines: rx }
    }
}

const STDIN_BUFFER: usize = 16;

/// Send each non-blank line to `tx`. Stops at EOF or on the first read
/// error, and when the receiver is gone.
fn forward_lines(reader: impl BufRead, tx: &mpsc::Sender<String>) {
    for line in reader.lines() {
        match line {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => {
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Failed to read command from stdin: {}", e);
                break;
            }
        }
    }
}

#[async_trait]
impl CommandSource for StdinCommands {
    async fn next_message(&mut self) -> Option<IncomingMessage> {
        self.lines.recv().await.map(IncomingMessage::new)
    }

    async fn reply(&self, _to: &IncomingMessage, text: &str) {
        info!("{}", text);
    }
}

/// In-process source fed through a channel. Replies are sent back on `replies`.
pub struct ChannelCommands {
    rx: mpsc::Receiver<IncomingMessage>,
    replies: mpsc::UnboundedSender<String>,
}

impl ChannelCommands {
    pub fn new(
        rx: mpsc::Receiver<IncomingMessage>,
        replies: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self { rx, replies }
    }
}

#[async_trait]
impl CommandSource for ChannelCommands {
    async fn next_message(&mut self) -> Option<IncomingMessage> {
        self.rx.recv().await
    }

    async fn reply(&self, _to: &IncomingMessage, text: &str) {
        let _ = self.replies.send(text.to_string());
    }
}
