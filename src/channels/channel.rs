//! Presentation-surface abstraction.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::conversation::Turn;
use crate::error::ChannelError;
use crate::gate::state::SendOffer;

/// One line of operator input.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    pub channel: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(channel: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            content: content.to_string(),
            received_at: Utc::now(),
        }
    }
}

/// Stream of operator input, consumed one item at a time.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// Non-turn output rendered to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Neutral progress or informational text.
    Status(String),
    /// Something succeeded (canned reply triggered, email sent).
    Success(String),
    /// Something failed; the session continues.
    Error(String),
    /// An email is waiting for an explicit confirm.
    ConfirmationNeeded { rule: String, offers: Vec<SendOffer> },
}

/// Where turns and statuses are shown and where input comes from.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start reading operator input.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Render one conversation turn.
    async fn show_turn(&self, turn: &Turn) -> Result<(), ChannelError>;

    /// Render a status line or confirmation prompt.
    async fn send_status(&self, status: StatusUpdate) -> Result<(), ChannelError>;

    /// Called once an action has been fully handled and the next input can be read.
    async fn ready(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
