//! Session state for the single interactive operator.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::conversation::{Conversation, Turn};
use crate::gate::state::{ConfirmationState, PendingConfirmation};

/// Severity of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

/// Human-readable outcome of the last model or mail call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub level: StatusLevel,
    pub message: String,
}

impl StatusLine {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == StatusLevel::Error
    }
}

/// Everything the presentation layer renders for one session.
///
/// Owned by the run loop and lent to the gate for each action. Nothing here
/// outlives the process.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    conversation: Conversation,
    pending: Option<PendingConfirmation>,
    model_status: Option<StatusLine>,
    mail_status: Option<StatusLine>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            conversation: Conversation::new(),
            pending: None,
            model_status: None,
            mail_status: None,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn turns(&self) -> &[Turn] {
        self.conversation.turns()
    }

    pub(crate) fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    /// The confirmation currently offered to the operator, if any.
    pub fn pending(&self) -> Option<&PendingConfirmation> {
        self.pending.as_ref()
    }

    pub(crate) fn pending_mut(&mut self) -> Option<&mut PendingConfirmation> {
        self.pending.as_mut()
    }

    /// State of the current confirmation, `Idle` when there is none.
    pub fn confirmation_state(&self) -> ConfirmationState {
        self.pending
            .as_ref()
            .map(|p| p.state())
            .unwrap_or(ConfirmationState::Idle)
    }

    pub(crate) fn raise_pending(&mut self, pending: PendingConfirmation) {
        tracing::info!(
            id = %pending.id,
            rule = %pending.rule,
            kind = %pending.kind,
            offers = pending.offers.len(),
            "Email awaiting confirmation"
        );
        self.pending = Some(pending);
    }

    /// Abandon and discard the current confirmation. Returns it, if there was one.
    pub(crate) fn abandon_pending(&mut self, reason: &str) -> Option<PendingConfirmation> {
        let mut pending = self.pending.take()?;
        pending.transition_to(ConfirmationState::Abandoned, Some(reason.to_string()));
        tracing::info!(id = %pending.id, reason, "Email confirmation abandoned");
        Some(pending)
    }

    pub fn model_status(&self) -> Option<&StatusLine> {
        self.model_status.as_ref()
    }

    pub fn mail_status(&self) -> Option<&StatusLine> {
        self.mail_status.as_ref()
    }

    pub(crate) fn set_model_status(&mut self, status: StatusLine) {
        self.model_status = Some(status);
    }

    pub(crate) fn set_mail_status(&mut self, status: StatusLine) {
        self.mail_status = Some(status);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
