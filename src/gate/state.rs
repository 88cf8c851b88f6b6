//! Email confirmation state machine.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gate::rules::ConfirmationKind;

/// State of one triggered email confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationState {
    /// Nothing triggered yet.
    Idle,
    /// Offers are shown; waiting for the operator.
    AwaitingConfirmation,
    /// Operator confirmed; mail transport in progress.
    Sending,
    /// Last send attempt succeeded.
    Sent,
    /// Last send attempt failed.
    Failed,
    /// Dismissed or superseded without (further) sending.
    Abandoned,
}

impl ConfirmationState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: ConfirmationState) -> bool {
        use ConfirmationState::*;

        matches!(
            (self, target),
            (Idle, AwaitingConfirmation) |
            (AwaitingConfirmation, Sending) | (AwaitingConfirmation, Abandoned) |
            (Sending, Sent) | (Sending, Failed) |
            // Offers stay up after an attempt; confirming again is a new send.
            (Sent, Sending) | (Sent, Abandoned) |
            (Failed, Sending) | (Failed, Abandoned)
        )
    }

    /// Whether the operator may confirm from this state.
    pub fn accepts_confirm(&self) -> bool {
        self.can_transition_to(Self::Sending)
    }
}

impl std::fmt::Display for ConfirmationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        };
        write!(f, "{s}")
    }
}

/// A state transition event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: ConfirmationState,
    pub to: ConfirmationState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// One confirmable send option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOffer {
    /// Button/choice text shown to the operator.
    pub label: String,
    pub recipient: String,
    /// Whether confirming this offer attaches a file.
    pub with_attachment: bool,
}

/// An email waiting for explicit operator confirmation.
#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    pub id: Uuid,
    /// Name of the rule that raised it.
    pub rule: String,
    pub kind: ConfirmationKind,
    pub offers: Vec<SendOffer>,
    /// Attachment path the operator supplied for this confirmation, if any.
    pub upload: Option<PathBuf>,
    pub raised_at: DateTime<Utc>,
    state: ConfirmationState,
    transitions: Vec<StateTransition>,
}

impl PendingConfirmation {
    /// Raise a new confirmation. Starts in `AwaitingConfirmation`.
    pub fn raise(rule: &str, kind: ConfirmationKind, offers: Vec<SendOffer>) -> Self {
        let mut pending = Self {
            id: Uuid::new_v4(),
            rule: rule.to_string(),
            kind,
            offers,
            upload: None,
            raised_at: Utc::now(),
            state: ConfirmationState::Idle,
            transitions: Vec::new(),
        };
        pending.record(
            ConfirmationState::AwaitingConfirmation,
            Some(format!("triggered by rule '{rule}'")),
        );
        pending
    }

    pub fn state(&self) -> ConfirmationState {
        self.state
    }

    /// Full transition history, oldest first.
    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// Move to `target`, returning false (and changing nothing) if the
    /// transition is not allowed from the current state.
    pub fn transition_to(&mut self, target: ConfirmationState, reason: Option<String>) -> bool {
        if !self.state.can_transition_to(target) {
            tracing::warn!(
                id = %self.id,
                from = %self.state,
                to = %target,
                "Rejected confirmation state transition"
            );
            return false;
        }
        self.record(target, reason);
        true
    }

    fn record(&mut self, target: ConfirmationState, reason: Option<String>) {
        self.transitions.push(StateTransition {
            from: self.state,
            to: target,
            timestamp: Utc::now(),
            reason,
        });
        self.state = target;
    }

    /// Number of send attempts made so far.
    pub fn attempts(&self) -> usize {
        self.transitions
            .iter()
            .filter(|t| t.to == ConfirmationState::Sending)
            .count()
    }
}
