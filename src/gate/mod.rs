//! Conversation gate: trigger rules, recipient extraction, the confirmation
//! state machine, and the turn processor that ties them together.

pub mod engine;
pub mod extract;
pub mod rules;
pub mod state;

pub use engine::{ConversationGate, TriggerOutcome, TurnOutcome};
pub use rules::{ConfirmationKind, MatchTarget, RuleSet, TriggerAction, TriggerPattern, TriggerRule};
pub use state::{ConfirmationState, PendingConfirmation, SendOffer};
