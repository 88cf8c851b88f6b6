//! Main run loop: reads one operator action at a time, runs it through the
//! gate to completion, and renders the result before reading the next.

use futures::StreamExt;

use crate::agent::session::{Session, StatusLevel, StatusLine};
use crate::agent::submission::{Submission, SubmissionParser};
use crate::channels::{Channel, IncomingMessage, StatusUpdate};
use crate::conversation::Role;
use crate::error::ChannelError;
use crate::gate::{ConfirmationState, ConversationGate, TriggerOutcome, TurnOutcome};

const HELP_TEXT: &str = "Commands:\n\
    \x20 /confirm [n] [path]  send offer n (default 1), optionally attaching <path>\n\
    \x20 yes | no            confirm or dismiss the pending email\n\
    \x20 /dismiss            drop the pending email without sending\n\
    \x20 /history            show the whole conversation\n\
    \x20 /status             show the last model/mail status\n\
    \x20 /quit               exit";

/// Whether the loop keeps reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

/// Owns the session and drives the gate from a channel.
pub struct Agent {
    gate: ConversationGate,
    channel: Box<dyn Channel>,
    session: Session,
}

impl Agent {
    pub fn new(gate: ConversationGate, channel: Box<dyn Channel>) -> Self {
        Self {
            gate,
            channel,
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run until the input stream ends or the operator quits.
    pub async fn run(mut self) -> Result<(), ChannelError> {
        let mut stream = self.channel.start().await?;
        tracing::info!(session = %self.session.id, channel = self.channel.name(), "Session started");

        while let Some(message) = stream.next().await {
            if self.handle_message(&message).await? == Control::Quit {
                break;
            }
            self.channel.ready().await?;
        }

        tracing::info!(
            session = %self.session.id,
            turns = self.session.turns().len(),
            "Session ended"
        );
        self.channel.shutdown().await?;
        Ok(())
    }

    /// Handle one operator action to completion.
    pub async fn handle_message(&mut self, message: &IncomingMessage) -> Result<Control, ChannelError> {
        let mut submission = SubmissionParser::parse(&message.content);

        // yes/no is only an answer while an offer awaits its first reply;
        // re-sending after an attempt takes an explicit /confirm.
        if matches!(submission, Submission::ApprovalResponse { .. })
            && self.session.confirmation_state() != ConfirmationState::AwaitingConfirmation
        {
            submission = Submission::user_input(message.content.trim());
        }

        match submission {
            Submission::UserInput { content } => self.process_user_input(&content).await?,
            Submission::Confirm { offer, upload } => self.process_confirm(offer, upload).await?,
            Submission::ApprovalResponse { approved: true } => {
                self.process_confirm(1, None).await?
            }
            Submission::ApprovalResponse { approved: false } | Submission::Dismiss => {
                self.process_dismiss().await?
            }
            Submission::History => {
                for turn in self.session.turns() {
                    self.channel.show_turn(turn).await?;
                }
            }
            Submission::Status => self.report_status().await?,
            Submission::Help => {
                self.channel
                    .send_status(StatusUpdate::Status(HELP_TEXT.to_string()))
                    .await?
            }
            Submission::Quit => return Ok(Control::Quit),
        }
        Ok(Control::Continue)
    }

    async fn process_user_input(&mut self, content: &str) -> Result<(), ChannelError> {
        let mark = self.session.turns().len();
        let outcome = self.gate.handle_input(&mut self.session, content).await;

        // The operator already sees what they typed; render replies only.
        for turn in self.session.conversation().since(mark) {
            if turn.role == Role::Assistant {
                self.channel.show_turn(turn).await?;
            }
        }

        // A plain model reply speaks for itself; canned replies and failures
        // get a status line.
        if matches!(
            outcome,
            TurnOutcome::Canned { .. } | TurnOutcome::ModelFailed { .. }
        ) {
            if let Some(status) = self.session.model_status() {
                self.channel.send_status(to_update(status)).await?;
            }
        }

        let trigger = match &outcome {
            TurnOutcome::Intercepted { trigger } => Some(trigger),
            TurnOutcome::Answered { trigger } | TurnOutcome::ModelFailed { trigger, .. } => {
                trigger.as_ref()
            }
            _ => None,
        };
        match trigger {
            Some(TriggerOutcome::Raised { .. }) => self.prompt_confirmation().await?,
            Some(TriggerOutcome::ExtractionFailed { error, .. }) => {
                self.channel
                    .send_status(StatusUpdate::Error(error.to_string()))
                    .await?
            }
            None => {}
        }
        Ok(())
    }

    async fn prompt_confirmation(&self) -> Result<(), ChannelError> {
        if let Some(pending) = self.session.pending() {
            self.channel
                .send_status(StatusUpdate::ConfirmationNeeded {
                    rule: pending.rule.clone(),
                    offers: pending.offers.clone(),
                })
                .await?;
        }
        Ok(())
    }

    async fn process_confirm(
        &mut self,
        offer: usize,
        upload: Option<std::path::PathBuf>,
    ) -> Result<(), ChannelError> {
        match self.gate.confirm(&mut self.session, offer, upload).await {
            Ok(()) => {
                if let Some(status) = self.session.mail_status() {
                    self.channel.send_status(to_update(status)).await?;
                }
            }
            Err(e) => {
                self.channel
                    .send_status(StatusUpdate::Error(e.to_string()))
                    .await?;
            }
        }
        Ok(())
    }

    async fn process_dismiss(&mut self) -> Result<(), ChannelError> {
        let update = match self.gate.dismiss(&mut self.session) {
            Ok(()) => self.session.mail_status().map(to_update),
            Err(e) => Some(StatusUpdate::Error(e.to_string())),
        };
        if let Some(update) = update {
            self.channel.send_status(update).await?;
        }
        Ok(())
    }

    async fn report_status(&self) -> Result<(), ChannelError> {
        let model = self
            .session
            .model_status()
            .map(|s| s.message.as_str())
            .unwrap_or("no model call yet");
        let mail = self
            .session
            .mail_status()
            .map(|s| s.message.as_str())
            .unwrap_or("no email activity yet");
        self.channel
            .send_status(StatusUpdate::Status(format!(
                "turns: {} | confirmation: {} | model: {model} | mail: {mail}",
                self.session.turns().len(),
                self.session.confirmation_state(),
            )))
            .await?;
        self.prompt_confirmation().await
    }
}

fn to_update(status: &StatusLine) -> StatusUpdate {
    match status.level {
        StatusLevel::Info => StatusUpdate::Status(status.message.clone()),
        StatusLevel::Success => StatusUpdate::Success(status.message.clone()),
        StatusLevel::Error => StatusUpdate::Error(status.message.clone()),
    }
}
