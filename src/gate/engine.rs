//! The conversation gate: decides, for each operator action, whether to
//! answer from a canned reply, ask the model, or raise an email confirmation,
//! and performs the send once a confirmation is accepted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::agent::session::{Session, StatusLine};
use crate::config::EmailTemplate;
use crate::error::GateError;
use crate::gate::extract::extract_recipient;
use crate::gate::rules::{ConfirmationKind, MatchTarget, RuleMatch, RuleSet, TriggerAction};
use crate::gate::state::{ConfirmationState, PendingConfirmation, SendOffer};
use crate::llm::ModelClient;
use crate::mail::{EmailRequest, MailSender};

/// Status text shown when a canned reply replaces the model call.
const CANNED_STATUS: &str = "Detected 'Hello' and triggered custom action!";

/// What a confirmation rule did after matching.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// A confirmation is now pending.
    Raised { id: Uuid, rule: String },
    /// The rule matched but no recipient could be read from the text.
    ExtractionFailed { rule: String, error: GateError },
}

/// Result of processing one line of chat input.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Blank input; nothing appended.
    Ignored,
    /// Answered by a pre-model rule without contacting the model.
    Canned { rule: String },
    /// Pre-model rule raised a confirmation without contacting the model.
    Intercepted { trigger: TriggerOutcome },
    /// The model replied.
    Answered { trigger: Option<TriggerOutcome> },
    /// The model call failed; the user turn stands, no reply was appended.
    ModelFailed {
        error: GateError,
        trigger: Option<TriggerOutcome>,
    },
}

impl TurnOutcome {
    /// Whether a confirmation was raised by this turn.
    pub fn raised_confirmation(&self) -> bool {
        let trigger = match self {
            Self::Intercepted { trigger } => Some(trigger),
            Self::Answered { trigger } | Self::ModelFailed { trigger, .. } => trigger.as_ref(),
            _ => None,
        };
        matches!(trigger, Some(TriggerOutcome::Raised { .. }))
    }
}

/// Turn processor with its collaborators.
pub struct ConversationGate {
    rules: RuleSet,
    model: Arc<dyn ModelClient>,
    mailer: Arc<dyn MailSender>,
    template: EmailTemplate,
}

impl ConversationGate {
    pub fn new(
        rules: RuleSet,
        model: Arc<dyn ModelClient>,
        mailer: Arc<dyn MailSender>,
        template: EmailTemplate,
    ) -> Self {
        Self {
            rules,
            model,
            mailer,
            template,
        }
    }

    /// Process one line of chat input.
    ///
    /// Order: pre-model rules, model call, post-model rules. Never sends mail.
    pub async fn handle_input(&self, session: &mut Session, input: &str) -> TurnOutcome {
        if input.trim().is_empty() {
            return TurnOutcome::Ignored;
        }

        session.abandon_pending("superseded by new input");

        if let Some(m) = self.rules.evaluate_pre_model(input) {
            match &m.rule.action {
                TriggerAction::CannedReply { text } => {
                    let conversation = session.conversation_mut();
                    conversation.push_user(input);
                    conversation.push_assistant(text.as_str());
                    session.set_model_status(StatusLine::success(CANNED_STATUS));
                    tracing::info!(rule = %m.rule.name, "Answered with canned reply");
                    return TurnOutcome::Canned {
                        rule: m.rule.name.clone(),
                    };
                }
                TriggerAction::EmailConfirmation(kind) => {
                    session.conversation_mut().push_user(input);
                    let trigger = self.raise(session, &m, *kind, input, None);
                    return TurnOutcome::Intercepted { trigger };
                }
            }
        }

        session.conversation_mut().push_user(input);

        let reply = match self.model.complete(input).await {
            Ok(reply) => {
                session.conversation_mut().push_assistant(reply.as_str());
                session.set_model_status(StatusLine::success(format!(
                    "Reply from {}",
                    self.model.model_name()
                )));
                Ok(reply)
            }
            Err(e) => {
                tracing::warn!(model = %self.model.model_name(), error = %e, "Model call failed");
                let error = GateError::ModelUnavailable(e);
                session.set_model_status(StatusLine::error(format!(
                    "Failed to get response from {}: {error}",
                    self.model.model_name()
                )));
                Err(error)
            }
        };

        // A rule that matches but cannot act (no recipient in the reply)
        // leaves the stage open for the rules after it.
        let reply_text = reply.as_ref().ok().map(String::as_str);
        let mut trigger = None;
        for m in self.rules.post_model_matches(input, reply_text) {
            // A canned reply after the model answered has nothing to add.
            let TriggerAction::EmailConfirmation(kind) = m.rule.action else {
                continue;
            };
            let outcome = self.raise(session, &m, kind, input, reply_text);
            let raised = matches!(outcome, TriggerOutcome::Raised { .. });
            trigger = Some(outcome);
            if raised {
                break;
            }
        }

        match reply {
            Ok(_) => TurnOutcome::Answered { trigger },
            Err(error) => TurnOutcome::ModelFailed { error, trigger },
        }
    }

    /// Build the offers for a matched confirmation rule and make them pending.
    fn raise(
        &self,
        session: &mut Session,
        m: &RuleMatch<'_>,
        kind: ConfirmationKind,
        input: &str,
        reply: Option<&str>,
    ) -> TriggerOutcome {
        let fixed = &self.template.recipient;
        let offers = match kind {
            ConfirmationKind::ConfirmRequest => vec![SendOffer {
                label: format!("Send email to {fixed}"),
                recipient: fixed.clone(),
                with_attachment: false,
            }],
            ConfirmationKind::SentNotice => {
                let text = match m.rule.target {
                    MatchTarget::UserInput => input,
                    MatchTarget::ModelReply => reply.unwrap_or_default(),
                };
                match extract_recipient(text, m.span.end) {
                    Ok(recipient) => vec![SendOffer {
                        label: format!("Send email to {recipient}"),
                        recipient,
                        with_attachment: self.template.attachment.is_some(),
                    }],
                    Err(error) => {
                        tracing::warn!(rule = %m.rule.name, error = %error, "Recipient extraction failed");
                        session.set_mail_status(StatusLine::error(error.to_string()));
                        return TriggerOutcome::ExtractionFailed {
                            rule: m.rule.name.clone(),
                            error,
                        };
                    }
                }
            }
            ConfirmationKind::AttachmentOffer => vec![
                SendOffer {
                    label: format!("Send email with attachment to {fixed}"),
                    recipient: fixed.clone(),
                    with_attachment: true,
                },
                SendOffer {
                    label: format!("Send email without attachment to {fixed}"),
                    recipient: fixed.clone(),
                    with_attachment: false,
                },
            ],
        };

        let pending = PendingConfirmation::raise(&m.rule.name, kind, offers);
        let id = pending.id;
        session.raise_pending(pending);
        TriggerOutcome::Raised {
            id,
            rule: m.rule.name.clone(),
        }
    }

    /// Accept offer `offer` (1-based) of the pending confirmation and send.
    ///
    /// `upload` replaces the configured attachment. Once it has resolved to
    /// an existing file it also applies to later confirms of the same
    /// pending confirmation. Every call is a separate send attempt; nothing
    /// is deduplicated or retried.
    pub async fn confirm(
        &self,
        session: &mut Session,
        offer: usize,
        upload: Option<PathBuf>,
    ) -> Result<(), GateError> {
        let (chosen, kept_upload) = {
            let pending = session
                .pending()
                .filter(|p| p.state().accepts_confirm())
                .ok_or(GateError::NoPendingConfirmation)?;
            let available = pending.offers.len();
            let chosen = offer
                .checked_sub(1)
                .and_then(|i| pending.offers.get(i))
                .cloned()
                .ok_or(GateError::UnknownOffer {
                    index: offer,
                    available,
                })?;
            (chosen, pending.upload.clone())
        };

        let attachment = if chosen.with_attachment {
            let candidate = upload.as_deref().or(kept_upload.as_deref());
            match self.resolve_attachment(candidate).await {
                Ok(path) => Some(path),
                Err(error) => {
                    tracing::warn!(error = %error, "Send aborted before transport");
                    session.set_mail_status(StatusLine::error(error.to_string()));
                    return Err(error);
                }
            }
        } else {
            None
        };

        // Only an upload that resolved to a file is kept for later confirms.
        if attachment.is_some() && upload.is_some() {
            if let Some(pending) = session.pending_mut() {
                pending.upload = upload;
            }
        }

        if let Some(pending) = session.pending_mut() {
            pending.transition_to(
                ConfirmationState::Sending,
                Some(format!("operator confirmed '{}'", chosen.label)),
            );
        }

        let request = EmailRequest {
            from: self.template.from_address.clone(),
            to: chosen.recipient.clone(),
            subject: self.template.subject.clone(),
            body: self.template.body.clone(),
            attachment,
        };
        let result = self.mailer.send(&request).await;

        let (state, status) = match &result {
            Ok(()) => (
                ConfirmationState::Sent,
                StatusLine::success(format!("Email sent successfully to {}", request.to)),
            ),
            Err(e) => (
                ConfirmationState::Failed,
                StatusLine::error(format!("Failed to send email to {}: {e}", request.to)),
            ),
        };
        if let Some(pending) = session.pending_mut() {
            pending.transition_to(state, result.as_ref().err().map(|e| e.to_string()));
        }
        session.set_mail_status(status);

        result.map_err(GateError::from)
    }

    /// Drop the pending confirmation without sending.
    pub fn dismiss(&self, session: &mut Session) -> Result<(), GateError> {
        session
            .abandon_pending("dismissed by operator")
            .ok_or(GateError::NoPendingConfirmation)?;
        session.set_mail_status(StatusLine::info("Email dismissed; nothing was sent."));
        Ok(())
    }

    /// Operator upload first, then the configured path. The file must exist.
    async fn resolve_attachment(&self, upload: Option<&Path>) -> Result<PathBuf, GateError> {
        let path = upload
            .or(self.template.attachment.as_deref())
            .ok_or_else(|| {
                GateError::AttachmentMissing("no attachment configured or uploaded".into())
            })?;

        let is_file = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(GateError::AttachmentMissing(format!(
                "{} does not exist",
                path.display()
            )));
        }
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
