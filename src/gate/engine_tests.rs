use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::*;
use crate::agent::session::StatusLevel;
use crate::conversation::Role;
use crate::error::{LlmError, MailError};

// ── Stubs ───────────────────────────────────────────────────────

/// Model stub returning a fixed reply (or failing), counting calls.
struct StubModel {
    reply: Option<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl StubModel {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for StubModel {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().ok_or_else(|| LlmError::RequestFailed {
            provider: "stub".into(),
            reason: "HTTP 500".into(),
        })
    }
}

/// Mail stub recording every request; optionally fails with auth errors.
struct RecordingMailer {
    sent: Mutex<Vec<EmailRequest>>,
    reject_auth: bool,
}

impl RecordingMailer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            reject_auth: false,
        })
    }

    fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            reject_auth: true,
        })
    }

    fn sent(&self) -> Vec<EmailRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSender for RecordingMailer {
    async fn send(&self, request: &EmailRequest) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(request.clone());
        if self.reject_auth {
            return Err(MailError::AuthFailed("535 5.7.8 Username and Password not accepted".into()));
        }
        Ok(())
    }
}

fn template(attachment: Option<PathBuf>) -> EmailTemplate {
    EmailTemplate {
        from_address: "me@example.com".into(),
        recipient: "hr@example.com".into(),
        subject: "Resume".into(),
        body: "Please find my resume attached.".into(),
        attachment,
    }
}

fn gate(model: Arc<StubModel>, mailer: Arc<RecordingMailer>, attachment: Option<PathBuf>) -> ConversationGate {
    ConversationGate::new(
        RuleSet::default_rules("canned greeting"),
        model,
        mailer,
        template(attachment),
    )
}

fn existing_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
    file.write_all(b"%PDF-1.4").unwrap();
    file
}

// ── Greeting short-circuit ──────────────────────────────────────

#[tokio::test]
async fn hello_never_reaches_model() {
    let model = StubModel::replying("should not be used");
    let gate = gate(model.clone(), RecordingMailer::new(), None);

    for input in ["hello", "HELLO", "Hello, what is my resume status?", "say hElLo"] {
        let mut session = Session::new();
        let outcome = gate.handle_input(&mut session, input).await;
        assert!(matches!(outcome, TurnOutcome::Canned { .. }));

        let turns = session.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, input);
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].content, "canned greeting");
        assert!(session.pending().is_none());
    }
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn blank_input_is_ignored() {
    let model = StubModel::replying("x");
    let gate = gate(model.clone(), RecordingMailer::new(), None);
    let mut session = Session::new();

    assert!(matches!(gate.handle_input(&mut session, "   ").await, TurnOutcome::Ignored));
    assert!(session.turns().is_empty());
    assert_eq!(model.calls(), 0);
}

// ── Model call ──────────────────────────────────────────────────

#[tokio::test]
async fn forwards_only_current_input() {
    let model = StubModel::replying("Rust is a systems language.");
    let gate = gate(model.clone(), RecordingMailer::new(), None);
    let mut session = Session::new();

    gate.handle_input(&mut session, "what is rust?").await;
    gate.handle_input(&mut session, "and cargo?").await;

    assert_eq!(session.turns().len(), 4);
    let prompts = model.prompts.lock().unwrap().clone();
    assert_eq!(prompts, vec!["what is rust?", "and cargo?"]);
    assert!(!session.model_status().unwrap().is_error());
}

#[tokio::test]
async fn model_failure_keeps_user_turn_only() {
    let model = StubModel::failing();
    let gate = gate(model.clone(), RecordingMailer::new(), None);
    let mut session = Session::new();

    let outcome = gate.handle_input(&mut session, "tell me a joke").await;
    match outcome {
        TurnOutcome::ModelFailed { error, trigger } => {
            assert!(matches!(error, GateError::ModelUnavailable(_)));
            assert!(trigger.is_none());
        }
        other => panic!("Expected ModelFailed, got {:?}", other),
    }
    assert_eq!(session.turns().len(), 1);
    assert_eq!(session.turns()[0].role, Role::User);
    assert!(session.model_status().unwrap().is_error());

    // The next action still works.
    let outcome = gate.handle_input(&mut session, "hello").await;
    assert!(matches!(outcome, TurnOutcome::Canned { .. }));
    assert_eq!(session.turns().len(), 3);
}

// ── Confirmation request ────────────────────────────────────────

#[tokio::test]
async fn confirm_request_waits_for_operator() {
    let mailer = RecordingMailer::new();
    let gate = gate(
        StubModel::replying("Draft ready. Are you confirmed to send an email?"),
        mailer.clone(),
        None,
    );
    let mut session = Session::new();

    let outcome = gate.handle_input(&mut session, "write to HR").await;
    assert!(outcome.raised_confirmation());
    assert_eq!(
        session.confirmation_state(),
        ConfirmationState::AwaitingConfirmation
    );
    assert!(mailer.sent().is_empty());

    gate.confirm(&mut session, 1, None).await.unwrap();

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "hr@example.com");
    assert_eq!(sent[0].from, "me@example.com");
    assert!(sent[0].attachment.is_none());
    assert_eq!(session.confirmation_state(), ConfirmationState::Sent);

    // Awaiting strictly precedes Sending in the trace.
    let trace: Vec<ConfirmationState> = session
        .pending()
        .unwrap()
        .transitions()
        .iter()
        .map(|t| t.to)
        .collect();
    assert_eq!(
        trace,
        vec![
            ConfirmationState::AwaitingConfirmation,
            ConfirmationState::Sending,
            ConfirmationState::Sent,
        ]
    );
}

#[tokio::test]
async fn confirm_without_pending_is_rejected() {
    let mailer = RecordingMailer::new();
    let gate = gate(StubModel::replying("ok"), mailer.clone(), None);
    let mut session = Session::new();

    let err = gate.confirm(&mut session, 1, None).await.unwrap_err();
    assert!(matches!(err, GateError::NoPendingConfirmation));
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn unknown_offer_is_rejected() {
    let mailer = RecordingMailer::new();
    let gate = gate(
        StubModel::replying("Are you confirmed to send an email"),
        mailer.clone(),
        None,
    );
    let mut session = Session::new();
    gate.handle_input(&mut session, "go").await;

    for index in [0, 2] {
        let err = gate.confirm(&mut session, index, None).await.unwrap_err();
        assert!(matches!(err, GateError::UnknownOffer { available: 1, .. }));
    }
    assert!(mailer.sent().is_empty());
    assert_eq!(
        session.confirmation_state(),
        ConfirmationState::AwaitingConfirmation
    );
}

#[tokio::test]
async fn new_input_abandons_pending() {
    let mailer = RecordingMailer::new();
    let gate = gate(
        StubModel::replying("Are you confirmed to send an email"),
        mailer.clone(),
        None,
    );
    let mut session = Session::new();
    gate.handle_input(&mut session, "go").await;
    assert!(session.pending().is_some());

    gate.handle_input(&mut session, "hello").await;
    assert!(session.pending().is_none());
    assert!(matches!(
        gate.confirm(&mut session, 1, None).await,
        Err(GateError::NoPendingConfirmation)
    ));
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn dismiss_discards_without_sending() {
    let mailer = RecordingMailer::new();
    let gate = gate(
        StubModel::replying("Are you confirmed to send an email"),
        mailer.clone(),
        None,
    );
    let mut session = Session::new();
    gate.handle_input(&mut session, "go").await;

    gate.dismiss(&mut session).unwrap();
    assert!(session.pending().is_none());
    let status = session.mail_status().unwrap();
    assert_eq!(status.level, StatusLevel::Info);
    assert!(status.message.contains("dismissed"));
    assert!(matches!(
        gate.dismiss(&mut session),
        Err(GateError::NoPendingConfirmation)
    ));
    assert!(mailer.sent().is_empty());
}

// ── Sent notice with inline recipient ───────────────────────────

#[tokio::test]
async fn sent_notice_extracts_recipient() {
    let mailer = RecordingMailer::new();
    let gate = gate(
        StubModel::replying("The resume has just sent out to alice@example.com."),
        mailer.clone(),
        None,
    );
    let mut session = Session::new();

    let outcome = gate.handle_input(&mut session, "please forward it").await;
    assert!(outcome.raised_confirmation());
    let offers = &session.pending().unwrap().offers;
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].recipient, "alice@example.com");

    gate.confirm(&mut session, 1, None).await.unwrap();
    assert_eq!(mailer.sent()[0].to, "alice@example.com");
}

#[tokio::test]
async fn sent_notice_without_period_surfaces_error() {
    let mailer = RecordingMailer::new();
    let gate = gate(
        StubModel::replying("The resume has just sent out to alice@example.com"),
        mailer.clone(),
        None,
    );
    let mut session = Session::new();

    let outcome = gate.handle_input(&mut session, "please forward it").await;
    match outcome {
        TurnOutcome::Answered {
            trigger: Some(TriggerOutcome::ExtractionFailed { error, .. }),
        } => assert!(matches!(error, GateError::AddressExtractionFailure { .. })),
        other => panic!("Expected ExtractionFailed, got {:?}", other),
    }
    assert!(session.pending().is_none());
    assert!(session.mail_status().unwrap().is_error());
    assert!(mailer.sent().is_empty());
}

// ── Resume offer ────────────────────────────────────────────────

#[tokio::test]
async fn resume_offer_with_missing_attachment_never_sends() {
    let model = StubModel::replying("Sure, here is some info.");
    let mailer = RecordingMailer::new();
    let gate = gate(
        model.clone(),
        mailer.clone(),
        Some(PathBuf::from("/no/such/dir/resume.pdf")),
    );
    let mut session = Session::new();

    let outcome = gate.handle_input(&mut session, "resume please").await;
    assert_eq!(model.calls(), 1);
    assert!(outcome.raised_confirmation());
    let pending = session.pending().unwrap();
    assert_eq!(pending.offers.len(), 2);
    assert!(pending.offers[0].with_attachment);
    assert!(!pending.offers[1].with_attachment);

    let err = gate.confirm(&mut session, 1, None).await.unwrap_err();
    assert!(matches!(err, GateError::AttachmentMissing(_)));
    assert!(mailer.sent().is_empty());
    assert_eq!(
        session.confirmation_state(),
        ConfirmationState::AwaitingConfirmation
    );
    assert!(session.mail_status().unwrap().is_error());

    // The offer without attachment still works.
    gate.confirm(&mut session, 2, None).await.unwrap();
    assert_eq!(mailer.sent().len(), 1);
    assert!(mailer.sent()[0].attachment.is_none());
}

#[tokio::test]
async fn resume_offer_without_any_attachment_configured() {
    let mailer = RecordingMailer::new();
    let gate = gate(StubModel::replying("ok"), mailer.clone(), None);
    let mut session = Session::new();
    gate.handle_input(&mut session, "My Resume").await;

    let err = gate.confirm(&mut session, 1, None).await.unwrap_err();
    assert!(matches!(err, GateError::AttachmentMissing(_)));
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn resume_offer_fires_even_when_model_fails() {
    let gate = gate(StubModel::failing(), RecordingMailer::new(), None);
    let mut session = Session::new();

    let outcome = gate.handle_input(&mut session, "resume").await;
    assert!(matches!(outcome, TurnOutcome::ModelFailed { .. }));
    assert!(outcome.raised_confirmation());
    assert_eq!(session.turns().len(), 1);
}

#[tokio::test]
async fn uploaded_attachment_overrides_config() {
    let upload = existing_file();
    let mailer = RecordingMailer::new();
    let gate = gate(
        StubModel::replying("ok"),
        mailer.clone(),
        Some(PathBuf::from("/no/such/resume.pdf")),
    );
    let mut session = Session::new();
    gate.handle_input(&mut session, "resume").await;

    gate.confirm(&mut session, 1, Some(upload.path().to_path_buf()))
        .await
        .unwrap();
    // The upload sticks for later confirms of the same offer set.
    gate.confirm(&mut session, 1, None).await.unwrap();

    let sent = mailer.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|r| r.attachment.as_deref() == Some(upload.path())));
}

#[tokio::test]
async fn resume_offer_survives_failed_sent_notice_extraction() {
    let gate = gate(
        StubModel::replying("Your resume has just sent out to HR"),
        RecordingMailer::new(),
        None,
    );
    let mut session = Session::new();

    let outcome = gate.handle_input(&mut session, "resume please").await;

    match outcome {
        TurnOutcome::Answered {
            trigger: Some(TriggerOutcome::Raised { rule, .. }),
        } => assert_eq!(rule, "resume"),
        other => panic!("Expected the resume offer, got {:?}", other),
    }
    let pending = session.pending().unwrap();
    assert_eq!(pending.kind, ConfirmationKind::AttachmentOffer);
    assert_eq!(pending.offers.len(), 2);
}

#[tokio::test]
async fn missing_upload_does_not_stick() {
    let configured = existing_file();
    let mailer = RecordingMailer::new();
    let gate = gate(
        StubModel::replying("ok"),
        mailer.clone(),
        Some(configured.path().to_path_buf()),
    );
    let mut session = Session::new();
    gate.handle_input(&mut session, "resume").await;

    let err = gate
        .confirm(&mut session, 1, Some(PathBuf::from("/typo/resume.pdf")))
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::AttachmentMissing(ref msg) if msg.contains("/typo/resume.pdf")));
    assert!(mailer.sent().is_empty());
    assert!(session.pending().unwrap().upload.is_none());

    // The configured file is used again on the next plain confirm.
    gate.confirm(&mut session, 1, None).await.unwrap();
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].attachment.as_deref(), Some(configured.path()));
}

#[tokio::test]
async fn repeated_confirms_send_twice() {
    let file = existing_file();
    let mailer = RecordingMailer::new();
    let gate = gate(
        StubModel::replying("ok"),
        mailer.clone(),
        Some(file.path().to_path_buf()),
    );
    let mut session = Session::new();
    gate.handle_input(&mut session, "resume").await;

    gate.confirm(&mut session, 1, None).await.unwrap();
    gate.confirm(&mut session, 1, None).await.unwrap();

    let sent = mailer.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], sent[1]);
    assert_eq!(session.pending().unwrap().attempts(), 2);
}

#[tokio::test]
async fn mail_auth_failure_is_surfaced() {
    let mailer = RecordingMailer::rejecting();
    let gate = gate(
        StubModel::replying("Are you confirmed to send an email"),
        mailer.clone(),
        None,
    );
    let mut session = Session::new();
    gate.handle_input(&mut session, "go").await;

    let err = gate.confirm(&mut session, 1, None).await.unwrap_err();
    assert!(matches!(err, GateError::Mail(MailError::AuthFailed(_))));
    assert_eq!(session.confirmation_state(), ConfirmationState::Failed);
    let status = session.mail_status().unwrap();
    assert!(status.is_error());
    assert!(status.message.contains("535"));
    // Exactly one attempt, no retry; the conversation is untouched.
    assert_eq!(mailer.sent().len(), 1);
    assert_eq!(session.turns().len(), 2);
}
