//! SMTP mail sender via lettre.

use std::path::Path;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::MailConfig;
use crate::error::MailError;
use crate::mail::{EmailRequest, MailSender};

/// SMTP reply codes that mean the server refused our credentials.
const AUTH_REJECTED_CODES: [&str; 3] = ["530", "534", "535"];

/// Authenticated SMTP sender.
pub struct SmtpMailer {
    config: MailConfig,
}

impl SmtpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<SmtpTransport, MailError> {
        let builder = if self.config.starttls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
        } else {
            SmtpTransport::relay(&self.config.smtp_host)
        }
        .map_err(|e| MailError::Transport(format!("SMTP relay error: {e}")))?;

        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );

        Ok(builder
            .port(self.config.smtp_port)
            .credentials(creds)
            .build())
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, request: &EmailRequest) -> Result<(), MailError> {
        // Read the attachment before touching the network.
        let attachment = match &request.attachment {
            Some(path) => Some(read_attachment(path).await?),
            None => None,
        };
        let email = build_message(request, attachment)?;
        let transport = self.transport()?;
        let to = request.to.clone();

        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| MailError::Transport(format!("SMTP task panicked: {e}")))?
            .map_err(classify_smtp_error)?;

        tracing::info!(recipient = %to, "Email sent");
        Ok(())
    }
}

/// Attachment file name and contents.
pub struct AttachmentData {
    pub filename: String,
    pub content_type: ContentType,
    pub bytes: Vec<u8>,
}

async fn read_attachment(path: &Path) -> Result<AttachmentData, MailError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "Attachment unreadable");
        MailError::AttachmentMissing {
            path: path.to_path_buf(),
        }
    })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    Ok(AttachmentData {
        content_type: guess_content_type(path),
        filename,
        bytes,
    })
}

/// Content type from the file extension; unknown types are sent as bytes.
pub fn guess_content_type(path: &Path) -> ContentType {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    ContentType::parse(mime.essence_str()).unwrap_or_else(|_| octet_stream())
}

fn octet_stream() -> ContentType {
    ContentType::parse("application/octet-stream").unwrap_or(ContentType::TEXT_PLAIN)
}

fn parse_mailbox(field: &'static str, value: &str) -> Result<Mailbox, MailError> {
    value.parse().map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Compose the message: plain body, plus a `multipart/mixed` wrapper when
/// there is an attachment.
pub fn build_message(
    request: &EmailRequest,
    attachment: Option<AttachmentData>,
) -> Result<Message, MailError> {
    let builder = Message::builder()
        .from(parse_mailbox("from", &request.from)?)
        .to(parse_mailbox("to", &request.to)?)
        .subject(&request.subject);

    let built = match attachment {
        None => builder
            .header(ContentType::TEXT_PLAIN)
            .body(request.body.clone()),
        Some(file) => builder.multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(request.body.clone()))
                .singlepart(Attachment::new(file.filename).body(file.bytes, file.content_type)),
        ),
    };
    built.map_err(|e| MailError::Build(e.to_string()))
}

fn classify_smtp_error(err: lettre::transport::smtp::Error) -> MailError {
    let code = err.status().map(|c| c.to_string());
    if code
        .as_deref()
        .is_some_and(|c| AUTH_REJECTED_CODES.contains(&c))
    {
        tracing::error!(code = ?code, "SMTP authentication rejected");
        MailError::AuthFailed(err.to_string())
    } else {
        tracing::error!(code = ?code, error = %err, "SMTP send failed");
        MailError::Transport(err.to_string())
    }
}
