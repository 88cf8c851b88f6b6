//! Outbound mail: the request type, the sender trait, and the SMTP sender.

pub mod smtp;

pub use smtp::SmtpMailer;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::MailError;

/// One email to send. Built when a confirmation is accepted; never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRequest {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<PathBuf>,
}

/// Sends a composed email. Implementations make exactly one attempt.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, request: &EmailRequest) -> Result<(), MailError>;
}
