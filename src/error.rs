//! Error types for chat-gate.

/// Configuration-related errors. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {}", keys.join(", "))]
    MissingConfiguration { keys: Vec<String> },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Model client errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Mail sender errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("SMTP authentication rejected: {0}")]
    AuthFailed(String),

    #[error("Attachment not found: {}", path.display())]
    AttachmentMissing { path: std::path::PathBuf },

    #[error("Invalid {field} address '{value}': {reason}")]
    InvalidAddress {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP transport failed: {0}")]
    Transport(String),
}

/// Errors raised by the conversation gate for a single operator action.
///
/// None of these are fatal; the conversation is left as it was.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("Model unavailable: {0}")]
    ModelUnavailable(#[from] LlmError),

    #[error("Could not extract a recipient address: {reason}")]
    AddressExtractionFailure { reason: String },

    #[error("Attachment missing: {0}")]
    AttachmentMissing(String),

    #[error("No email is awaiting confirmation")]
    NoPendingConfirmation,

    #[error("No send option #{index} (choose 1-{available})")]
    UnknownOffer { index: usize, available: usize },

    #[error("Email send failed: {0}")]
    Mail(#[from] MailError),
}

/// Channel (presentation surface) errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to write to channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}
