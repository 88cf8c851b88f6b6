//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default chat-completions endpoint.
pub const DEFAULT_MODEL_URL: &str = "https://api.poe.com/v1/chat/completions";

/// Default model (bot) name on the endpoint.
pub const DEFAULT_MODEL: &str = "ChatBot_CSS";

pub const DEFAULT_SUBJECT: &str = "Resume";

pub const DEFAULT_BODY: &str =
    "Hello,\n\nPlease find my resume attached as requested.\n\nBest regards";

/// Canned assistant reply used for greetings.
pub const DEFAULT_GREETING_REPLY: &str =
    "Hi there! You said 'Hello', so I'm giving you a special greeting! 😊";

/// Keys that must be present for the program to start.
pub const REQUIRED_KEYS: [&str; 4] = ["POE_API_KEY", "MAIL_FROM", "MAIL_PASSWORD", "MAIL_RECIPIENT"];

/// Model endpoint configuration.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub url: String,
    pub api_key: SecretString,
    pub model: String,
    /// Whole-request timeout. `None` keeps the HTTP client default.
    pub timeout: Option<Duration>,
}

/// SMTP configuration.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Use STARTTLS on a plain connection instead of implicit TLS.
    pub starttls: bool,
    pub username: String,
    pub password: SecretString,
    /// Sender identity used on every outgoing email.
    pub from_address: String,
}

/// Fixed email content and recipient used when a confirmation is accepted.
#[derive(Debug, Clone)]
pub struct EmailTemplate {
    pub from_address: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<PathBuf>,
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub mail: MailConfig,
    pub template: EmailTemplate,
    pub greeting_reply: String,
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// Every absent required key is reported in a single error. Values are
    /// checked for presence only, apart from numeric parsing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| get(*key).is_none())
            .map(String::from)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingConfiguration { keys: missing });
        }

        let api_key = get("POE_API_KEY").unwrap_or_default();
        let from_address = get("MAIL_FROM").unwrap_or_default();
        let password = get("MAIL_PASSWORD").unwrap_or_default();
        let recipient = get("MAIL_RECIPIENT").unwrap_or_default();

        let timeout = match get("CHAT_HTTP_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(parse_number("CHAT_HTTP_TIMEOUT_SECS", &raw)?)),
            None => None,
        };
        let smtp_port = match get("MAIL_SMTP_PORT") {
            Some(raw) => parse_number("MAIL_SMTP_PORT", &raw)?,
            None => 465,
        };
        let starttls = match get("MAIL_SMTP_STARTTLS") {
            Some(raw) => parse_bool("MAIL_SMTP_STARTTLS", &raw)?,
            None => false,
        };

        Ok(Self {
            model: ModelConfig {
                url: get("CHAT_MODEL_URL").unwrap_or_else(|| DEFAULT_MODEL_URL.to_string()),
                api_key: SecretString::from(api_key),
                model: get("CHAT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                timeout,
            },
            mail: MailConfig {
                smtp_host: get("MAIL_SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
                smtp_port,
                starttls,
                username: get("MAIL_USERNAME").unwrap_or_else(|| from_address.clone()),
                password: SecretString::from(password),
                from_address: from_address.clone(),
            },
            template: EmailTemplate {
                from_address,
                recipient,
                subject: get("MAIL_SUBJECT").unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
                body: get("MAIL_BODY")
                    .map(|b| b.replace("\\n", "\n"))
                    .unwrap_or_else(|| DEFAULT_BODY.to_string()),
                attachment: get("MAIL_ATTACHMENT_PATH").map(PathBuf::from),
            },
            greeting_reply: DEFAULT_GREETING_REPLY.to_string(),
            log_dir: get("CHAT_GATE_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected a number, got '{raw}'"),
    })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{raw}'"),
        }),
    }
}
