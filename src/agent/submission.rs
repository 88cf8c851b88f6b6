//! Operator submissions: chat input, confirmation controls, and commands.

use std::path::PathBuf;

/// Parses operator input into Submission types.
pub struct SubmissionParser;

impl SubmissionParser {
    /// Parse one line of operator input.
    pub fn parse(content: &str) -> Submission {
        let trimmed = content.trim();
        let lower = trimmed.to_lowercase();

        match lower.as_str() {
            "/dismiss" | "/cancel" => Submission::Dismiss,
            "/history" => Submission::History,
            "/status" => Submission::Status,
            "/help" | "/?" => Submission::Help,
            "/quit" | "/exit" => Submission::Quit,

            // Bare approval keywords only count while a confirmation is
            // awaiting its first answer; the agent turns them back into chat
            // input otherwise.
            "yes" | "y" | "confirm" | "send" => Submission::ApprovalResponse { approved: true },
            "no" | "n" | "cancel" => Submission::ApprovalResponse { approved: false },

            _ => parse_confirm(trimmed, &lower).unwrap_or_else(|| Submission::UserInput {
                content: content.to_string(),
            }),
        }
    }
}

/// `/confirm [n] [path]` — accept offer `n` (default 1), optionally with an
/// attachment path that replaces the configured one.
fn parse_confirm(trimmed: &str, lower: &str) -> Option<Submission> {
    if lower != "/confirm" && !lower.starts_with("/confirm ") {
        return None;
    }
    let rest = trimmed["/confirm".len()..].trim();
    if rest.is_empty() {
        return Some(Submission::Confirm {
            offer: 1,
            upload: None,
        });
    }

    let (first, tail) = match rest.split_once(char::is_whitespace) {
        Some((first, tail)) => (first, tail.trim()),
        None => (rest, ""),
    };
    let (offer, path) = match first.parse::<usize>() {
        Ok(n) => (n, tail),
        Err(_) => (1, rest),
    };
    Some(Submission::Confirm {
        offer,
        upload: (!path.is_empty()).then(|| PathBuf::from(path)),
    })
}

/// A submission from the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Chat text for the conversation gate.
    UserInput { content: String },

    /// Accept a specific offer of the pending confirmation.
    Confirm {
        /// 1-based offer number.
        offer: usize,
        /// Attachment path supplied by the operator.
        upload: Option<PathBuf>,
    },

    /// Bare yes/no for the pending confirmation (first offer on yes).
    ApprovalResponse { approved: bool },

    /// Drop the pending confirmation.
    Dismiss,

    /// Re-render the whole conversation.
    History,

    /// Show model/mail status and any pending confirmation.
    Status,

    Help,

    Quit,
}

impl Submission {
    pub fn user_input(content: impl Into<String>) -> Self {
        Self::UserInput {
            content: content.into(),
        }
    }
}
