//! Recipient extraction from "... sent out to someone@example.com." replies.
//!
//! This is plain string slicing, not address parsing: the recipient is
//! whatever sits between the first `"to "` after the trigger phrase and the
//! next sentence-ending period (a `.` followed by whitespace or end of text).
//! Addresses are not validated here; the mail transport rejects bad ones.

use crate::error::GateError;

const RECIPIENT_MARKER: &str = "to ";

/// Extract the inline recipient from `text`, searching from byte offset `from`.
pub fn extract_recipient(text: &str, from: usize) -> Result<String, GateError> {
    let tail = text.get(from..).ok_or_else(|| GateError::AddressExtractionFailure {
        reason: format!("offset {from} is outside the reply"),
    })?;

    let marker = tail
        .find(RECIPIENT_MARKER)
        .ok_or_else(|| GateError::AddressExtractionFailure {
            reason: format!("no \"{}\" after the trigger phrase", RECIPIENT_MARKER.trim_end()),
        })?;
    let candidate = &tail[marker + RECIPIENT_MARKER.len()..];

    let end = sentence_end(candidate).ok_or_else(|| GateError::AddressExtractionFailure {
        reason: "no terminating period after the recipient".into(),
    })?;

    let recipient = candidate[..end].trim();
    if recipient.is_empty() {
        return Err(GateError::AddressExtractionFailure {
            reason: "recipient is empty".into(),
        });
    }
    Ok(recipient.to_string())
}

/// Index of the first `.` followed by whitespace or end of text.
fn sentence_end(text: &str) -> Option<usize> {
    text.char_indices()
        .filter(|(_, c)| *c == '.')
        .map(|(i, _)| i)
        .find(|&i| text[i + 1..].chars().next().is_none_or(char::is_whitespace))
}
