//! Trigger rules evaluated around the model call.
//!
//! Rules live in two ordered stages:
//! - **pre-model**: checked against the raw input before anything is sent to
//!   the model. A match short-circuits the model call entirely.
//! - **post-model**: checked after the reply is appended. Each rule looks at
//!   either the reply or the raw input.
//!
//! Within a stage, rules are evaluated top-to-bottom. In the pre-model stage
//! the first match wins. Post-model matches are yielded in order so the gate
//! can move on when a rule matches but cannot act (e.g. no recipient found).

use std::ops::Range;

use regex::Regex;
use tracing::debug;

/// Which text a rule matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTarget {
    UserInput,
    ModelReply,
}

/// How a rule recognizes its trigger phrase.
#[derive(Debug, Clone)]
pub enum TriggerPattern {
    /// Literal substring, optionally compared after case-folding.
    Substring {
        needle: String,
        case_insensitive: bool,
    },
    /// Compiled regex.
    Regex(Regex),
}

impl TriggerPattern {
    pub fn substring(needle: &str) -> Self {
        Self::Substring {
            needle: needle.to_string(),
            case_insensitive: false,
        }
    }

    pub fn substring_ignore_case(needle: &str) -> Self {
        Self::Substring {
            needle: needle.to_lowercase(),
            case_insensitive: true,
        }
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    /// Byte span of the first match in `text`.
    pub fn find(&self, text: &str) -> Option<Range<usize>> {
        match self {
            Self::Substring {
                needle,
                case_insensitive: false,
            } => text.find(needle.as_str()).map(|s| s..s + needle.len()),
            Self::Substring {
                needle,
                case_insensitive: true,
            } => find_ignore_case(text, needle),
            Self::Regex(re) => re.find(text).map(|m| m.range()),
        }
    }
}

impl std::fmt::Display for TriggerPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Substring {
                needle,
                case_insensitive,
            } => {
                if *case_insensitive {
                    write!(f, "\"{needle}\" (any case)")
                } else {
                    write!(f, "\"{needle}\"")
                }
            }
            Self::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// Case-insensitive substring search returning a span in the original text.
///
/// Lowercasing can change byte lengths for some scripts, so the span is
/// mapped back through char boundaries of the original string.
fn find_ignore_case(text: &str, needle_lower: &str) -> Option<Range<usize>> {
    if needle_lower.is_empty() {
        return Some(0..0);
    }
    let needle_chars = needle_lower.chars().count();
    let starts: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    for (n, &start) in starts.iter().enumerate() {
        let end = starts.get(n + needle_chars).copied().unwrap_or(text.len());
        if n + needle_chars > starts.len() {
            break;
        }
        if text[start..end].to_lowercase() == needle_lower {
            return Some(start..end);
        }
    }
    None
}

/// Which confirmation sub-flow a trigger opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationKind {
    /// The reply asks whether to send; one offer to the fixed recipient.
    ConfirmRequest,
    /// The reply claims a send happened and names the recipient inline.
    SentNotice,
    /// Offer the fixed email with and without the configured attachment.
    AttachmentOffer,
}

impl std::fmt::Display for ConfirmationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfirmRequest => write!(f, "confirm_request"),
            Self::SentNotice => write!(f, "sent_notice"),
            Self::AttachmentOffer => write!(f, "attachment_offer"),
        }
    }
}

/// What a matching rule does.
#[derive(Debug, Clone)]
pub enum TriggerAction {
    /// Answer with fixed text instead of the model.
    CannedReply { text: String },
    /// Raise a pending email confirmation.
    EmailConfirmation(ConfirmationKind),
}

/// A single trigger rule.
#[derive(Debug, Clone)]
pub struct TriggerRule {
    /// Short name used in logs and status lines.
    pub name: String,
    pub pattern: TriggerPattern,
    pub target: MatchTarget,
    pub action: TriggerAction,
}

/// A rule that fired, with where it matched.
#[derive(Debug, Clone)]
pub struct RuleMatch<'a> {
    pub rule: &'a TriggerRule,
    /// Byte span of the trigger phrase within the matched text.
    pub span: Range<usize>,
}

impl TriggerRule {
    pub fn new(name: &str, pattern: TriggerPattern, target: MatchTarget, action: TriggerAction) -> Self {
        Self {
            name: name.to_string(),
            pattern,
            target,
            action,
        }
    }

    /// Test the rule against the input/reply pair. `reply` is `None` when
    /// the model was not reached; reply-side rules never match then.
    pub fn matches(&self, input: &str, reply: Option<&str>) -> Option<Range<usize>> {
        let text = match self.target {
            MatchTarget::UserInput => input,
            MatchTarget::ModelReply => reply?,
        };
        self.pattern.find(text)
    }
}

/// Ordered trigger rules for both stages.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pre_model: Vec<TriggerRule>,
    post_model: Vec<TriggerRule>,
}

impl RuleSet {
    /// The stock rule list: greeting short-circuit, then reply-side send
    /// triggers, then the input-side resume offer.
    pub fn default_rules(greeting_reply: &str) -> Self {
        let pre_model = vec![TriggerRule::new(
            "greeting",
            TriggerPattern::substring_ignore_case("hello"),
            MatchTarget::UserInput,
            TriggerAction::CannedReply {
                text: greeting_reply.to_string(),
            },
        )];

        let post_model = vec![
            TriggerRule::new(
                "confirm-request",
                TriggerPattern::substring("Are you confirmed to send an email"),
                MatchTarget::ModelReply,
                TriggerAction::EmailConfirmation(ConfirmationKind::ConfirmRequest),
            ),
            TriggerRule::new(
                "sent-notice",
                TriggerPattern::substring("has just sent out"),
                MatchTarget::ModelReply,
                TriggerAction::EmailConfirmation(ConfirmationKind::SentNotice),
            ),
            TriggerRule::new(
                "resume",
                TriggerPattern::substring_ignore_case("resume"),
                MatchTarget::UserInput,
                TriggerAction::EmailConfirmation(ConfirmationKind::AttachmentOffer),
            ),
        ];

        Self {
            pre_model,
            post_model,
        }
    }

    /// No rules at all; every input goes to the model.
    pub fn empty() -> Self {
        Self {
            pre_model: Vec::new(),
            post_model: Vec::new(),
        }
    }

    /// Append a rule checked before the model call.
    pub fn add_pre_model(&mut self, rule: TriggerRule) {
        self.pre_model.push(rule);
    }

    /// Append a rule checked after the model call.
    pub fn add_post_model(&mut self, rule: TriggerRule) {
        self.post_model.push(rule);
    }

    pub fn pre_model(&self) -> &[TriggerRule] {
        &self.pre_model
    }

    pub fn post_model(&self) -> &[TriggerRule] {
        &self.post_model
    }

    /// First pre-model rule matching the raw input.
    pub fn evaluate_pre_model(&self, input: &str) -> Option<RuleMatch<'_>> {
        first_match(&self.pre_model, input, None)
    }

    /// Every post-model rule matching the input or the reply, in rule order.
    pub fn post_model_matches<'a>(
        &'a self,
        input: &'a str,
        reply: Option<&'a str>,
    ) -> impl Iterator<Item = RuleMatch<'a>> + 'a {
        matching(&self.post_model, input, reply)
    }
}

fn first_match<'a>(
    rules: &'a [TriggerRule],
    input: &str,
    reply: Option<&str>,
) -> Option<RuleMatch<'a>> {
    rules.iter().find_map(|rule| rule_match(rule, input, reply))
}

fn matching<'a>(
    rules: &'a [TriggerRule],
    input: &'a str,
    reply: Option<&'a str>,
) -> impl Iterator<Item = RuleMatch<'a>> + 'a {
    rules
        .iter()
        .filter_map(move |rule| rule_match(rule, input, reply))
}

fn rule_match<'a>(rule: &'a TriggerRule, input: &str, reply: Option<&str>) -> Option<RuleMatch<'a>> {
    let span = rule.matches(input, reply)?;
    debug!(rule = %rule.name, pattern = %rule.pattern, "Trigger rule matched");
    Some(RuleMatch { rule, span })
}
