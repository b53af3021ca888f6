use std::fmt;

use log::debug;

use crate::message::MessageNode;
use crate::sanitizer::rules::{ContentPolicy, RuleSet};

const ADDRESS_FIELDS: [&str; 4] = ["From", "To", "Cc", "Bcc"];

/// Why a node was blocked as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    Address { field: &'static str, rule: String },
    Subject { rule: String },
    Body { rule: String },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Address { field, .. } => write!(f, "address rule on {}", field),
            BlockReason::Subject { .. } => write!(f, "subject rule"),
            BlockReason::Body { .. } => write!(f, "body rule"),
        }
    }
}

/// Attributes of a part blocked for its declared content, captured before
/// the part is rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BadContent {
    pub content_type: String,
    pub filename: Option<String>,
    pub encoding: Option<String>,
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    NotBlocked,
    BlockedWholeMessage(BlockReason),
    BlockedBadContent(BadContent),
}

fn preview(string: &str) -> String {
    string
        .chars()
        .take(50)
        .filter(|c| *c != '\r' && *c != '\n')
        .collect()
}

fn find_rule<'r>(string: &str, rules: &'r [String]) -> Option<&'r String> {
    let found = rules.iter().find(|rule| string.contains(rule.as_str()));
    if let Some(rule) = found {
        debug!("String {} matched rule {}", preview(string), rule);
    }
    found
}

fn find_rule_ignore_case<'r>(string: &str, rules: &'r [String]) -> Option<&'r String> {
    let lowered = string.to_lowercase();
    let found = rules
        .iter()
        .find(|rule| lowered.contains(rule.to_lowercase().as_str()));
    if let Some(rule) = found {
        debug!("Body {} matched rule {}", preview(string), rule);
    }
    found
}

/// Decides whether the node is blocked as a whole. Addresses are checked
/// first (From, To, Cc, Bcc), then Subject, then the body of a leaf.
/// The first matching rule wins.
pub fn evaluate_message_block(node: &MessageNode, rules: &RuleSet) -> Verdict {
    for field in ADDRESS_FIELDS {
        for value in node.headers.get_all_decoded(field) {
            if let Some(rule) = find_rule(&value, &rules.block_addresses) {
                return Verdict::BlockedWholeMessage(BlockReason::Address {
                    field,
                    rule: rule.clone(),
                });
            }
        }
    }

    for subject in node.headers.get_all_decoded("Subject") {
        if let Some(rule) = find_rule(&subject, &rules.block_subjects) {
            return Verdict::BlockedWholeMessage(BlockReason::Subject { rule: rule.clone() });
        }
    }

    // Containers are never body-matched; their leaves are, on the way down.
    if let Some(body) = node.body_text() {
        if let Some(rule) = find_rule_ignore_case(body, &rules.block_bodies) {
            return Verdict::BlockedWholeMessage(BlockReason::Body { rule: rule.clone() });
        }
    }

    Verdict::NotBlocked
}

/// Decides whether the node's declared type, transfer encoding or filename
/// is disallowed, regardless of what it contains.
pub fn evaluate_content_block(node: &MessageNode, rules: &RuleSet) -> Verdict {
    let policy = &rules.bad_content;
    let mime_type = node.mime_type();
    let encoding = node.transfer_encoding();
    let filename = node.filename();

    let blocked = mime_type
        .as_deref()
        .is_some_and(|mime_type| bad_type(mime_type, policy))
        || encoding
            .as_deref()
            .is_some_and(|encoding| bad_encoding(encoding, policy))
        || filename
            .as_deref()
            .is_some_and(|filename| bad_extension(filename, policy));

    if !blocked {
        return Verdict::NotBlocked;
    }

    debug!(
        "Bad content: type {:?} filename {:?} encoding {:?}",
        mime_type, filename, encoding
    );
    Verdict::BlockedBadContent(BadContent {
        content_type: mime_type.unwrap_or_else(|| "text/plain".to_string()),
        filename,
        encoding,
        params: node.content_type_params(),
    })
}

fn bad_type(mime_type: &str, policy: &ContentPolicy) -> bool {
    let mime_type = mime_type.to_lowercase();
    policy
        .content_types
        .iter()
        .any(|bad| mime_type.contains(bad.to_lowercase().as_str()))
}

fn bad_encoding(encoding: &str, policy: &ContentPolicy) -> bool {
    let encoding = encoding.to_lowercase();
    policy
        .encodings
        .iter()
        .any(|bad| encoding.contains(bad.to_lowercase().as_str()))
}

fn bad_extension(filename: &str, policy: &ContentPolicy) -> bool {
    let filename = filename.to_lowercase();
    policy
        .extensions
        .iter()
        .any(|bad| filename.ends_with(bad.to_lowercase().as_str()))
}
