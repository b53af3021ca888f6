pub mod matcher;
pub mod redact;
pub mod rules;

use std::error::Error;
use std::fmt;
use std::io;

use log::{debug, info};
use serde::Serialize;

use crate::mailbox::audit::AuditSink;
use crate::mailbox::MailRecord;
use crate::message::{MessageNode, Payload};
use crate::sanitizer::matcher::{evaluate_content_block, evaluate_message_block, Verdict};
use crate::sanitizer::redact::{redact_bad_content, redact_whole_message};
use crate::sanitizer::rules::RuleSet;

/// Failure while sanitizing one message. The run goes on with the next one.
#[derive(Debug)]
pub enum SanitizeError {
    TooDeep { limit: usize },
    InvalidStructure { content_type: String, container: bool },
    Audit(io::Error),
}

impl fmt::Display for SanitizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SanitizeError::TooDeep { limit } => {
                write!(f, "MIME nesting deeper than {} levels", limit)
            }
            SanitizeError::InvalidStructure {
                content_type,
                container: true,
            } => write!(f, "container part declares non-multipart type {}", content_type),
            SanitizeError::InvalidStructure {
                content_type,
                container: false,
            } => write!(f, "leaf part declares multipart type {}", content_type),
            SanitizeError::Audit(err) => write!(f, "cannot write audit log: {}", err),
        }
    }
}

impl Error for SanitizeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SanitizeError::Audit(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RedactionCounts {
    pub whole_messages: usize,
    pub bad_content_parts: usize,
}

/// Where the node being visited came from, for the audit log.
struct Origin<'r> {
    from_line: Option<&'r [u8]>,
    raw: Option<&'r [u8]>,
}

/// Walks a message tree and redacts whatever the rules block.
pub struct Sanitizer<'a> {
    rules: &'a RuleSet,
    audit: Option<&'a mut dyn AuditSink>,
    // Originals of the message in progress, written out once it succeeds.
    pending_audit: Vec<Vec<u8>>,
    counts: RedactionCounts,
}

impl<'a> Sanitizer<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Sanitizer {
            rules,
            audit: None,
            pending_audit: Vec::new(),
            counts: RedactionCounts::default(),
        }
    }

    pub fn with_audit(mut self, audit: &'a mut dyn AuditSink) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn rules(&self) -> &RuleSet {
        self.rules
    }

    /// Totals over every message sanitized successfully so far.
    pub fn counts(&self) -> RedactionCounts {
        self.counts
    }

    /// Sanitizes the parsed form of `record`. A message blocked at the top
    /// is audited with the record's original bytes.
    pub fn sanitize_record(
        &mut self,
        record: &MailRecord,
        node: MessageNode,
    ) -> Result<MessageNode, SanitizeError> {
        let origin = Origin {
            from_line: record.from_line.as_deref(),
            raw: Some(&record.raw),
        };
        self.sanitize_message(node, &origin)
    }

    pub fn sanitize(&mut self, node: MessageNode) -> Result<MessageNode, SanitizeError> {
        let origin = Origin {
            from_line: None,
            raw: None,
        };
        self.sanitize_message(node, &origin)
    }

    // Either the whole message goes through, counted and audited, or none
    // of it does.
    fn sanitize_message(
        &mut self,
        node: MessageNode,
        origin: &Origin<'_>,
    ) -> Result<MessageNode, SanitizeError> {
        let counts = self.counts;
        self.pending_audit.clear();

        let result = self
            .visit(node, 0, origin)
            .and_then(|sanitized| self.flush_audit(origin).map(|()| sanitized));
        if result.is_err() {
            self.counts = counts;
            self.pending_audit.clear();
        }
        result
    }

    fn visit(
        &mut self,
        node: MessageNode,
        depth: usize,
        origin: &Origin<'_>,
    ) -> Result<MessageNode, SanitizeError> {
        if depth > self.rules.max_depth {
            return Err(SanitizeError::TooDeep {
                limit: self.rules.max_depth,
            });
        }
        check_structure(&node)?;

        if let Verdict::BlockedWholeMessage(reason) = evaluate_message_block(&node, self.rules) {
            info!("Blocking message part at depth {}: {}", depth, reason);
            debug!("Block reason detail: {:?}", reason);
            if self.audit.is_some() {
                let original = match origin.raw {
                    Some(raw) if depth == 0 => raw.to_vec(),
                    _ => node.to_bytes(),
                };
                self.pending_audit.push(original);
            }
            self.counts.whole_messages += 1;
            return Ok(redact_whole_message(node, self.rules));
        }

        if let Verdict::BlockedBadContent(bad) = evaluate_content_block(&node, self.rules) {
            info!(
                "Stripping {} part at depth {} (filename {:?})",
                bad.content_type, depth, bad.filename
            );
            self.counts.bad_content_parts += 1;
            return Ok(redact_bad_content(node, &bad, self.rules));
        }

        let MessageNode {
            headers,
            payload,
            line_ending,
        } = node;
        let payload = match payload {
            Payload::Parts(parts) => Payload::Parts(
                parts
                    .into_iter()
                    .map(|part| self.visit(part, depth + 1, origin))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            leaf => leaf,
        };
        Ok(MessageNode {
            headers,
            payload,
            line_ending,
        })
    }

    fn flush_audit(&mut self, origin: &Origin<'_>) -> Result<(), SanitizeError> {
        let Some(sink) = self.audit.as_mut() else {
            return Ok(());
        };
        for original in self.pending_audit.drain(..) {
            sink.record(origin.from_line, &original)
                .map_err(SanitizeError::Audit)?;
        }
        Ok(())
    }
}

fn check_structure(node: &MessageNode) -> Result<(), SanitizeError> {
    let mime_type = node.mime_type();
    let multipart = mime_type
        .as_deref()
        .is_some_and(|mime_type| mime_type.starts_with("multipart/"));
    if multipart != node.is_container() {
        return Err(SanitizeError::InvalidStructure {
            content_type: mime_type.unwrap_or_else(|| "(none)".to_string()),
            container: node.is_container(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested(depth: usize) -> MessageNode {
        let mut node = MessageNode::leaf(&[("Content-Type", "text/plain")], "deep");
        for _ in 0..depth {
            node = MessageNode::container(
                &[("Content-Type", "multipart/mixed; boundary=\"b\"")],
                vec![node],
            );
        }
        node
    }

    #[test]
    fn test_depth_limit() {
        let rules = RuleSet {
            max_depth: 3,
            ..Default::default()
        };
        assert!(Sanitizer::new(&rules).sanitize(nested(3)).is_ok());
        assert!(matches!(
            Sanitizer::new(&rules).sanitize(nested(4)),
            Err(SanitizeError::TooDeep { limit: 3 })
        ));
    }

    #[test]
    fn test_container_without_multipart_type_is_rejected() {
        let node = MessageNode::container(&[("Content-Type", "text/plain")], vec![]);
        assert!(matches!(
            Sanitizer::new(&RuleSet::default()).sanitize(node),
            Err(SanitizeError::InvalidStructure { container: true, .. })
        ));
    }

    #[test]
    fn test_leaf_with_multipart_type_is_rejected() {
        let node = MessageNode::leaf(&[("Content-Type", "multipart/mixed")], "no boundary");
        assert!(matches!(
            Sanitizer::new(&RuleSet::default()).sanitize(node),
            Err(SanitizeError::InvalidStructure { container: false, .. })
        ));
    }

    #[test]
    fn test_empty_container_is_unchanged() {
        let node = MessageNode::container(&[("Content-Type", "multipart/mixed; boundary=b")], vec![]);
        let sanitized = Sanitizer::new(&RuleSet::default()).sanitize(node.clone()).unwrap();
        assert_eq!(sanitized, node);
    }

    #[test]
    fn test_counts_accumulate() {
        let rules = RuleSet {
            block_subjects: vec!["secret".to_string()],
            ..Default::default()
        };
        let mut sanitizer = Sanitizer::new(&rules);
        let blocked = MessageNode::leaf(&[("Subject", "secret plan")], "x");
        let image = MessageNode::leaf(&[("Content-Type", "image/gif")], "GIF89a");
        sanitizer.sanitize(blocked).unwrap();
        sanitizer.sanitize(image).unwrap();
        assert_eq!(
            sanitizer.counts(),
            RedactionCounts {
                whole_messages: 1,
                bad_content_parts: 1
            }
        );
    }

    #[test]
    fn test_failed_message_leaves_no_audit_entry_or_counts() {
        use crate::mailbox::audit::AuditEntry;

        let rules = RuleSet {
            block_addresses: vec!["@corp.com".to_string()],
            ..Default::default()
        };
        let message = MessageNode::container(
            &[("Content-Type", "multipart/mixed; boundary=b")],
            vec![
                MessageNode::leaf(&[("From", "ann@corp.com"), ("Content-Type", "message/rfc822")], "fwd"),
                MessageNode::leaf(&[("Content-Type", "multipart/mixed")], "no boundary"),
            ],
        );
        let blocked = MessageNode::leaf(&[("From", "ann@corp.com")], "hi");

        let mut audit: Vec<AuditEntry> = Vec::new();
        {
            let mut sanitizer = Sanitizer::new(&rules).with_audit(&mut audit);
            assert!(sanitizer.sanitize(message).is_err());
            assert_eq!(sanitizer.counts(), RedactionCounts::default());
            sanitizer.sanitize(blocked).unwrap();
            assert_eq!(sanitizer.counts().whole_messages, 1);
        }
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].original, b"From: ann@corp.com\n\nhi".to_vec());
    }
}
