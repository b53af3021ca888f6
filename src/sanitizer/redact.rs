use itertools::Itertools;

use crate::message::{LeafBody, MessageNode, Payload};
use crate::sanitizer::matcher::BadContent;
use crate::sanitizer::rules::{Placeholder, RuleSet};

const BANNER: &str = "************************************************************";

// These describe the old body and are wrong for the plain text replacing it.
const BODY_HEADERS: [&str; 2] = ["Content-Transfer-Encoding", "Content-Disposition"];

/// Replaces a blocked message (or part) as a whole. Any children are dropped.
pub fn redact_whole_message(mut node: MessageNode, rules: &RuleSet) -> MessageNode {
    let clues = ["Received", "From", "To", "Subject"]
        .map(|name| (name, node.headers.get_first_decoded(name)));

    for name in &rules.delete_headers {
        node.headers.remove(name);
    }
    for name in BODY_HEADERS {
        node.headers.remove(name);
    }
    node.headers.set("Content-Type", "text/plain");

    let body = match &rules.placeholder {
        Placeholder::Stealth => String::new(),
        Placeholder::Notice { clue } => {
            let mut notice = format!("{}\n{}\n", BANNER, clue);
            for (name, value) in &clues {
                notice.push_str(&format!(
                    "{}: {}\n",
                    name,
                    value.as_deref().unwrap_or("(none)")
                ));
            }
            notice.push_str(BANNER);
            notice.push('\n');
            notice
        }
    };
    node.payload = Payload::Text(LeafBody::plain(&node.line_ending.apply(&body)));
    node
}

/// Replaces one part whose declared content is disallowed. `bad` carries the
/// attributes read from the part before it is touched.
pub fn redact_bad_content(mut node: MessageNode, bad: &BadContent, rules: &RuleSet) -> MessageNode {
    node.headers.set("Content-Type", "text/plain");
    for name in BODY_HEADERS {
        node.headers.remove(name);
    }

    let body = match &rules.placeholder {
        Placeholder::Stealth => String::new(),
        Placeholder::Notice { clue } => {
            let params = bad
                .params
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .join(", ");
            format!(
                "{banner}\n{clue}\n\
                 This message contained illegible data that was stripped out.\n\
                 The original type was: {content_type}\n\
                 The filename was: {filename}\n\
                 The transfer encoding was: {encoding}\n\
                 It had additional parameters of:\n\
                 {params}\n\
                 {banner}\n",
                banner = BANNER,
                clue = clue,
                content_type = bad.content_type,
                filename = bad.filename.as_deref().unwrap_or("(none)"),
                encoding = bad.encoding.as_deref().unwrap_or("(none)"),
                params = params,
            )
        }
    };
    node.payload = Payload::Text(LeafBody::plain(&node.line_ending.apply(&body)));
    node
}
