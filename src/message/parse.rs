use anyhow::{Context, Result};
use mailparse::{body::Body, parse_headers, parse_mail, MailHeaderMap, ParsedMail};

use crate::message::{Headers, LeafBody, LineEnding, MessageNode, Payload};
use crate::sanitizer::SanitizeError;

/// Parses one raw message into a `MessageNode` tree no more than `max_depth`
/// multipart levels deep.
pub fn parse_message(raw: &[u8], max_depth: usize) -> Result<MessageNode> {
    // mailparse recurses once per multipart level, so the depth has to be
    // known before handing it the message.
    check_nesting(raw, max_depth)?;
    let parsed_mail = parse_mail(raw).context("Cannot parse the message")?;
    Ok(convert(&parsed_mail, 0, max_depth)?)
}

/// Counts nested multipart declarations with a flat line scan and fails once
/// more than `limit` of them are open at the same time.
pub fn check_nesting(raw: &[u8], limit: usize) -> Result<(), SanitizeError> {
    let mut delimiters: Vec<Vec<u8>> = Vec::new();
    let mut header_block: Vec<u8> = Vec::new();
    let mut in_headers = true;

    for line in raw.split_inclusive(|byte| *byte == b'\n') {
        let bare = trim_line_ending(line);

        if in_headers {
            if bare.is_empty() {
                in_headers = false;
                if let Some(delimiter) = multipart_delimiter(&header_block) {
                    delimiters.push(delimiter);
                    if delimiters.len() > limit {
                        return Err(SanitizeError::TooDeep { limit });
                    }
                }
                header_block.clear();
            } else {
                header_block.extend_from_slice(line);
            }
            continue;
        }

        let open = delimiters
            .iter()
            .rposition(|delimiter| bare.starts_with(delimiter));
        if let Some(level) = open {
            if bare[delimiters[level].len()..].starts_with(b"--") {
                delimiters.truncate(level);
            } else {
                delimiters.truncate(level + 1);
                in_headers = true;
            }
        }
    }

    Ok(())
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn multipart_delimiter(header_block: &[u8]) -> Option<Vec<u8>> {
    let (headers, _) = parse_headers(header_block).ok()?;
    let ctype = mailparse::parse_content_type(&headers.get_first_value("Content-Type")?);
    if !ctype.mimetype.starts_with("multipart/") {
        return None;
    }
    let boundary = ctype.params.get("boundary")?;
    Some(format!("--{}", boundary).into_bytes())
}

fn convert(part: &ParsedMail<'_>, depth: usize, limit: usize) -> Result<MessageNode, SanitizeError> {
    if depth > limit {
        return Err(SanitizeError::TooDeep { limit });
    }

    let mut headers = Headers::new();
    for header in &part.headers {
        headers.push(&header.get_key(), header.get_value_raw());
    }

    // A multipart type without a boundary has no parsed children and is
    // kept as a leaf; the sanitizer rejects it as malformed.
    let is_container = part.ctype.mimetype.starts_with("multipart/")
        && part.ctype.params.contains_key("boundary");

    let payload = if is_container {
        Payload::Parts(
            part.subparts
                .iter()
                .map(|subpart| convert(subpart, depth + 1, limit))
                .collect::<Result<Vec<_>, _>>()?,
        )
    } else {
        let raw = encoded_body(part);
        let text = part
            .get_body()
            .unwrap_or_else(|_| String::from_utf8_lossy(&raw).into_owned());
        Payload::Text(LeafBody { raw, text })
    };

    Ok(MessageNode {
        headers,
        payload,
        line_ending: LineEnding::detect(part.raw_bytes),
    })
}

fn encoded_body(part: &ParsedMail<'_>) -> Vec<u8> {
    match part.get_body_encoded() {
        Body::Base64(body) | Body::QuotedPrintable(body) => body.get_raw().to_vec(),
        Body::SevenBit(body) | Body::EightBit(body) => body.get_raw().to_vec(),
        Body::Binary(body) => body.get_raw().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitizer::rules::DEFAULT_MAX_DEPTH;

    fn nested_multipart(levels: usize) -> Vec<u8> {
        let mut raw = String::from("From: a@home.net\n");
        for level in 0..levels {
            raw.push_str(&format!(
                "Content-Type: multipart/mixed; boundary=\"b{}\"\n\n--b{}\n",
                level, level
            ));
        }
        raw.push_str("Content-Type: text/plain\n\ndeep\n");
        raw.into_bytes()
    }

    #[test]
    fn test_parse_plain_message() {
        let raw = b"From: alice@corp.com\r\nSubject: Re: budget\r\nContent-Type: text/plain\r\n\r\nlunch at noon\r\n";
        let node = parse_message(raw, DEFAULT_MAX_DEPTH).unwrap();
        assert!(!node.is_container());
        assert_eq!(node.line_ending, LineEnding::CrLf);
        assert_eq!(node.headers.get_first("Subject"), Some(&b"Re: budget"[..]));
        assert_eq!(node.mime_type().as_deref(), Some("text/plain"));
        assert!(node.body_text().unwrap().contains("lunch at noon"));
    }

    #[test]
    fn test_parse_multipart_children_in_order() {
        let raw = concat!(
            "Subject: parts\n",
            "Content-Type: multipart/mixed; boundary=\"XX\"\n",
            "\n",
            "--XX\n",
            "Content-Type: text/plain\n",
            "\n",
            "first\n",
            "--XX\n",
            "Content-Type: application/msword; name=\"resume.doc\"\n",
            "\n",
            "second\n",
            "--XX--\n",
        );
        let node = parse_message(raw.as_bytes(), DEFAULT_MAX_DEPTH).unwrap();
        assert!(node.is_container());
        assert_eq!(node.line_ending, LineEnding::Lf);
        assert_eq!(node.parts().len(), 2);
        assert_eq!(node.parts()[0].mime_type().as_deref(), Some("text/plain"));
        assert_eq!(node.parts()[1].filename().as_deref(), Some("resume.doc"));
    }

    #[test]
    fn test_base64_body_keeps_raw_and_decodes_text() {
        let raw = b"Content-Type: text/plain\nContent-Transfer-Encoding: base64\n\naGVsbG8gd29ybGQ=\n";
        let node = parse_message(raw, DEFAULT_MAX_DEPTH).unwrap();
        match &node.payload {
            Payload::Text(body) => {
                assert!(body.raw.starts_with(b"aGVsbG8gd29ybGQ="));
                assert!(body.text.contains("hello world"));
            }
            Payload::Parts(_) => panic!("expected a leaf"),
        }
    }

    #[test]
    fn test_8bit_bytes_are_not_rewritten() {
        let raw = b"Subject: caf\xe9\nContent-Type: text/plain; charset=iso-8859-1\nContent-Transfer-Encoding: 8bit\n\nCaf\xe9 au lait\n";
        let node = parse_message(raw, DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(node.headers.get_first("Subject"), Some(&b"caf\xe9"[..]));
        match &node.payload {
            Payload::Text(body) => assert_eq!(body.raw, b"Caf\xe9 au lait\n".to_vec()),
            Payload::Parts(_) => panic!("expected a leaf"),
        }
    }

    #[test]
    fn test_nesting_within_limit() {
        assert!(check_nesting(&nested_multipart(3), 3).is_ok());
        let node = parse_message(&nested_multipart(3), 3).unwrap();
        let leaf = &node.parts()[0].parts()[0].parts()[0];
        assert!(leaf.body_text().unwrap().contains("deep"));
    }

    #[test]
    fn test_nesting_over_limit_fails_before_parsing() {
        assert!(matches!(
            check_nesting(&nested_multipart(4), 3),
            Err(SanitizeError::TooDeep { limit: 3 })
        ));
        // Deep enough to exhaust the stack if it ever reached mailparse.
        assert!(parse_message(&nested_multipart(20_000), DEFAULT_MAX_DEPTH).is_err());
    }

    #[test]
    fn test_closed_siblings_do_not_count_as_nesting() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=\"outer\"\n",
            "\n",
            "--outer\n",
            "Content-Type: multipart/alternative; boundary=\"a\"\n",
            "\n",
            "--a\n",
            "\n",
            "one\n",
            "--a--\n",
            "--outer\n",
            "Content-Type: multipart/alternative; boundary=\"b\"\n",
            "\n",
            "--b\n",
            "\n",
            "two\n",
            "--b--\n",
            "--outer--\n",
        );
        assert!(check_nesting(raw.as_bytes(), 2).is_ok());
        assert!(check_nesting(raw.as_bytes(), 1).is_err());
    }
}
