use std::io::{self, Write};

use crate::message::{MessageNode, Payload};

// Used only for hand-built containers that never declared a boundary.
const FALLBACK_BOUNDARY: &str = "=_mailstrip_boundary";

impl MessageNode {
    /// Writes the node back out as raw message text.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        self.write_part(out)?;
        if self.is_container() {
            out.write_all(self.line_ending.as_bytes())?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut out);
        out
    }

    // A part ends right before the line break that opens the next delimiter,
    // so that break is written here and never taken from the part itself.
    fn write_part<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let eol = self.line_ending.as_bytes();
        for header in self.headers.iter() {
            out.write_all(header.name.as_bytes())?;
            out.write_all(b": ")?;
            out.write_all(&header.value)?;
            out.write_all(eol)?;
        }
        out.write_all(eol)?;

        match &self.payload {
            Payload::Text(body) => out.write_all(&body.raw),
            Payload::Parts(parts) => {
                let boundary = self
                    .boundary()
                    .unwrap_or_else(|| FALLBACK_BOUNDARY.to_string());
                for part in parts {
                    write!(out, "--{}", boundary)?;
                    out.write_all(eol)?;
                    part.write_part(out)?;
                    out.write_all(eol)?;
                }
                write!(out, "--{}--", boundary)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::message::{parse_message, MessageNode};
    use crate::sanitizer::rules::DEFAULT_MAX_DEPTH;

    #[test]
    fn test_render_leaf() {
        let node = MessageNode::leaf(&[("Subject", "hi"), ("Content-Type", "text/plain")], "body\n");
        assert_eq!(node.to_bytes(), b"Subject: hi\nContent-Type: text/plain\n\nbody\n".to_vec());
    }

    #[test]
    fn test_render_container_reparses_to_same_tree() {
        let node = MessageNode::container(
            &[("Content-Type", "multipart/mixed; boundary=\"b1\"")],
            vec![
                MessageNode::leaf(&[("Content-Type", "text/plain")], "one"),
                MessageNode::leaf(&[("Content-Type", "text/html")], "<p>two</p>"),
            ],
        );
        let rendered = String::from_utf8(node.to_bytes()).unwrap();
        assert!(rendered.contains("--b1\nContent-Type: text/plain\n\none\n--b1\n"));
        assert!(rendered.ends_with("--b1--\n"));

        let reparsed = parse_message(rendered.as_bytes(), DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(reparsed.parts().len(), 2);
        assert_eq!(reparsed.parts()[1].mime_type().as_deref(), Some("text/html"));
    }

    #[test]
    fn test_crlf_multipart_round_trips() {
        let raw = concat!(
            "From: a@b.c\r\n",
            "Subject: crlf\r\n",
            "Content-Type: multipart/mixed; boundary=\"X\"\r\n",
            "\r\n",
            "--X\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "line one\r\n",
            "\r\n",
            "--X\r\n",
            "Content-Type: multipart/alternative; boundary=\"Y\"\r\n",
            "\r\n",
            "--Y\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>two</p>\r\n",
            "--Y--\r\n",
            "--X--\r\n",
        );
        let node = parse_message(raw.as_bytes(), DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(String::from_utf8(node.to_bytes()).unwrap(), raw);
    }

    #[test]
    fn test_8bit_leaf_round_trips() {
        let raw = b"Subject: caf\xe9\nContent-Transfer-Encoding: 8bit\n\nCaf\xe9 au lait\n";
        let node = parse_message(raw, DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(node.to_bytes(), raw.to_vec());
    }
}
