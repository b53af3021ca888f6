pub mod parse;
pub mod render;

pub use parse::parse_message;

/// A single header line. The value is kept as the raw bytes that followed
/// the colon (folding included) so that untouched headers render unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub name: String,
    pub value: Vec<u8>,
}

/// Ordered header list with case-insensitive lookup. Duplicates are kept.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn new() -> Self {
        Headers(Vec::new())
    }

    pub fn push(&mut self, name: &str, value: impl AsRef<[u8]>) {
        self.0.push(Header {
            name: name.to_string(),
            value: value.as_ref().to_vec(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get_first(&self, name: &str) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_slice())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.0
            .iter()
            .filter(move |header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_slice())
    }

    /// Values with RFC 2047 encoded-words resolved and folding removed.
    pub fn get_all_decoded(&self, name: &str) -> Vec<String> {
        self.get_all(name)
            .map(|value| decode_header_value(name, value))
            .collect()
    }

    pub fn get_first_decoded(&self, name: &str) -> Option<String> {
        self.get_first(name).map(|value| decode_header_value(name, value))
    }

    /// Removes every occurrence of `name`. Absent headers are not an error.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.0.len();
        self.0.retain(|header| !header.name.eq_ignore_ascii_case(name));
        before - self.0.len()
    }

    /// Replaces the first occurrence in place and drops the rest, or appends.
    pub fn set(&mut self, name: &str, value: &str) {
        match self
            .0
            .iter()
            .position(|header| header.name.eq_ignore_ascii_case(name))
        {
            Some(index) => {
                self.0[index].value = value.as_bytes().to_vec();
                let mut seen = 0;
                self.0.retain(|header| {
                    if header.name.eq_ignore_ascii_case(name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.push(name, value),
        }
    }
}

fn decode_header_value(name: &str, value: &[u8]) -> String {
    let mut line = format!("{}: ", name).into_bytes();
    line.extend_from_slice(value);
    match mailparse::parse_header(&line) {
        Ok((header, _)) => header.get_value(),
        Err(_) => String::from_utf8_lossy(value).into_owned(),
    }
}

/// Line terminator a node was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    /// Guesses from the first line of `raw`.
    pub fn detect(raw: &[u8]) -> Self {
        match raw.iter().position(|byte| *byte == b'\n') {
            Some(index) if index > 0 && raw[index - 1] == b'\r' => LineEnding::CrLf,
            _ => LineEnding::Lf,
        }
    }

    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
        }
    }

    /// Rewrites `\n`-terminated text to use this ending.
    pub fn apply(self, text: &str) -> String {
        match self {
            LineEnding::Lf => text.to_string(),
            LineEnding::CrLf => text.replace('\n', "\r\n"),
        }
    }
}

/// Body of a leaf part. `raw` is the transfer-encoded bytes that get written
/// back out, `text` is the decoded form used for body matching.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LeafBody {
    pub raw: Vec<u8>,
    pub text: String,
}

impl LeafBody {
    pub fn plain(text: &str) -> Self {
        LeafBody {
            raw: text.as_bytes().to_vec(),
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(LeafBody),
    Parts(Vec<MessageNode>),
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Text(LeafBody::default())
    }
}

/// A whole message or one MIME part of it. A node is either a leaf carrying
/// text or a container carrying child nodes, never both.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageNode {
    pub headers: Headers,
    pub payload: Payload,
    pub line_ending: LineEnding,
}

impl MessageNode {
    pub fn leaf(headers: &[(&str, &str)], body: &str) -> Self {
        MessageNode {
            headers: headers_from(headers),
            payload: Payload::Text(LeafBody::plain(body)),
            line_ending: LineEnding::Lf,
        }
    }

    pub fn container(headers: &[(&str, &str)], parts: Vec<MessageNode>) -> Self {
        MessageNode {
            headers: headers_from(headers),
            payload: Payload::Parts(parts),
            line_ending: LineEnding::Lf,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self.payload, Payload::Parts(_))
    }

    /// Lowercased `type/subtype`, or `None` when there is no usable
    /// Content-Type header.
    pub fn mime_type(&self) -> Option<String> {
        let value = self.headers.get_first_decoded("Content-Type")?;
        let mimetype = mailparse::parse_content_type(&value).mimetype;
        if mimetype.contains('/') {
            Some(mimetype)
        } else {
            None
        }
    }

    /// Content-Type parameters without the type token, sorted by name.
    pub fn content_type_params(&self) -> Vec<(String, String)> {
        let Some(value) = self.headers.get_first_decoded("Content-Type") else {
            return Vec::new();
        };
        let ctype = mailparse::parse_content_type(&value);
        let mut params = ctype.params;
        if !params.contains_key("charset") && value.to_lowercase().contains("charset") {
            params.insert("charset".to_string(), ctype.charset);
        }
        params.into_iter().collect()
    }

    pub fn boundary(&self) -> Option<String> {
        self.content_type_params()
            .into_iter()
            .find(|(key, _)| key == "boundary")
            .map(|(_, value)| value)
    }

    /// Content-Disposition `filename`, falling back to Content-Type `name`.
    pub fn filename(&self) -> Option<String> {
        self.headers
            .get_first_decoded("Content-Disposition")
            .and_then(|value| {
                mailparse::parse_content_disposition(&value)
                    .params
                    .get("filename")
                    .cloned()
            })
            .or_else(|| {
                self.content_type_params()
                    .into_iter()
                    .find(|(key, _)| key == "name")
                    .map(|(_, value)| value)
            })
    }

    pub fn transfer_encoding(&self) -> Option<String> {
        self.headers
            .get_first_decoded("Content-Transfer-Encoding")
            .map(|value| value.trim().to_string())
    }

    /// Decoded body text. Containers have none.
    pub fn body_text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(body) => Some(body.text.as_str()),
            Payload::Parts(_) => None,
        }
    }

    pub fn parts(&self) -> &[MessageNode] {
        match &self.payload {
            Payload::Text(_) => &[],
            Payload::Parts(parts) => parts,
        }
    }
}

fn headers_from(pairs: &[(&str, &str)]) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in pairs {
        headers.push(name, value);
    }
    headers
}
