pub const DEFAULT_STRIP_CLUE: &str = "This message was stripped.";
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// How a redacted node's new body is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// A descriptive notice carrying the strip clue.
    Notice { clue: String },
    /// Empty content, no hint that anything was there.
    Stealth,
}

impl Default for Placeholder {
    fn default() -> Self {
        Placeholder::Notice {
            clue: DEFAULT_STRIP_CLUE.to_string(),
        }
    }
}

/// Parts whose declared type, encoding or filename is never let through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPolicy {
    /// Substrings of the lowercased `type/subtype`.
    pub content_types: Vec<String>,
    /// Substrings of the lowercased Content-Transfer-Encoding.
    pub encodings: Vec<String>,
    /// Filename suffixes, compared case-insensitively.
    pub extensions: Vec<String>,
}

impl Default for ContentPolicy {
    fn default() -> Self {
        ContentPolicy {
            content_types: to_strings(&[
                "application/msword",
                "application/msexcel",
                "image/jpeg",
                "image/png",
                "image/gif",
            ]),
            encodings: to_strings(&["base64"]),
            extensions: to_strings(&[".exe", ".zip", ".pif", ".scr", ".ps"]),
        }
    }
}

/// Read-only rules for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    /// Literal substrings of From, To, Cc and Bcc.
    pub block_addresses: Vec<String>,
    /// Literal substrings of Subject.
    pub block_subjects: Vec<String>,
    /// Case-insensitive substrings of a leaf's text body.
    pub block_bodies: Vec<String>,
    /// Headers removed from a message blocked as a whole.
    pub delete_headers: Vec<String>,
    pub placeholder: Placeholder,
    pub bad_content: ContentPolicy,
    pub max_depth: usize,
}

impl Default for RuleSet {
    fn default() -> Self {
        RuleSet {
            block_addresses: Vec::new(),
            block_subjects: Vec::new(),
            block_bodies: Vec::new(),
            delete_headers: Vec::new(),
            placeholder: Placeholder::default(),
            bad_content: ContentPolicy::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
