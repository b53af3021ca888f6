pub mod audit;

use regex::bytes::Regex;

/// One message of a mailbox: its separator line (without line ending) and
/// the raw bytes that followed it up to the next separator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MailRecord {
    pub from_line: Option<Vec<u8>>,
    pub raw: Vec<u8>,
}

impl MailRecord {
    /// Short label for log lines.
    pub fn label(&self) -> String {
        match &self.from_line {
            Some(line) => String::from_utf8_lossy(line).into_owned(),
            None => "<no from-line>".to_string(),
        }
    }
}

/// Splits a mailbox into records at every line matching `separator`.
/// Text before the first separator becomes a record of its own unless blank.
pub fn split_mailbox(text: &[u8], separator: &Regex) -> Vec<MailRecord> {
    let mut records = Vec::new();
    let mut current = MailRecord::default();

    for line in text.split_inclusive(|byte| *byte == b'\n') {
        let bare = line.strip_suffix(b"\n").unwrap_or(line);
        let bare = bare.strip_suffix(b"\r").unwrap_or(bare);
        if separator.is_match(bare) {
            push_record(&mut records, current);
            current = MailRecord {
                from_line: Some(bare.to_vec()),
                raw: Vec::new(),
            };
        } else {
            current.raw.extend_from_slice(line);
        }
    }
    push_record(&mut records, current);

    records
}

fn push_record(records: &mut Vec<MailRecord>, record: MailRecord) {
    if record.from_line.is_some() || !record.raw.iter().all(u8::is_ascii_whitespace) {
        records.push(record);
    }
}
