use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Receives blocked messages, in processing order, before they are redacted.
pub trait AuditSink {
    fn record(&mut self, from_line: Option<&[u8]>, original: &[u8]) -> io::Result<()>;
}

/// Appends blocked messages to a file in mailbox format.
pub struct FileAudit {
    writer: BufWriter<File>,
}

impl FileAudit {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Cannot open audit log {}", path.display()))?;
        Ok(FileAudit {
            writer: BufWriter::new(file),
        })
    }
}

impl AuditSink for FileAudit {
    fn record(&mut self, from_line: Option<&[u8]>, original: &[u8]) -> io::Result<()> {
        write_entry(&mut self.writer, from_line, original)?;
        self.writer.flush()
    }
}

fn write_entry<W: Write>(out: &mut W, from_line: Option<&[u8]>, original: &[u8]) -> io::Result<()> {
    if let Some(line) = from_line {
        out.write_all(line)?;
        out.write_all(b"\n")?;
    }
    out.write_all(original)?;
    if !original.ends_with(b"\n") {
        out.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub from_line: Option<Vec<u8>>,
    pub original: Vec<u8>,
}

#[cfg(test)]
impl AuditSink for Vec<AuditEntry> {
    fn record(&mut self, from_line: Option<&[u8]>, original: &[u8]) -> io::Result<()> {
        self.push(AuditEntry {
            from_line: from_line.map(<[u8]>::to_vec),
            original: original.to_vec(),
        });
        Ok(())
    }
}
