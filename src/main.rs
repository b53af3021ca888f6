mod display;
mod mailbox;
mod message;
mod sanitizer;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, LevelFilter};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::display::RunSummary;
use crate::mailbox::audit::{AuditSink, FileAudit};
use crate::mailbox::{split_mailbox, MailRecord};
use crate::message::MessageNode;
use crate::sanitizer::Sanitizer;

/// Strips blocked messages and dangerous attachments out of a mailbox.
#[derive(Parser, Debug)]
#[command(name = "mailstrip", version)]
struct Cli {
    /// Mailbox file to sanitize
    mailbox: PathBuf,

    /// YAML rules file
    #[arg(short, long, default_value = "src/resources/mailstrip.yaml")]
    config: PathBuf,

    /// Write the sanitized mailbox here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Append original copies of blocked messages to this mailbox
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Log every rule match
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) -> Result<()> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(if verbose { LevelFilter::Debug } else { LevelFilter::Info })
        .chain(io::stderr())
        .apply()?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = setup_logging(cli.verbose) {
        eprintln!("Cannot set up logging: {}", e);
        return ExitCode::from(1);
    }

    match run(&cli) {
        Ok(summary) => {
            display::log_summary(&summary);
            if summary.failed > 0 {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> Result<RunSummary> {
    let settings = settings::load_settings(&cli.config)?;
    let rules = settings.rule_set();
    let separator = settings.from_line_regex()?;

    let bytes = fs::read(&cli.mailbox)
        .with_context(|| format!("Cannot read mailbox {}", cli.mailbox.display()))?;
    let records = split_mailbox(&bytes, &separator);
    info!("{} message(s) in {}", records.len(), cli.mailbox.display());

    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Cannot create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let audit_path = cli.audit_log.clone().or_else(|| settings.audit_log.clone());
    let mut audit = audit_path.as_deref().map(FileAudit::open).transpose()?;

    let mut sanitizer = Sanitizer::new(&rules);
    if let Some(sink) = audit.as_mut() {
        sanitizer = sanitizer.with_audit(sink as &mut dyn AuditSink);
    }

    let summary = process_mailbox(&records, &mut sanitizer, &mut out)?;
    out.flush().context("Cannot write output")?;
    Ok(summary)
}

/// Sanitizes every record in order. A record that fails is reported and
/// left out; only output write errors stop the run. Records nothing was
/// redacted from are copied through byte for byte.
fn process_mailbox<W: Write + ?Sized>(
    records: &[MailRecord],
    sanitizer: &mut Sanitizer<'_>,
    out: &mut W,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    for record in records {
        summary.messages += 1;
        let before = sanitizer.counts();
        match sanitize_record(record, sanitizer) {
            Ok(sanitized) => {
                if let Some(from_line) = &record.from_line {
                    out.write_all(from_line).context("Cannot write output")?;
                    out.write_all(b"\n").context("Cannot write output")?;
                }
                if sanitizer.counts() == before {
                    out.write_all(&record.raw).context("Cannot write output")?;
                    summary.clean += 1;
                } else {
                    sanitized.write_to(out).context("Cannot write output")?;
                    summary.redacted += 1;
                }
                debug!("Processed {}", record.label());
            }
            Err(e) => {
                error!("Skipping {}: {:#}", record.label(), e);
                summary.failed += 1;
                summary.failed_messages.push(record.label());
            }
        }
    }
    summary.redactions = sanitizer.counts();

    Ok(summary)
}

fn sanitize_record(record: &MailRecord, sanitizer: &mut Sanitizer<'_>) -> Result<MessageNode> {
    let node = message::parse_message(&record.raw, sanitizer.rules().max_depth)?;
    Ok(sanitizer.sanitize_record(record, node)?)
}
