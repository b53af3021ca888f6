use log::{error, info, warn};
use serde::Serialize;

use crate::sanitizer::RedactionCounts;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub messages: usize,
    pub clean: usize,
    pub redacted: usize,
    pub failed: usize,
    pub redactions: RedactionCounts,
    pub failed_messages: Vec<String>,
}

pub fn log_summary(summary: &RunSummary) {
    match serde_json::to_string_pretty(summary) {
        Ok(json) => info!("{}", json),
        Err(e) => error!("Error converting to JSON: {}", e),
    }
    if summary.failed > 0 {
        warn!("{} message(s) were left out of the output", summary.failed);
    }
}
