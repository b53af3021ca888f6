use anyhow::{bail, Context, Result};
use serde::Deserialize;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use backtrace::Backtrace;
use log::error;
use regex::bytes::Regex;

use crate::sanitizer::rules::{
    ContentPolicy, Placeholder, RuleSet, DEFAULT_MAX_DEPTH, DEFAULT_STRIP_CLUE,
};

pub const DEFAULT_FROM_LINE_PATTERN: &str = r"^From \S+";

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Settings {
    pub block_email: Vec<AddressRule>,
    pub block_subject: Vec<TextRule>,
    pub block_body: Vec<TextRule>,
    pub delete_header: Vec<HeaderRule>,
    pub stealth_mode: StealthMode,
    pub strip_clue: StripClue,
    pub from_line_pattern: String,
    pub max_depth: usize,
    pub audit_log: Option<PathBuf>,
    pub bad_content: Option<BadContentSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            block_email: Vec::new(),
            block_subject: Vec::new(),
            block_body: Vec::new(),
            delete_header: Vec::new(),
            stealth_mode: StealthMode::default(),
            strip_clue: StripClue::default(),
            from_line_pattern: DEFAULT_FROM_LINE_PATTERN.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            audit_log: None,
            bad_content: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AddressRule {
    pub address: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TextRule {
    pub text: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HeaderRule {
    pub header: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StealthMode {
    pub leave_clues: bool,
}

impl Default for StealthMode {
    fn default() -> Self {
        StealthMode { leave_clues: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StripClue {
    pub text: String,
}

impl Default for StripClue {
    fn default() -> Self {
        StripClue {
            text: DEFAULT_STRIP_CLUE.to_string(),
        }
    }
}

// Missing lists fall back to the built-in policy list by list.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BadContentSettings {
    pub content_types: Option<Vec<String>>,
    pub encodings: Option<Vec<String>>,
    pub extensions: Option<Vec<String>>,
}

impl Settings {
    /// Rejects values that would silently change what gets blocked.
    pub fn validate(&self) -> Result<()> {
        let rule_texts = self
            .block_email
            .iter()
            .map(|rule| ("blockEmail.address", &rule.address))
            .chain(self.block_subject.iter().map(|rule| ("blockSubject.text", &rule.text)))
            .chain(self.block_body.iter().map(|rule| ("blockBody.text", &rule.text)))
            .chain(self.delete_header.iter().map(|rule| ("deleteHeader.header", &rule.header)));
        for (field, text) in rule_texts {
            if text.is_empty() {
                bail!("{} must not be empty", field);
            }
        }
        if self.max_depth == 0 {
            bail!("maxDepth must be at least 1");
        }
        if let Some(bad_content) = &self.bad_content {
            let lists = [
                ("badContent.contentTypes", &bad_content.content_types),
                ("badContent.encodings", &bad_content.encodings),
                ("badContent.extensions", &bad_content.extensions),
            ];
            for (field, list) in lists {
                if list.iter().flatten().any(|entry| entry.is_empty()) {
                    bail!("{} entries must not be empty", field);
                }
            }
        }
        self.from_line_regex()?;
        Ok(())
    }

    pub fn from_line_regex(&self) -> Result<Regex> {
        Regex::new(&self.from_line_pattern)
            .with_context(|| format!("Invalid fromLinePattern {:?}", self.from_line_pattern))
    }

    pub fn rule_set(&self) -> RuleSet {
        let placeholder = if self.stealth_mode.leave_clues {
            Placeholder::Notice {
                clue: self.strip_clue.text.clone(),
            }
        } else {
            Placeholder::Stealth
        };

        let mut bad_content = ContentPolicy::default();
        if let Some(overrides) = &self.bad_content {
            if let Some(content_types) = &overrides.content_types {
                bad_content.content_types = content_types.clone();
            }
            if let Some(encodings) = &overrides.encodings {
                bad_content.encodings = encodings.clone();
            }
            if let Some(extensions) = &overrides.extensions {
                bad_content.extensions = extensions.clone();
            }
        }

        RuleSet {
            block_addresses: self.block_email.iter().map(|rule| rule.address.clone()).collect(),
            block_subjects: self.block_subject.iter().map(|rule| rule.text.clone()).collect(),
            block_bodies: self.block_body.iter().map(|rule| rule.text.clone()).collect(),
            delete_headers: self.delete_header.iter().map(|rule| rule.header.clone()).collect(),
            placeholder,
            bad_content,
            max_depth: self.max_depth,
        }
    }
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            error!("Error: {}", err);

            // Capture and print the backtrace
            let backtrace = Backtrace::new();
            error!("Backtrace:\n{:?}", backtrace);
            return Err(err).with_context(|| format!("Cannot find settings {}", path.display()));
        }
    };

    let reader = BufReader::new(file);

    // Parse the YAML file into the Settings struct
    let settings: Settings = match serde_yaml::from_reader(reader) {
        Ok(settings) => settings,
        Err(err) => {
            error!("Error: {}", err);

            let backtrace = Backtrace::new();
            error!("Backtrace:\n{:?}", backtrace);
            return Err(err).with_context(|| format!("Cannot deserialize settings {}", path.display()));
        }
    };

    settings
        .validate()
        .with_context(|| format!("Invalid settings {}", path.display()))?;
    Ok(settings)
}
