use std::path::PathBuf;

use redact_rules::RuleAction;

use crate::Settings;

/// Everything one redaction run needs.
///
/// Usually produced by [`crate::parse`], then adjusted by the front end
/// (command-line overrides, ABE rules, settings) before the engine validates it.
#[derive(Debug, Default)]
pub struct RedactConfig {
    /// Source disk image. Never written.
    pub input: Option<PathBuf>,
    /// Working copy that receives the redactions. Required when committing.
    pub output: Option<PathBuf>,
    /// DFXML report describing the image.
    pub report: Option<PathBuf>,
    /// Where the JSON audit document goes.
    pub audit: Option<PathBuf>,
    pub commit: bool,
    pub ignore_patterns: Vec<String>,
    /// Evaluated in order for every file.
    pub rules: Vec<RuleAction>,
    /// Reserved for the ENCRYPT action.
    pub key: Option<String>,
}

impl RedactConfig {
    /// Append the settings' ignore patterns that the rule file does not already list.
    pub fn merge_settings(&mut self, settings: &Settings) {
        for pattern in &settings.ignore.patterns {
            if !self.ignore_patterns.contains(pattern) {
                self.ignore_patterns.push(pattern.clone());
            }
        }
    }

    pub fn needs_searcher(&self) -> bool {
        self.rules.iter().any(|ra| ra.rule.needs_searcher())
    }
}
