pub mod run;
pub mod validate;

use anyhow::{Context, Result};
use redact_config::{RedactConfig, Settings};

use crate::cli::RunArgs;

/// Read the rule file and apply the command-line overrides.
pub fn load(args: &RunArgs) -> Result<(RedactConfig, Settings)> {
    let mut config = redact_config::parse(&args.config)?;

    if let Some(input) = &args.input {
        config.input = Some(input.clone());
    }
    if let Some(output) = &args.output {
        config.output = Some(output.clone());
    }
    if let Some(dfxml) = &args.dfxml {
        config.report = Some(dfxml.clone());
    }
    if let Some(report) = &args.report {
        config.audit = Some(report.clone());
    }
    if args.dry_run {
        config.commit = false;
    }
    if let Some(abe) = &args.abe_config {
        let rules = redact_config::parse_abe(abe)?;
        tracing::debug!("Adding {} rules from {}", rules.len(), abe.display());
        config.rules.extend(rules);
    }

    let settings = match &args.settings {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load().context("Failed to load user settings")?,
    };

    tracing::debug!("Combined config and arguments: {:?}", config);
    Ok((config, settings))
}
