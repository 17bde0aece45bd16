//! Rule-file and ABE feature-file parsers
//!
//! A rule file holds one command per line. Simple commands set run options
//! (`INPUT_FILE`, `COMMIT`, `IGNORE`, ...); every other line is a rule of the
//! form `<condition> <value> <action> [argument]`. Keywords are
//! case-insensitive, lines starting with `#` or `;` are comments.

use std::path::{Path, PathBuf};

use redact_core::{RedactError, Result};
use redact_rules::{Action, Rule, RuleAction};
use tracing::debug;

use crate::RedactConfig;

/// Text printed by `redact config-help`.
pub const CONFIG_HELP: &str = r#"Rule File Help
==============

A rule file gives complete instructions for a redaction run. Command-line
arguments override the settings it contains. One command per line; the order
of simple commands does not matter, the order of rules does: rules are tried
top to bottom for every file.

Simple Commands:
  INPUT_FILE <path>      disk image to redact (never modified)
  OUTPUT_FILE <path>     where the redacted copy is written (required for COMMIT)
  DFXML_FILE <path>      DFXML report describing the image
  REPORT_FILE <path>     write a JSON audit report of the redactions
  IGNORE <glob>          never redact files whose path or name matches (repeatable)
  KEY <key>              reserved for the ENCRYPT action
  COMMIT                 perform the actions; without it the run is a dry run
                         and the report lists the planned actions

Rule Format:
  <condition> <value> <action> [argument]

Conditions:
  FILE_NAME_EQUAL <name>      (FILENAME)  files with this base name
  FILE_NAME_MATCH <pattern>   (FILEPAT)   files whose path matches the pattern
  FILE_DIRNAME_EQUAL <dir>    (DIRNAME)   all files directly inside the directory
  FILE_MD5 <md5>              (MD5)       files with this MD5
  FILE_SHA1 <sha1>            (SHA1)      files with this SHA1
  FILE_SEQ_EQUAL <text>       (CONTAINS)  whole files containing the text
  FILE_SEQ_MATCH <regex>      (MATCH)     whole files containing a match of the regex
  SEQ_EQUAL <text>            (STRING)    only the occurrences of the text
  SEQ_MATCH <regex>                       only the matches of the regex

Actions:
  SCRUB        overwrite the target bytes with zeroes
  FILL 0x44    overwrite the target bytes with 0x44 ('D'); decimal also accepted
  FUZZ         fold bytes of 127 and above, keep lower bytes
  ENCRYPT      reserved, fails when applied

Patterns:
  In FILE_NAME_MATCH, '.' is literal, '*' matches any run and '?' any single
  optional character; other regex syntax is passed through. SEQ_MATCH takes a
  regular expression, e.g. \d{3}-?\d{2}-?\d{4} for social security numbers.
  A careless SEQ_MATCH pattern can match the whole file.

Whole-file conditions stop rule evaluation for that file; SEQ_EQUAL and
SEQ_MATCH let later rules run on the same file.

Example:
  INPUT_FILE disk.raw
  OUTPUT_FILE disk-redacted.raw
  DFXML_FILE disk.xml
  COMMIT
  FILE_MD5 114583cd8355334071e9343a929f6f7c SCRUB
  FILE_SEQ_EQUAL greg@example.com FILL 0x47
  FILE_DIRNAME_EQUAL Windows/Temp FUZZ
  SEQ_EQUAL Kafka FILL 0x4B
  IGNORE *.BACKUP
"#;

/// Parse a rule file from disk.
pub fn parse(path: &Path) -> Result<RedactConfig> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        RedactError::config(format!("cannot read rule file {}: {}", path.display(), e))
    })?;
    parse_str(&source)
}

pub fn parse_str(source: &str) -> Result<RedactConfig> {
    let mut config = RedactConfig::default();

    for (index, raw) in source.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let atoms: Vec<&str> = line.split_whitespace().collect();
        let number = index + 1;
        let keyword = atoms[0].to_ascii_uppercase();

        match keyword.as_str() {
            "COMMIT" => config.commit = true,
            "KEY" => config.key = Some(argument(&atoms, number)?.to_string()),
            "INPUT_FILE" => config.input = Some(PathBuf::from(argument(&atoms, number)?)),
            "OUTPUT_FILE" => config.output = Some(PathBuf::from(argument(&atoms, number)?)),
            "DFXML_FILE" => config.report = Some(PathBuf::from(argument(&atoms, number)?)),
            "REPORT_FILE" => config.audit = Some(PathBuf::from(argument(&atoms, number)?)),
            "IGNORE" => config
                .ignore_patterns
                .push(argument(&atoms, number)?.to_string()),
            _ => config.rules.push(parse_rule(line, &atoms, number)?),
        }
    }

    debug!(
        "Parsed {} rules and {} ignore patterns",
        config.rules.len(),
        config.ignore_patterns.len()
    );
    Ok(config)
}

fn argument<'a>(atoms: &[&'a str], line: usize) -> Result<&'a str> {
    match atoms {
        [_, value] => Ok(*value),
        [keyword] => Err(RedactError::config(format!(
            "line {}: {} needs a value",
            line,
            keyword.to_ascii_uppercase()
        ))),
        [keyword, ..] => Err(RedactError::config(format!(
            "line {}: {} takes a single value without spaces",
            line,
            keyword.to_ascii_uppercase()
        ))),
        [] => Err(RedactError::config(format!("line {}: empty command", line))),
    }
}

fn parse_rule(line: &str, atoms: &[&str], number: usize) -> Result<RuleAction> {
    let at_line = |e: RedactError| match e {
        RedactError::Configuration(msg) => {
            RedactError::config(format!("line {}: {}", number, msg))
        }
        other => other,
    };

    let (condition, value, action_atoms) = match atoms {
        [condition, value, action @ ..] if !action.is_empty() => (*condition, *value, action),
        _ => {
            return Err(RedactError::config(format!(
                "line {}: cannot parse '{}': expected <condition> <value> <action>",
                number, line
            )));
        }
    };

    let rule = match condition.to_ascii_uppercase().as_str() {
        "FILE_MD5" | "MD5" => Rule::md5(line, value),
        "FILE_SHA1" | "SHA1" => Rule::sha1(line, value),
        "FILE_NAME_EQUAL" | "FILENAME" => Rule::name_equal(line, value),
        "FILE_NAME_MATCH" | "FILEPAT" => Rule::name_match(line, value).map_err(at_line)?,
        "FILE_DIRNAME_EQUAL" | "DIRNAME" => Rule::dirname_equal(line, value),
        "FILE_SEQ_EQUAL" | "CONTAINS" => Rule::content_equal(line, value).map_err(at_line)?,
        "FILE_SEQ_MATCH" | "MATCH" => Rule::content_match(line, value).map_err(at_line)?,
        "SEQ_EQUAL" | "STRING" => Rule::sequence_equal(line, value).map_err(at_line)?,
        "SEQ_MATCH" => Rule::sequence_match(line, value).map_err(at_line)?,
        other => {
            return Err(RedactError::config(format!(
                "line {}: unknown command '{}'",
                number, other
            )));
        }
    };

    let action = parse_action(action_atoms).map_err(at_line)?;
    Ok(RuleAction::new(rule, action))
}

fn parse_action(atoms: &[&str]) -> Result<Action> {
    let keyword = atoms.first().map(|a| a.to_ascii_uppercase()).unwrap_or_default();
    match (keyword.as_str(), &atoms[1.min(atoms.len())..]) {
        ("FILL", [value]) => Ok(Action::Fill(parse_fill_byte(value)?)),
        ("FILL", []) => Err(RedactError::config("FILL needs a byte value")),
        ("SCRUB", []) => Ok(Action::Scrub),
        ("FUZZ", []) => Ok(Action::Fuzz),
        ("ENCRYPT", []) => Ok(Action::Encrypt),
        ("FILL" | "SCRUB" | "FUZZ" | "ENCRYPT", extra) => Err(RedactError::config(format!(
            "unexpected text after {}: '{}'",
            keyword,
            extra.join(" ")
        ))),
        _ => Err(RedactError::config(format!("unknown action '{}'", atoms.join(" ")))),
    }
}

/// `0x44`, `0X44` or `68`.
fn parse_fill_byte(value: &str) -> Result<u8> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse::<u8>(),
    };
    parsed.map_err(|_| RedactError::config(format!("FILL value '{}' is not a byte", value)))
}

/// Parse an annotated bulk_extractor feature file from disk.
pub fn parse_abe(path: &Path) -> Result<Vec<RuleAction>> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        RedactError::config(format!("cannot read ABE file {}: {}", path.display(), e))
    })?;
    parse_abe_str(&source)
}

/// Every feature line names a file by MD5 in its fifth tab-separated column;
/// each becomes a rule scrubbing that file.
pub fn parse_abe_str(source: &str) -> Result<Vec<RuleAction>> {
    let mut rules = Vec::new();
    for (index, raw) in source.lines().enumerate() {
        if raw.starts_with('#') || raw.starts_with(';') {
            continue;
        }
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let md5 = line
            .split('\t')
            .nth(4)
            .map(str::trim)
            .filter(|md5| !md5.is_empty())
            .ok_or_else(|| {
                RedactError::config(format!(
                    "ABE line {}: expected an MD5 in the fifth column",
                    index + 1
                ))
            })?;
        rules.push(RuleAction::new(Rule::md5(line, md5), Action::Scrub));
    }
    Ok(rules)
}
