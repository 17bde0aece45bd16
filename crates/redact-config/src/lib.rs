//! Run configuration for redaction
//!
//! - [`RedactConfig`]: the per-run configuration, usually read from a rule file
//! - [`rulefile`]: the line-oriented rule-file and ABE feature-file parsers
//! - [`Settings`]: user settings stored as TOML

pub mod config;
pub mod rulefile;
pub mod settings;

pub use config::RedactConfig;
pub use rulefile::{parse, parse_abe, parse_abe_str, parse_str, CONFIG_HELP};
pub use settings::{IgnoreSettings, Settings, UnderRedactionPolicy};
