//! Redaction orchestration
//!
//! [`Redactor`] validates a [`redact_config::RedactConfig`], copies the source
//! image, drives a [`redact_sources::FileWalker`] over the copy and applies the
//! first matching rules to every file. Every run ends with an [`AuditReport`].

pub mod audit;
pub mod redactor;

pub use audit::{AuditConfiguration, AuditReport, AuditRule, AuditRuntime, AuditSink, RedactionRecord};
pub use redactor::{hash_plan, run, validate, Redactor, RunSummary};
