//! Audit trail of a redaction run

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use redact_core::{ByteRun, RedactError, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

/// The JSON document written at the end of every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub configuration: AuditConfiguration,
    pub redactions: Vec<RedactionRecord>,
    pub runtime: AuditRuntime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfiguration {
    pub run_id: Uuid,
    #[serde(with = "time::serde::timestamp")]
    pub started_at: OffsetDateTime,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub commit: bool,
    pub ignore_patterns: Vec<String>,
    pub rules: Vec<AuditRule>,
    /// BLAKE3 of the source image, taken while copying it.
    pub input_blake3: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRule {
    pub rule: String,
    pub action: String,
}

/// One applied (or, in a dry run, planned) action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionRecord {
    pub filename: String,
    pub reason: String,
    pub action: String,
    pub runs: Vec<ByteRun>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditRuntime {
    pub seconds: f64,
    pub redacted_count: u64,
    pub files_seen: u64,
    pub files_skipped: u64,
    /// Runs an action could not process.
    pub skipped_runs: u64,
    /// Match pieces outside every run of their file.
    pub unmapped_intervals: u64,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_blake3: Option<String>,
}

/// Destination of the audit document.
///
/// The file is created when the sink is, so an unwritable audit path fails
/// validation instead of the end of a long run. Records are buffered and the
/// document is serialized once by [`AuditSink::finish`].
#[derive(Debug, Default)]
pub struct AuditSink {
    target: Option<(PathBuf, File)>,
    records: Vec<RedactionRecord>,
}

impl AuditSink {
    pub fn create(path: Option<&Path>) -> Result<Self> {
        let target = match path {
            Some(path) => {
                let file = File::create(path).map_err(|e| {
                    RedactError::config(format!(
                        "cannot write audit report {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Some((path.to_path_buf(), file))
            }
            None => None,
        };
        Ok(Self {
            target,
            records: Vec::new(),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.target.as_ref().map(|(path, _)| path.as_path())
    }

    pub fn record(&mut self, record: RedactionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[RedactionRecord] {
        &self.records
    }

    /// Assemble the report and write it if the sink has a file.
    pub fn finish(self, configuration: AuditConfiguration, runtime: AuditRuntime) -> Result<AuditReport> {
        let report = AuditReport {
            configuration,
            redactions: self.records,
            runtime,
        };

        if let Some((path, file)) = self.target {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &report)?;
            writer
                .write_all(b"\n")
                .and_then(|_| writer.flush())
                .map_err(|e| RedactError::image(&path, e))?;
            debug!("Audit report written to {}", path.display());
        }
        Ok(report)
    }
}
