//! The redaction run
//!
//! A [`Redactor`] is created from a configuration (validated, searcher bound,
//! files opened), then [`Redactor::execute`] copies the image, walks it and
//! writes the audit. Nothing touches an image before `execute`.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use redact_config::{RedactConfig, Settings, UnderRedactionPolicy};
use redact_core::{FileEntry, FileView, ImageHandle, RedactError, Result};
use redact_rules::{default_searcher, SequenceSearcher};
use redact_sources::{DfxmlWalker, FileWalker, HashPlan, IgnoreFilter, WalkOptions};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditConfiguration, AuditRule, AuditRuntime, AuditSink, RedactionRecord};

const COPY_CHUNK: usize = 1 << 20;

/// What a finished run reports back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub redacted_count: u64,
    pub elapsed_seconds: f64,
    pub files_seen: u64,
    pub files_skipped: u64,
    pub skipped_runs: u64,
    pub unmapped_intervals: u64,
    pub redactions: Vec<RedactionRecord>,
}

#[derive(Debug, Default)]
struct RunState {
    redacted_count: u64,
    files_seen: u64,
    files_skipped: u64,
    skipped_runs: u64,
    unmapped_intervals: u64,
    input_blake3: Option<String>,
}

#[derive(Debug)]
pub struct Redactor {
    config: RedactConfig,
    input_path: PathBuf,
    ignore: IgnoreFilter,
    settings: Settings,
    input: File,
    output: Option<File>,
    audit: AuditSink,
}

impl Redactor {
    /// Validate `config` and open every file the run needs.
    ///
    /// Configuration and capability problems are reported here, before any
    /// image byte is read or written.
    pub fn new(
        mut config: RedactConfig,
        settings: &Settings,
        searcher: Option<Arc<dyn SequenceSearcher>>,
    ) -> Result<Self> {
        let input_path = check_paths(&config)?;

        config.merge_settings(settings);
        let ignore = IgnoreFilter::new(&config.ignore_patterns)?;

        if let Some(searcher) = check_capability(&config, searcher)? {
            debug!("Binding sequence rules to the {} searcher", searcher.name());
            for pair in &mut config.rules {
                pair.rule.bind_searcher(searcher.as_ref())?;
            }
        }

        check_report(&config)?;
        let input = open_input(&input_path)?;

        let audit = AuditSink::create(config.audit.as_deref())?;

        let output = match &config.output {
            Some(path) => Some(
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(path)
                    .map_err(|e| {
                        RedactError::config(format!(
                            "cannot write output image {}: {}",
                            path.display(),
                            e
                        ))
                    })?,
            ),
            None => None,
        };

        if config.commit {
            warn!("COMMIT is set, redactions will be written");
        } else {
            warn!("Dry run only, no image will be modified");
        }

        Ok(Self {
            config,
            input_path,
            ignore,
            settings: settings.clone(),
            input,
            output,
            audit,
        })
    }

    pub fn config(&self) -> &RedactConfig {
        &self.config
    }

    pub fn hash_plan(&self) -> HashPlan {
        hash_plan(&self.config)
    }

    /// Copy the image, walk it and write the audit.
    ///
    /// The audit is written even when the walk fails; the walk's error is
    /// what gets returned in that case.
    pub fn execute(mut self, walker: &mut dyn FileWalker) -> Result<RunSummary> {
        let started = Instant::now();
        let started_at = OffsetDateTime::now_utc();
        let mut state = RunState::default();

        if self.config.commit {
            warn!("Performing redactions..");
        } else {
            warn!("Performing dry run..");
        }

        let outcome = self
            .prepare(&mut state)
            .and_then(|image| {
                self.walk(&image, walker, &mut state)?;
                Ok(image)
            })
            .map(|image| self.close(image));

        self.finalize(outcome, state, started, started_at)
    }

    /// Duplicate the input into the output and open the image to walk.
    fn prepare(&mut self, state: &mut RunState) -> Result<ImageHandle> {
        let input = self.input.try_clone().map_err(|e| RedactError::image(&self.input_path, e))?;

        let Some(mut output) = self.output.take() else {
            info!("No output image, walking {} read-only", self.input_path.display());
            return ImageHandle::from_file(&self.input_path, input, false);
        };
        let output_path = self.config.output.clone().unwrap_or_default();

        let digest = copy_image(input, &self.input_path, &mut output, &output_path)?;
        info!(
            "Copied {} to {} (blake3 {})",
            self.input_path.display(),
            output_path.display(),
            digest
        );
        state.input_blake3 = Some(digest);

        ImageHandle::from_file(&output_path, output, true)
    }

    fn walk(
        &mut self,
        image: &ImageHandle,
        walker: &mut dyn FileWalker,
        state: &mut RunState,
    ) -> Result<()> {
        let options = WalkOptions {
            image: image.path().to_path_buf(),
            report: self.config.report.clone(),
            hashes: self.hash_plan(),
        };

        let Self {
            config,
            ignore,
            settings,
            audit,
            ..
        } = self;
        let evaluator = Evaluator {
            config,
            ignore,
            mmap_threshold: settings.mmap_threshold,
            image,
        };
        walker.walk(&options, &mut |entry| evaluator.process_file(&entry, state, audit))
    }

    /// Flush the written image. Failures here are logged, never raised.
    fn close(&self, image: ImageHandle) -> Option<String> {
        if self.config.commit {
            if let Err(e) = image.sync() {
                error!("Failed to sync {}: {}", image.path().display(), e);
            }
        }
        if !self.settings.verify_output_digest || !image.is_writable() {
            return None;
        }
        match hash_file(image.path()) {
            Ok(digest) => Some(digest),
            Err(e) => {
                error!("Failed to hash {}: {}", image.path().display(), e);
                None
            }
        }
    }

    fn finalize(
        self,
        outcome: Result<Option<String>>,
        state: RunState,
        started: Instant,
        started_at: OffsetDateTime,
    ) -> Result<RunSummary> {
        let elapsed = started.elapsed().as_secs_f64();

        let under_redacted = state.unmapped_intervals + state.skipped_runs;
        let outcome = match outcome {
            Ok(_) if under_redacted > 0 => {
                let message = format!(
                    "{} match pieces outside any byte run and {} skipped runs were left untouched",
                    state.unmapped_intervals, state.skipped_runs
                );
                match self.settings.under_redaction {
                    UnderRedactionPolicy::Fail => Err(RedactError::UnderRedaction(message)),
                    UnderRedactionPolicy::Warn => {
                        warn!("{}", message);
                        outcome
                    }
                }
            }
            other => other,
        };

        let (output_blake3, error) = match &outcome {
            Ok(digest) => (digest.clone(), None),
            Err(e) => (None, Some(e.to_string())),
        };

        let configuration = AuditConfiguration {
            run_id: Uuid::new_v4(),
            started_at,
            input: self.input_path.clone(),
            output: self.config.output.clone(),
            report: self.config.report.clone(),
            commit: self.config.commit,
            ignore_patterns: self.config.ignore_patterns.clone(),
            rules: self
                .config
                .rules
                .iter()
                .map(|pair| AuditRule {
                    rule: pair.rule.description().to_string(),
                    action: pair.action.to_string(),
                })
                .collect(),
            input_blake3: state.input_blake3.clone(),
        };
        let runtime = AuditRuntime {
            seconds: elapsed,
            redacted_count: state.redacted_count,
            files_seen: state.files_seen,
            files_skipped: state.files_skipped,
            skipped_runs: state.skipped_runs,
            unmapped_intervals: state.unmapped_intervals,
            completed: outcome.is_ok(),
            error,
            output_blake3,
        };

        let audit_path = self.audit.path().map(Path::to_path_buf);
        let report = match self.audit.finish(configuration, runtime) {
            Ok(report) => report,
            Err(e) => {
                let path = audit_path.unwrap_or_default();
                error!("Failed to write audit report {}: {}", path.display(), e);
                // A failed walk is the more useful error to surface.
                outcome?;
                return Err(e);
            }
        };
        outcome?;

        info!(
            "Redacted {} targets in {} files ({:.1}s)",
            state.redacted_count, state.files_seen, elapsed
        );
        Ok(RunSummary {
            redacted_count: state.redacted_count,
            elapsed_seconds: elapsed,
            files_seen: state.files_seen,
            files_skipped: state.files_skipped,
            skipped_runs: state.skipped_runs,
            unmapped_intervals: state.unmapped_intervals,
            redactions: report.redactions,
        })
    }
}

/// The parts of a [`Redactor`] the per-file loop reads.
struct Evaluator<'a> {
    config: &'a RedactConfig,
    ignore: &'a IgnoreFilter,
    mmap_threshold: u64,
    image: &'a ImageHandle,
}

impl Evaluator<'_> {
    fn process_file(
        &self,
        entry: &FileEntry,
        state: &mut RunState,
        audit: &mut AuditSink,
    ) -> Result<()> {
        state.files_seen += 1;

        if entry.is_directory {
            info!("Skipping directory {}", entry.path);
            state.files_skipped += 1;
            return Ok(());
        }
        if entry.is_system_metadata {
            info!("Skipping system file {}", entry.path);
            state.files_skipped += 1;
            return Ok(());
        }
        if let Some(pattern) = self.ignore.matching_pattern(&entry.path) {
            info!("Ignoring {} (matches {})", entry.path, pattern);
            state.files_skipped += 1;
            return Ok(());
        }

        // Rules are evaluated against the file as it was before any action ran.
        let view = FileView::new(entry, self.image, self.mmap_threshold);
        let mut matched = Vec::new();
        for pair in &self.config.rules {
            let Some(mapped) = pair.rule.evaluate(&view)? else {
                continue;
            };
            if !mapped.unmapped.is_empty() {
                warn!(
                    "{}: {} match pieces lie outside the file's byte runs and were not redacted",
                    entry.path,
                    mapped.unmapped.len()
                );
                state.unmapped_intervals += mapped.unmapped.len() as u64;
            }
            matched.push((pair, mapped.runs));
            if pair.rule.is_complete() {
                break;
            }
        }

        for (pair, runs) in matched {
            info!("Redacting {}", entry.path);
            info!("  Reason: {}", pair.rule);
            info!("  Action: {}", pair.action);
            let outcome = pair.action.apply(&runs, self.image, self.config.commit)?;
            state.skipped_runs += outcome.skipped.len() as u64;
            state.redacted_count += 1;
            audit.record(RedactionRecord {
                filename: entry.path.clone(),
                reason: pair.rule.description().to_string(),
                action: pair.action.to_string(),
                runs: outcome.runs,
            });
        }
        Ok(())
    }
}

/// Fingerprints the walker has to supply for the metadata rules.
pub fn hash_plan(config: &RedactConfig) -> HashPlan {
    let mut plan = HashPlan::default();
    for pair in &config.rules {
        if let Some(kind) = pair.rule.required_hash() {
            plan.require(kind);
        }
    }
    plan
}

/// Validate `config`, walk its DFXML report with the built-in searcher, and
/// return the summary.
pub fn run(config: RedactConfig, settings: &Settings) -> Result<RunSummary> {
    require_report(&config)?;
    let redactor = Redactor::new(config, settings, default_searcher())?;
    redactor.execute(&mut DfxmlWalker::new())
}

/// Every check [`run`] makes before touching an image, without creating,
/// truncating or writing any file.
pub fn validate(
    config: &RedactConfig,
    settings: &Settings,
    searcher: Option<Arc<dyn SequenceSearcher>>,
) -> Result<()> {
    require_report(config)?;
    let input_path = check_paths(config)?;

    let mut patterns = config.ignore_patterns.clone();
    patterns.extend(settings.ignore.patterns.iter().cloned());
    IgnoreFilter::new(&patterns)?;

    check_capability(config, searcher)?;
    check_report(config)?;
    open_input(&input_path)?;
    Ok(())
}

fn require_report(config: &RedactConfig) -> Result<()> {
    if config.report.is_none() {
        return Err(RedactError::config(
            "a DFXML report is required (DFXML_FILE or --dfxml)",
        ));
    }
    Ok(())
}

/// Input present, output present when committing, output distinct from input.
fn check_paths(config: &RedactConfig) -> Result<PathBuf> {
    let input_path = config
        .input
        .clone()
        .ok_or_else(|| RedactError::config("no input image given (INPUT_FILE or --input)"))?;
    if config.commit && config.output.is_none() {
        return Err(RedactError::config(
            "COMMIT requires an output image (OUTPUT_FILE or --output)",
        ));
    }
    if let Some(output) = &config.output {
        if same_file(&input_path, output) {
            return Err(RedactError::config(format!(
                "output image {} is the input image",
                output.display()
            )));
        }
    }
    Ok(input_path)
}

/// Whether `a` and `b` name the same file. An output that does not exist yet
/// is never the input.
fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn check_capability(
    config: &RedactConfig,
    searcher: Option<Arc<dyn SequenceSearcher>>,
) -> Result<Option<Arc<dyn SequenceSearcher>>> {
    if !config.needs_searcher() {
        return Ok(None);
    }
    searcher.map(Some).ok_or_else(|| {
        RedactError::Capability(
            "SEQ_EQUAL and SEQ_MATCH rules need a sequence searcher and this build has none"
                .to_string(),
        )
    })
}

fn check_report(config: &RedactConfig) -> Result<()> {
    if let Some(report) = &config.report {
        File::open(report).map_err(|e| {
            RedactError::config(format!("cannot read DFXML {}: {}", report.display(), e))
        })?;
    }
    Ok(())
}

fn open_input(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        RedactError::config(format!("cannot read input image {}: {}", path.display(), e))
    })
}

/// Copy `input` over `output` from the start, returning the BLAKE3 of the bytes copied.
fn copy_image(mut input: File, input_path: &Path, output: &mut File, output_path: &Path) -> Result<String> {
    let out_err = |e: io::Error| RedactError::image(output_path, e);
    let in_err = |e: io::Error| RedactError::image(input_path, e);

    input.seek(SeekFrom::Start(0)).map_err(in_err)?;
    output.set_len(0).map_err(out_err)?;
    output.seek(SeekFrom::Start(0)).map_err(out_err)?;

    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; COPY_CHUNK];
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(in_err(e)),
        };
        hasher.update(&buf[..n]);
        output.write_all(&buf[..n]).map_err(out_err)?;
    }
    output.flush().map_err(out_err)?;
    Ok(hasher.finalize().to_hex().to_string())
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}
