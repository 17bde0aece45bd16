//! Rule predicates and match-extent producers

use std::fmt;

use redact_core::{map_intervals, FileView, HashKind, MappedRuns, RedactError, Result};
use regex::Regex;

use crate::search::{CompiledSearch, SearchPattern, SequenceSearcher};

/// Convert a filename glob into a regex the way rule files expect:
/// `.` is literal, `*` is any run, `?` is an optional character, and every
/// other character passes through so plain regexes keep working.
pub fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    for c in glob.chars() {
        match c {
            '.' => out.push_str("[.]"),
            '*' => out.push_str(".*"),
            '?' => out.push_str(".?"),
            other => out.push(other),
        }
    }
    out
}

#[derive(Debug)]
pub enum RuleKind {
    /// Fingerprint equality, case-insensitive.
    MetadataEqual { hash: HashKind, value: String },
    /// Basename equality.
    NameEqual(String),
    /// Unanchored search of a glob-derived regex over the full path.
    NameMatch(Regex),
    /// Directory equality.
    DirnameEqual(String),
    /// Whole-file trigger on literal containment.
    ContentEqual {
        text: String,
        needle: regex::bytes::Regex,
    },
    /// Whole-file trigger on a regex match.
    ContentMatch(regex::bytes::Regex),
    /// Redacts each occurrence of the literal.
    SequenceEqual(String),
    /// Redacts each match of the pattern.
    SequenceMatch(String),
}

pub struct Rule {
    description: String,
    kind: RuleKind,
    search: Option<Box<dyn CompiledSearch>>,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("description", &self.description)
            .field("kind", &self.kind)
            .field("bound", &self.search.is_some())
            .finish()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl Rule {
    fn with_kind(description: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            description: description.into(),
            kind,
            search: None,
        }
    }

    pub fn metadata_equal(description: impl Into<String>, hash: HashKind, value: &str) -> Self {
        Self::with_kind(
            description,
            RuleKind::MetadataEqual {
                hash,
                value: value.to_ascii_lowercase(),
            },
        )
    }

    pub fn md5(description: impl Into<String>, value: &str) -> Self {
        Self::metadata_equal(description, HashKind::Md5, value)
    }

    pub fn sha1(description: impl Into<String>, value: &str) -> Self {
        Self::metadata_equal(description, HashKind::Sha1, value)
    }

    pub fn name_equal(description: impl Into<String>, name: &str) -> Self {
        Self::with_kind(description, RuleKind::NameEqual(name.to_string()))
    }

    pub fn name_match(description: impl Into<String>, glob: &str) -> Result<Self> {
        let source = glob_to_regex(glob);
        let regex = Regex::new(&source).map_err(|e| {
            RedactError::config(format!("invalid filename pattern '{}': {}", glob, e))
        })?;
        Ok(Self::with_kind(description, RuleKind::NameMatch(regex)))
    }

    pub fn dirname_equal(description: impl Into<String>, dirname: &str) -> Self {
        Self::with_kind(description, RuleKind::DirnameEqual(dirname.to_string()))
    }

    pub fn content_equal(description: impl Into<String>, text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(RedactError::config("content text must not be empty"));
        }
        let needle = regex::bytes::Regex::new(&regex::escape(text))
            .map_err(|e| RedactError::config(format!("cannot search for '{}': {}", text, e)))?;
        Ok(Self::with_kind(
            description,
            RuleKind::ContentEqual {
                text: text.to_string(),
                needle,
            },
        ))
    }

    pub fn content_match(description: impl Into<String>, pattern: &str) -> Result<Self> {
        let regex = byte_regex(pattern)?;
        Ok(Self::with_kind(description, RuleKind::ContentMatch(regex)))
    }

    pub fn sequence_equal(description: impl Into<String>, text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(RedactError::config("sequence text must not be empty"));
        }
        Ok(Self::with_kind(
            description,
            RuleKind::SequenceEqual(text.to_string()),
        ))
    }

    pub fn sequence_match(description: impl Into<String>, pattern: &str) -> Result<Self> {
        byte_regex(pattern)?;
        Ok(Self::with_kind(
            description,
            RuleKind::SequenceMatch(pattern.to_string()),
        ))
    }

    /// The rule-file line this rule came from.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    /// Whole-file rules dispose of the file; sequence rules let later rules run.
    pub fn is_complete(&self) -> bool {
        !matches!(
            self.kind,
            RuleKind::SequenceEqual(_) | RuleKind::SequenceMatch(_)
        )
    }

    pub fn required_hash(&self) -> Option<HashKind> {
        match &self.kind {
            RuleKind::MetadataEqual { hash, .. } => Some(*hash),
            _ => None,
        }
    }

    pub fn needs_searcher(&self) -> bool {
        !self.is_complete()
    }

    pub fn is_bound(&self) -> bool {
        self.search.is_some() || !self.needs_searcher()
    }

    /// Compile this rule's pattern with `searcher`. No-op for rules that do not search.
    pub fn bind_searcher(&mut self, searcher: &dyn SequenceSearcher) -> Result<()> {
        let pattern = match &self.kind {
            RuleKind::SequenceEqual(text) => SearchPattern::Literal(text.clone()),
            RuleKind::SequenceMatch(source) => SearchPattern::Regex(source.clone()),
            _ => return Ok(()),
        };
        self.search = Some(searcher.compile(&[pattern])?);
        Ok(())
    }

    pub fn should_redact(&self, file: &FileView<'_>) -> Result<bool> {
        let entry = file.entry();
        let hit = match &self.kind {
            RuleKind::MetadataEqual { hash, value } => entry
                .fingerprint(*hash)
                .is_some_and(|v| v.eq_ignore_ascii_case(value)),
            RuleKind::NameEqual(name) => entry.basename() == name,
            RuleKind::NameMatch(regex) => regex.is_match(&entry.path),
            RuleKind::DirnameEqual(dirname) => entry.dirname() == dirname,
            RuleKind::ContentEqual { needle, .. } => needle.is_match(file.content()?),
            RuleKind::ContentMatch(regex) => regex.is_match(file.content()?),
            RuleKind::SequenceEqual(_) | RuleKind::SequenceMatch(_) => {
                !self.sequence_spans(file)?.is_empty()
            }
        };
        Ok(hit)
    }

    /// Image runs to rewrite: the whole run list for complete rules, the
    /// mapped occurrences for sequence rules.
    pub fn runs_to_redact(&self, file: &FileView<'_>) -> Result<MappedRuns> {
        if self.is_complete() {
            return Ok(MappedRuns {
                runs: file.entry().runs.clone(),
                unmapped: Vec::new(),
            });
        }
        let spans = self.sequence_spans(file)?;
        Ok(map_intervals(&file.entry().runs, &spans))
    }

    /// `should_redact` and `runs_to_redact` in one pass; `None` when the rule does not fire.
    pub fn evaluate(&self, file: &FileView<'_>) -> Result<Option<MappedRuns>> {
        if self.is_complete() {
            return Ok(if self.should_redact(file)? {
                Some(self.runs_to_redact(file)?)
            } else {
                None
            });
        }
        let spans = self.sequence_spans(file)?;
        if spans.is_empty() {
            return Ok(None);
        }
        Ok(Some(map_intervals(&file.entry().runs, &spans)))
    }

    /// Occurrence spans in file offsets, ordered, with overlapping spans merged.
    fn sequence_spans(&self, file: &FileView<'_>) -> Result<Vec<(u64, u64)>> {
        let search = self.search.as_ref().ok_or_else(|| {
            RedactError::Capability(format!(
                "rule '{}' needs a sequence searcher and none is bound",
                self.description
            ))
        })?;

        let mut spans: Vec<(u64, u64)> = search
            .search(file.content()?)
            .into_iter()
            .map(|hit| (hit.start, hit.end))
            .collect();
        spans.sort_unstable();

        let mut merged: Vec<(u64, u64)> = Vec::with_capacity(spans.len());
        for (start, end) in spans {
            match merged.last_mut() {
                Some(last) if start < last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        Ok(merged)
    }
}

/// Byte regex with ASCII classes, as used for binary content.
pub(crate) fn byte_regex(pattern: &str) -> Result<regex::bytes::Regex> {
    regex::bytes::RegexBuilder::new(pattern)
        .unicode(false)
        .build()
        .map_err(|e| RedactError::config(format!("invalid pattern '{}': {}", pattern, e)))
}
