use glob::Pattern;
use redact_core::{RedactError, Result};

/// Filename globs whose files are never redacted.
#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    patterns: Vec<Pattern>,
}

impl IgnoreFilter {
    /// Compile all patterns; any invalid pattern is a configuration error.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(|p| {
                Pattern::new(p.as_ref()).map_err(|e| {
                    RedactError::config(format!("invalid IGNORE pattern '{}': {}", p.as_ref(), e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns: compiled })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// A path is ignored when any pattern matches the full path or its basename.
    pub fn is_ignored(&self, path: &str) -> bool {
        self.matching_pattern(path).is_some()
    }

    /// First matching pattern (for log messages)
    pub fn matching_pattern(&self, path: &str) -> Option<&str> {
        let basename = path.rsplit('/').next().unwrap_or(path);
        self.patterns
            .iter()
            .find(|p| p.matches(path) || p.matches(basename))
            .map(Pattern::as_str)
    }
}
