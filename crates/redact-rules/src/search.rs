//! Sequence search capability
//!
//! Sequence rules delegate matching to a [`SequenceSearcher`]. The searcher is
//! optional: rule sets without sequence rules run without one, and a missing
//! searcher is reported before the walk rather than matching nothing.

use std::fmt;
use std::sync::Arc;

use redact_core::Result;
use serde::Serialize;

/// Text encoding a hit was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    Ascii,
    Utf8,
    Utf16Le,
    Latin1,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Encoding::Ascii => "ascii",
            Encoding::Utf8 => "utf-8",
            Encoding::Utf16Le => "utf-16le",
            Encoding::Latin1 => "latin-1",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchPattern {
    /// Exact text, searched in every supported encoding.
    Literal(String),
    /// Byte-oriented regular expression.
    Regex(String),
}

/// One occurrence, as a `[start, end)` span of file offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SearchHit {
    pub start: u64,
    pub end: u64,
    /// Index into the pattern slice given to [`SequenceSearcher::compile`].
    pub pattern_id: usize,
    pub encoding: Encoding,
}

pub trait SequenceSearcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compile a pattern set once; the result is reused for every file.
    fn compile(&self, patterns: &[SearchPattern]) -> Result<Box<dyn CompiledSearch>>;
}

pub trait CompiledSearch: Send + Sync {
    /// All occurrences in `content`, ordered by start offset.
    fn search(&self, content: &[u8]) -> Vec<SearchHit>;
}

/// The searcher compiled into this build, if any.
pub fn default_searcher() -> Option<Arc<dyn SequenceSearcher>> {
    #[cfg(feature = "native-search")]
    {
        Some(Arc::new(crate::NativeSearcher))
    }
    #[cfg(not(feature = "native-search"))]
    {
        None
    }
}
