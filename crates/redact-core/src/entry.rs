use serde::{Deserialize, Serialize};

use crate::ByteRun;

/// Content fingerprints a walker can be asked to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashKind {
    Md5,
    Sha1,
}

impl HashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashKind::Md5 => "md5",
            HashKind::Sha1 => "sha1",
        }
    }
}

/// One file or directory node from a forensic walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// '/'-separated path as the walker reports it.
    pub path: String,
    pub size: u64,
    pub is_directory: bool,
    /// Reserved filesystem entries such as `$MFT` or journals.
    pub is_system_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    /// Ordered by ascending `file_offset`, non-overlapping.
    pub runs: Vec<ByteRun>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_runs(mut self, runs: Vec<ByteRun>) -> Self {
        self.size = runs.iter().map(ByteRun::file_end).max().unwrap_or(0);
        self.runs = runs;
        self
    }

    pub fn fingerprint(&self, kind: HashKind) -> Option<&str> {
        match kind {
            HashKind::Md5 => self.md5.as_deref(),
            HashKind::Sha1 => self.sha1.as_deref(),
        }
    }

    pub fn set_fingerprint(&mut self, kind: HashKind, value: String) {
        match kind {
            HashKind::Md5 => self.md5 = Some(value),
            HashKind::Sha1 => self.sha1 = Some(value),
        }
    }

    /// Last path component, always split on '/'.
    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Everything before the last '/', with trailing separators removed
    /// unless the directory is the root itself.
    pub fn dirname(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => {
                let head = &self.path[..=idx];
                let trimmed = head.trim_end_matches('/');
                if trimmed.is_empty() { head } else { trimmed }
            }
            None => "",
        }
    }

    /// Number of content bytes the runs can supply, bounded by the reported size.
    pub fn content_len(&self) -> u64 {
        let runs_end = self.runs.iter().map(ByteRun::file_end).max().unwrap_or(0);
        runs_end.min(self.size)
    }
}
