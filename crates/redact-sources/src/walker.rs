//! Forensic walker interface

use std::path::PathBuf;

use redact_core::{FileEntry, HashKind, Result};

/// Fingerprints the walker must provide for every file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HashPlan {
    pub md5: bool,
    pub sha1: bool,
}

impl HashPlan {
    pub fn require(&mut self, kind: HashKind) {
        match kind {
            HashKind::Md5 => self.md5 = true,
            HashKind::Sha1 => self.sha1 = true,
        }
    }

    pub fn requires(&self, kind: HashKind) -> bool {
        match kind {
            HashKind::Md5 => self.md5,
            HashKind::Sha1 => self.sha1,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.md5 && !self.sha1
    }
}

/// What a walker needs to know to enumerate files.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Image the runs refer to.
    pub image: PathBuf,
    /// Forensic report describing the image.
    pub report: Option<PathBuf>,
    pub hashes: HashPlan,
}

/// Trait for enumerating the files of a disk image
pub trait FileWalker {
    /// Deliver every file and directory node to `on_file`, in report order.
    /// An error from `on_file` stops the walk and is returned unchanged.
    fn walk(
        &mut self,
        options: &WalkOptions,
        on_file: &mut dyn FnMut(FileEntry) -> Result<()>,
    ) -> Result<()>;
}

/// Walker over an in-memory list of entries. Useful when a caller already
/// holds the report contents.
#[derive(Debug, Clone, Default)]
pub struct StaticWalker {
    entries: Vec<FileEntry>,
}

impl StaticWalker {
    pub fn new(entries: Vec<FileEntry>) -> Self {
        Self { entries }
    }
}

impl FileWalker for StaticWalker {
    fn walk(
        &mut self,
        _options: &WalkOptions,
        on_file: &mut dyn FnMut(FileEntry) -> Result<()>,
    ) -> Result<()> {
        for entry in &self.entries {
            on_file(entry.clone())?;
        }
        Ok(())
    }
}
