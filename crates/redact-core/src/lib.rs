//! Core domain models and logic for disk image redaction
//!
//! This crate contains:
//! - Byte runs and the file-offset to image-offset mapper
//! - File entries as delivered by a forensic walk
//! - The image handle and per-file content views
//! - The error taxonomy shared by every other crate

pub mod byte_run;
pub mod entry;
pub mod error;
pub mod image;
pub mod view;

pub use byte_run::{map_intervals, ByteRun, MappedRuns};
pub use entry::{FileEntry, HashKind};
pub use error::{ErrorKind, RedactError, Result};
pub use image::ImageHandle;
pub use view::FileView;

/// Files at or above this size are read through a memory map when their runs are contiguous.
pub const DEFAULT_MMAP_THRESHOLD: u64 = 128 * 1024 * 1024;
