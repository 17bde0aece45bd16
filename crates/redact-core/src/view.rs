//! Lazy content access for one file entry

use std::cell::OnceCell;

use tracing::{debug, warn};

use crate::{ByteRun, FileEntry, ImageHandle, RedactError, Result};

enum Content<'a> {
    Buffered(Vec<u8>),
    Mapped(&'a [u8]),
}

impl Content<'_> {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Content::Buffered(bytes) => bytes,
            Content::Mapped(slice) => slice,
        }
    }
}

/// A file entry together with the image its runs point into.
///
/// Content is assembled on first request and cached for the life of the view.
/// Byte `i` of the content is the byte at file offset `i`; holes between runs
/// read as zeros.
pub struct FileView<'a> {
    entry: &'a FileEntry,
    image: &'a ImageHandle,
    mmap_threshold: u64,
    content: OnceCell<Content<'a>>,
}

impl<'a> FileView<'a> {
    pub fn new(entry: &'a FileEntry, image: &'a ImageHandle, mmap_threshold: u64) -> Self {
        Self {
            entry,
            image,
            mmap_threshold,
            content: OnceCell::new(),
        }
    }

    pub fn entry(&self) -> &'a FileEntry {
        self.entry
    }

    pub fn image(&self) -> &'a ImageHandle {
        self.image
    }

    pub fn content(&self) -> Result<&[u8]> {
        if let Some(content) = self.content.get() {
            return Ok(content.as_bytes());
        }
        let loaded = self.load()?;
        Ok(self.content.get_or_init(|| loaded).as_bytes())
    }

    fn load(&self) -> Result<Content<'a>> {
        let len = self.entry.content_len();

        if len >= self.mmap_threshold {
            if let Some(run) = self.single_extent(len) {
                debug!("Mapping {} ({} bytes)", self.entry.path, len);
                let map = self
                    .image
                    .mapped()
                    .map_err(|e| RedactError::image(self.image.path(), e))?;
                let start = run.image_offset as usize;
                let end = start + len as usize;
                return map.get(start..end).map(Content::Mapped).ok_or_else(|| {
                    RedactError::Report(format!(
                        "{}: run at image offset {} extends past the image",
                        self.entry.path, run.image_offset
                    ))
                });
            }
            warn!(
                "{} is fragmented or sparse, buffering all {} bytes in memory",
                self.entry.path, len
            );
        }

        let mut buf = vec![0u8; len as usize];
        for run in &self.entry.runs {
            if run.file_offset >= len {
                break;
            }
            let take = run.length.min(len - run.file_offset) as usize;
            let start = run.file_offset as usize;
            self.image
                .read_exact_at(run.image_offset, &mut buf[start..start + take])
                .map_err(|e| RedactError::image(self.image.path(), e))?;
        }
        Ok(Content::Buffered(buf))
    }

    /// The run holding the whole content, if the content is one extent starting at offset 0.
    fn single_extent(&self, len: u64) -> Option<ByteRun> {
        let first = *self.entry.runs.first()?;
        if first.file_offset != 0 {
            return None;
        }
        let mut image_end = first.image_end();
        let mut file_end = first.file_end();
        for run in &self.entry.runs[1..] {
            if file_end >= len {
                break;
            }
            if run.file_offset != file_end || run.image_offset != image_end {
                return None;
            }
            file_end = run.file_end();
            image_end = run.image_end();
        }
        (file_end >= len).then_some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn image_with(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_fragmented_content_is_reassembled() {
        let tmp = image_with(b"....WORLD...HELLO ....");
        let image = ImageHandle::open_read_only(tmp.path()).unwrap();
        let entry = FileEntry::new("greeting.txt")
            .with_runs(vec![ByteRun::new(0, 6, 12), ByteRun::new(6, 5, 4)]);

        let view = FileView::new(&entry, &image, crate::DEFAULT_MMAP_THRESHOLD);
        assert_eq!(view.content().unwrap(), b"HELLO WORLD");
    }

    #[test]
    fn test_sparse_hole_reads_as_zero() {
        let tmp = image_with(b"abcdefgh");
        let image = ImageHandle::open_read_only(tmp.path()).unwrap();
        let entry =
            FileEntry::new("sparse").with_runs(vec![ByteRun::new(0, 2, 0), ByteRun::new(4, 2, 6)]);

        let view = FileView::new(&entry, &image, crate::DEFAULT_MMAP_THRESHOLD);
        assert_eq!(view.content().unwrap(), b"ab\0\0gh");
    }

    #[test]
    fn test_size_truncates_slack() {
        let tmp = image_with(b"secret-and-slack");
        let image = ImageHandle::open_read_only(tmp.path()).unwrap();
        let mut entry = FileEntry::new("short").with_runs(vec![ByteRun::new(0, 16, 0)]);
        entry.size = 6;

        let view = FileView::new(&entry, &image, crate::DEFAULT_MMAP_THRESHOLD);
        assert_eq!(view.content().unwrap(), b"secret");
    }

    #[test]
    fn test_large_contiguous_file_is_mapped() {
        let tmp = image_with(b"xxHELLOxx");
        let image = ImageHandle::open_read_only(tmp.path()).unwrap();
        let entry = FileEntry::new("big")
            .with_runs(vec![ByteRun::new(0, 3, 2), ByteRun::new(3, 2, 5)]);

        let view = FileView::new(&entry, &image, 1);
        assert_eq!(view.content().unwrap(), b"HELLO");
    }

    #[test]
    fn test_run_past_image_end_is_an_error() {
        let tmp = image_with(b"tiny");
        let image = ImageHandle::open_read_only(tmp.path()).unwrap();
        let entry = FileEntry::new("broken").with_runs(vec![ByteRun::new(0, 10, 0)]);

        let buffered = FileView::new(&entry, &image, crate::DEFAULT_MMAP_THRESHOLD);
        assert!(buffered.content().is_err());
        let mapped = FileView::new(&entry, &image, 1);
        assert!(mapped.content().is_err());
    }
}
