//! Positioned access to a disk image file

use std::cell::OnceCell;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::{RedactError, Result};

/// An open disk image.
///
/// Reads and writes go through `&File`, so rules and actions can share one
/// handle for the duration of a run. Writes are refused on read-only handles
/// and never extend the image.
pub struct ImageHandle {
    path: PathBuf,
    file: File,
    writable: bool,
    len: u64,
    map: OnceCell<Mmap>,
}

impl ImageHandle {
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| RedactError::image(path, e))?;
        Self::from_file(path, file, false)
    }

    pub fn open_read_write(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| RedactError::image(path, e))?;
        Self::from_file(path, file, true)
    }

    pub fn from_file(path: impl AsRef<Path>, file: File, writable: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = file
            .metadata()
            .map_err(|e| RedactError::image(&path, e))?
            .len();
        Ok(Self {
            path,
            file,
            writable,
            len,
            map: OnceCell::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.check_bounds(offset, buf.len() as u64)?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }

    pub fn write_all_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is open read-only", self.path.display()),
            ));
        }
        self.check_bounds(offset, data.len() as u64)?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)
    }

    /// Read-only map of the whole image, created on first use.
    pub fn mapped(&self) -> io::Result<&Mmap> {
        if let Some(map) = self.map.get() {
            return Ok(map);
        }
        if self.len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot map an empty image",
            ));
        }
        // SAFETY: the map is read-only and the handle's owner is the only
        // writer for the run. Writes go through the same file, so the page
        // cache keeps the view coherent.
        let map = unsafe { Mmap::map(&self.file)? };
        Ok(self.map.get_or_init(|| map))
    }

    pub fn sync(&self) -> io::Result<()> {
        if self.writable {
            self.file.sync_all()?;
        }
        Ok(())
    }

    fn check_bounds(&self, offset: u64, len: u64) -> io::Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "range {}+{} lies outside image of {} bytes",
                    offset, len, self.len
                ),
            )),
        }
    }
}
