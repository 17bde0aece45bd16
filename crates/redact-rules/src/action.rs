//! Byte-level transformations applied to image runs

use std::fmt;

use redact_core::{ByteRun, ImageHandle, RedactError, Result};
use tracing::{debug, warn};

const FILL_CHUNK: u64 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Overwrite every byte with the given value.
    Fill(u8),
    /// Fill with zeros.
    Scrub,
    /// Fold high bytes into 159..=191, keep everything below 127.
    Fuzz,
    /// Reserved by the rule-file grammar; applying it always fails.
    Encrypt,
}

/// A run that could not be processed and was left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRun {
    pub run: ByteRun,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Runs rewritten, or planned when not committing.
    pub runs: Vec<ByteRun>,
    pub skipped: Vec<SkippedRun>,
}

/// The fuzz transform for one byte. Total and length-preserving.
pub fn fuzz_byte(b: u8) -> u8 {
    if b < 127 { b } else { (b >> 2) + 128 }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Fill(value) => write!(f, "Fill with {:#04x}", value),
            Action::Scrub => f.write_str("Scrub"),
            Action::Fuzz => f.write_str("Fuzz"),
            Action::Encrypt => f.write_str("Encrypt"),
        }
    }
}

impl Action {
    /// Rewrite `runs` on `image`. With `commit` false nothing is written but
    /// the outcome lists the same runs a committed apply would.
    pub fn apply(
        &self,
        runs: &[ByteRun],
        image: &ImageHandle,
        commit: bool,
    ) -> Result<ActionOutcome> {
        match self {
            Action::Fill(value) => fill(*value, runs, image, commit),
            Action::Scrub => fill(0x00, runs, image, commit),
            Action::Fuzz => Ok(fuzz(runs, image, commit)),
            Action::Encrypt => Err(RedactError::NotImplemented("ENCRYPT action")),
        }
    }
}

fn fill(value: u8, runs: &[ByteRun], image: &ImageHandle, commit: bool) -> Result<ActionOutcome> {
    let mut outcome = ActionOutcome::default();
    let longest = runs.iter().map(|r| r.length).max().unwrap_or(0);
    let pattern = vec![value; longest.min(FILL_CHUNK) as usize];

    for run in runs {
        if run.image_end() > image.len() {
            return Err(RedactError::Report(format!(
                "run at image offset {} (+{}) lies outside the {}-byte image",
                run.image_offset,
                run.length,
                image.len()
            )));
        }
        debug!(
            "Filling at offset {}, {} bytes with {:#04x}",
            run.image_offset, run.length, value
        );
        if commit {
            let mut offset = run.image_offset;
            let mut remaining = run.length;
            while remaining > 0 {
                let n = remaining.min(pattern.len() as u64);
                image
                    .write_all_at(offset, &pattern[..n as usize])
                    .map_err(|e| RedactError::image(image.path(), e))?;
                offset += n;
                remaining -= n;
            }
        }
        outcome.runs.push(*run);
    }
    Ok(outcome)
}

fn fuzz(runs: &[ByteRun], image: &ImageHandle, commit: bool) -> ActionOutcome {
    let mut outcome = ActionOutcome::default();
    let longest = runs.iter().map(|r| r.length).max().unwrap_or(0);
    let mut buf = vec![0u8; longest.min(FILL_CHUNK) as usize];

    for run in runs {
        debug!("Fuzzing at offset {}, {} bytes", run.image_offset, run.length);
        match fuzz_run(run, image, commit, &mut buf) {
            Ok(()) => outcome.runs.push(*run),
            Err(e) => {
                warn!("Skipping fuzz of run at offset {}: {}", run.image_offset, e);
                outcome.skipped.push(SkippedRun {
                    run: *run,
                    reason: e.to_string(),
                });
            }
        }
    }
    outcome
}

/// Read, transform and write back one run a chunk at a time.
///
/// A dry run still reads every chunk so an unreadable run is skipped the same
/// way in both modes. A run reaching past the image is rejected before any
/// chunk is touched.
fn fuzz_run(run: &ByteRun, image: &ImageHandle, commit: bool, buf: &mut [u8]) -> std::io::Result<()> {
    if run.image_end() > image.len() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("run ends past the {}-byte image", image.len()),
        ));
    }
    let mut offset = run.image_offset;
    let mut remaining = run.length;
    while remaining > 0 {
        let n = remaining.min(buf.len() as u64) as usize;
        let chunk = &mut buf[..n];
        image.read_exact_at(offset, chunk)?;
        if commit {
            chunk.iter_mut().for_each(|b| *b = fuzz_byte(*b));
            image.write_all_at(offset, chunk)?;
        }
        offset += n as u64;
        remaining -= n as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn image_with(content: &[u8]) -> (tempfile::NamedTempFile, ImageHandle) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        let image = ImageHandle::open_read_write(file.path()).unwrap();
        (file, image)
    }

    #[test]
    fn test_fuzz_byte_table() {
        for b in 0u8..127 {
            assert_eq!(fuzz_byte(b), b);
        }
        for b in 127u8..=255 {
            assert_eq!(fuzz_byte(b) as u32, ((b as u32 >> 2) + 128) % 256);
            assert!((159..=191).contains(&fuzz_byte(b)));
        }
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(Action::Fill(0x44).to_string(), "Fill with 0x44");
        assert_eq!(Action::Fill(0x04).to_string(), "Fill with 0x04");
        assert_eq!(Action::Scrub.to_string(), "Scrub");
        assert_eq!(Action::Fuzz.to_string(), "Fuzz");
    }

    #[test]
    fn test_fill_commit_writes_runs() {
        let (tmp, image) = image_with(b"0123456789");
        let runs = [ByteRun::new(0, 2, 1), ByteRun::new(2, 3, 6)];
        let outcome = Action::Fill(b'D').apply(&runs, &image, true).unwrap();
        assert_eq!(outcome.runs, runs.to_vec());
        assert!(outcome.skipped.is_empty());
        assert_eq!(std::fs::read(tmp.path()).unwrap(), b"0DD345DDD9");
    }

    #[test]
    fn test_dry_run_reports_without_writing() {
        let (tmp, image) = image_with(b"0123456789");
        let runs = [ByteRun::new(0, 4, 3)];
        for action in [Action::Fill(0x4B), Action::Scrub, Action::Fuzz] {
            let outcome = action.apply(&runs, &image, false).unwrap();
            assert_eq!(outcome.runs, runs.to_vec());
        }
        assert_eq!(std::fs::read(tmp.path()).unwrap(), b"0123456789");
    }

    #[test]
    fn test_scrub_zeroes() {
        let (tmp, image) = image_with(b"abcdef");
        Action::Scrub
            .apply(&[ByteRun::new(0, 6, 0)], &image, true)
            .unwrap();
        assert_eq!(std::fs::read(tmp.path()).unwrap(), vec![0u8; 6]);
    }

    #[test]
    fn test_fuzz_commit_preserves_low_bytes() {
        let (tmp, image) = image_with(&[b'a', 0x7F, 0x80, 0xFF, b'z']);
        let outcome = Action::Fuzz
            .apply(&[ByteRun::new(0, 5, 0)], &image, true)
            .unwrap();
        assert_eq!(outcome.runs.len(), 1);
        assert_eq!(
            std::fs::read(tmp.path()).unwrap(),
            vec![b'a', 0x9F, 0xA0, 0xBF, b'z']
        );
    }

    #[test]
    fn test_fuzz_skips_unreadable_run() {
        let (tmp, image) = image_with(&[0xF0; 8]);
        let runs = [ByteRun::new(0, 4, 100), ByteRun::new(4, 4, 4)];
        let outcome = Action::Fuzz.apply(&runs, &image, true).unwrap();
        assert_eq!(outcome.runs, vec![runs[1]]);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].run, runs[0]);
        let bytes = std::fs::read(tmp.path()).unwrap();
        assert_eq!(&bytes[..4], &[0xF0; 4]);
        assert_eq!(&bytes[4..], &[0xBC; 4]);
    }

    #[test]
    fn test_fuzz_run_longer_than_a_chunk() {
        let len = 2 * FILL_CHUNK as usize + 3;
        let mut content = vec![0xFFu8; len];
        content[0] = b'a';
        content[len - 1] = b'z';
        let (tmp, image) = image_with(&content);

        let run = ByteRun::new(0, len as u64, 0);
        let outcome = Action::Fuzz.apply(&[run], &image, true).unwrap();
        assert_eq!(outcome.runs, vec![run]);

        let bytes = std::fs::read(tmp.path()).unwrap();
        assert_eq!(bytes.len(), len);
        assert_eq!(bytes[0], b'a');
        assert_eq!(bytes[len - 1], b'z');
        assert!(bytes[1..len - 1].iter().all(|&b| b == 0xBF));
    }

    #[test]
    fn test_fuzz_partly_outside_image_writes_nothing() {
        let (tmp, image) = image_with(&[0xF0; 8]);
        let outcome = Action::Fuzz
            .apply(&[ByteRun::new(0, 12, 0)], &image, true)
            .unwrap();
        assert!(outcome.runs.is_empty());
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(std::fs::read(tmp.path()).unwrap(), vec![0xF0; 8]);
    }

    #[test]
    fn test_fill_outside_image_is_fatal() {
        let (_tmp, image) = image_with(b"0123");
        let err = Action::Fill(0)
            .apply(&[ByteRun::new(0, 8, 0)], &image, false)
            .unwrap_err();
        assert_eq!(err.kind(), redact_core::ErrorKind::Run);
    }

    #[test]
    fn test_encrypt_is_not_implemented() {
        let (_tmp, image) = image_with(b"0123");
        let err = Action::Encrypt
            .apply(&[ByteRun::new(0, 4, 0)], &image, false)
            .unwrap_err();
        assert!(matches!(err, RedactError::NotImplemented(_)));
    }
}
