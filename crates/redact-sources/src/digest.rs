//! Content fingerprints computed from the image

use md5::{Digest, Md5};
use redact_core::{FileEntry, HashKind, ImageHandle, RedactError, Result};
use sha1::Sha1;

use crate::HashPlan;

const CHUNK: usize = 1 << 20;

/// Compute every fingerprint the plan requires and the entry lacks.
///
/// Content is streamed run by run in file-offset order; holes between runs
/// hash as zeros, matching what a file read would return.
pub fn fill_missing(entry: &mut FileEntry, image: &ImageHandle, plan: HashPlan) -> Result<()> {
    let mut md5 = (plan.md5 && entry.md5.is_none()).then(Md5::new);
    let mut sha1 = (plan.sha1 && entry.sha1.is_none()).then(Sha1::new);
    if md5.is_none() && sha1.is_none() {
        return Ok(());
    }

    let len = entry.content_len();
    let mut buf = vec![0u8; CHUNK];
    let mut position = 0u64;

    let mut feed = |bytes: &[u8]| {
        if let Some(h) = md5.as_mut() {
            h.update(bytes);
        }
        if let Some(h) = sha1.as_mut() {
            h.update(bytes);
        }
    };

    for run in &entry.runs {
        if run.file_offset >= len {
            break;
        }
        if run.file_offset > position {
            feed_zeros(&mut feed, run.file_offset - position);
        }
        let end = run.file_end().min(len);
        let mut offset = run.file_offset.max(position);
        while offset < end {
            let n = ((end - offset) as usize).min(CHUNK);
            image
                .read_exact_at(run.image_offset + (offset - run.file_offset), &mut buf[..n])
                .map_err(|e| RedactError::image(image.path(), e))?;
            feed(&buf[..n]);
            offset += n as u64;
        }
        position = position.max(end);
    }
    if position < len {
        feed_zeros(&mut feed, len - position);
    }

    if let Some(h) = md5 {
        entry.set_fingerprint(HashKind::Md5, format!("{:x}", h.finalize()));
    }
    if let Some(h) = sha1 {
        entry.set_fingerprint(HashKind::Sha1, format!("{:x}", h.finalize()));
    }
    Ok(())
}

fn feed_zeros(feed: &mut impl FnMut(&[u8]), mut count: u64) {
    let zeros = [0u8; 4096];
    while count > 0 {
        let n = count.min(zeros.len() as u64) as usize;
        feed(&zeros[..n]);
        count -= n as u64;
    }
}
