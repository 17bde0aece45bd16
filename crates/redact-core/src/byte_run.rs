//! Byte runs and the file-offset to image-offset mapper
//!
//! A file's logical byte stream is stored on the image as a list of extents.
//! Content searches report spans in file offsets; writes need image offsets.
//! [`map_intervals`] is the only place that translation happens.

use serde::{Deserialize, Serialize};

/// One contiguous extent: `length` bytes starting at `file_offset` in the
/// file are stored starting at `image_offset` in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteRun {
    pub file_offset: u64,
    pub length: u64,
    pub image_offset: u64,
}

impl ByteRun {
    pub fn new(file_offset: u64, length: u64, image_offset: u64) -> Self {
        Self {
            file_offset,
            length,
            image_offset,
        }
    }

    /// File offset one past the last byte of this run. Saturates at `u64::MAX`.
    pub fn file_end(&self) -> u64 {
        self.file_offset.saturating_add(self.length)
    }

    /// Image offset one past the last byte of this run. Saturates at `u64::MAX`.
    pub fn image_end(&self) -> u64 {
        self.image_offset.saturating_add(self.length)
    }
}

/// Result of translating file-relative intervals into image runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedRuns {
    /// Physical runs, in interval order then run order.
    pub runs: Vec<ByteRun>,
    /// Pieces of intervals that no run covers, as `[start, end)` file offsets.
    pub unmapped: Vec<(u64, u64)>,
}

/// Translate `[start, end)` file-offset intervals into physical byte runs.
///
/// `runs` must be ordered by ascending `file_offset` and must not overlap.
/// An interval that crosses a run boundary is split into one output run per
/// physical run it touches. Parts of an interval that fall outside every run
/// produce no output and are reported in [`MappedRuns::unmapped`].
pub fn map_intervals(runs: &[ByteRun], intervals: &[(u64, u64)]) -> MappedRuns {
    let mut mapped = MappedRuns::default();

    for &(start, end) in intervals {
        if start >= end {
            continue;
        }

        let mut cursor = start;
        for run in runs {
            if run.length == 0 || run.file_end() <= cursor {
                continue;
            }
            if run.file_offset >= end {
                break;
            }
            if run.file_offset > cursor {
                mapped.unmapped.push((cursor, run.file_offset));
                cursor = run.file_offset;
            }

            let piece_end = end.min(run.file_end());
            mapped.runs.push(ByteRun {
                file_offset: cursor,
                length: piece_end - cursor,
                image_offset: run.image_offset + (cursor - run.file_offset),
            });
            cursor = piece_end;

            if cursor >= end {
                break;
            }
        }

        if cursor < end {
            mapped.unmapped.push((cursor, end));
        }
    }

    mapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fragmented() -> Vec<ByteRun> {
        vec![
            ByteRun::new(0, 4096, 1_048_576),
            ByteRun::new(4096, 4096, 2_097_152),
            ByteRun::new(8192, 100, 65_536),
        ]
    }

    #[test]
    fn test_interval_inside_one_run() {
        let mapped = map_intervals(&fragmented(), &[(100, 105)]);
        assert_eq!(mapped.runs, vec![ByteRun::new(100, 5, 1_048_676)]);
        assert!(mapped.unmapped.is_empty());
    }

    #[test]
    fn test_interval_spanning_boundary() {
        let mapped = map_intervals(&fragmented(), &[(4094, 4099)]);
        assert_eq!(
            mapped.runs,
            vec![
                ByteRun::new(4094, 2, 1_048_576 + 4094),
                ByteRun::new(4096, 3, 2_097_152),
            ]
        );
    }

    #[test]
    fn test_interval_spanning_three_runs() {
        let mapped = map_intervals(&fragmented(), &[(4000, 8200)]);
        assert_eq!(mapped.runs.len(), 3);
        assert_eq!(mapped.runs[0], ByteRun::new(4000, 96, 1_048_576 + 4000));
        assert_eq!(mapped.runs[1], ByteRun::new(4096, 4096, 2_097_152));
        assert_eq!(mapped.runs[2], ByteRun::new(8192, 8, 65_536));
    }

    #[test]
    fn test_output_follows_interval_order() {
        let mapped = map_intervals(&fragmented(), &[(8192, 8193), (0, 1)]);
        assert_eq!(
            mapped.runs,
            vec![ByteRun::new(8192, 1, 65_536), ByteRun::new(0, 1, 1_048_576)]
        );
    }

    #[test]
    fn test_interval_outside_runs_is_dropped() {
        let mapped = map_intervals(&fragmented(), &[(9000, 9010)]);
        assert!(mapped.runs.is_empty());
        assert_eq!(mapped.unmapped, vec![(9000, 9010)]);
    }

    #[test]
    fn test_interval_across_sparse_gap() {
        let runs = vec![ByteRun::new(0, 10, 500), ByteRun::new(20, 10, 900)];
        let mapped = map_intervals(&runs, &[(5, 25)]);
        assert_eq!(
            mapped.runs,
            vec![ByteRun::new(5, 5, 505), ByteRun::new(20, 5, 900)]
        );
        assert_eq!(mapped.unmapped, vec![(10, 20)]);
    }

    #[test]
    fn test_empty_interval_ignored() {
        let mapped = map_intervals(&fragmented(), &[(10, 10), (12, 11)]);
        assert_eq!(mapped, MappedRuns::default());
    }

    #[test]
    fn test_ends_saturate() {
        let run = ByteRun::new(u64::MAX - 10, 4096, u64::MAX);
        assert_eq!(run.file_end(), u64::MAX);
        assert_eq!(run.image_end(), u64::MAX);
    }

    #[test]
    fn test_camel_case_serialization() {
        let json = serde_json::to_value(ByteRun::new(1, 2, 3)).unwrap();
        assert_eq!(json["fileOffset"], 1);
        assert_eq!(json["length"], 2);
        assert_eq!(json["imageOffset"], 3);
    }

    proptest! {
        #[test]
        fn prop_single_run_interval(
            run_start in 0u64..1_000_000,
            run_len in 1u64..100_000,
            image_offset in 0u64..1_000_000_000,
            a in 0u64..100_000,
            b in 0u64..100_000,
        ) {
            let run = ByteRun::new(run_start, run_len, image_offset);
            let lo = run_start + a.min(b) % run_len;
            let hi = (run_start + a.max(b) % run_len).max(lo) + 1;
            let hi = hi.min(run.file_end());
            prop_assume!(lo < hi);

            let mapped = map_intervals(&[run], &[(lo, hi)]);
            prop_assert_eq!(mapped.runs.len(), 1);
            prop_assert_eq!(mapped.runs[0].image_offset, image_offset + (lo - run_start));
            prop_assert_eq!(mapped.runs[0].length, hi - lo);
            prop_assert!(mapped.unmapped.is_empty());
        }

        #[test]
        fn prop_two_adjacent_runs(
            first_len in 1u64..10_000,
            second_len in 1u64..10_000,
            first_image in 0u64..1_000_000,
            second_image in 2_000_000u64..3_000_000,
            before in 1u64..10_000,
            after in 1u64..10_000,
        ) {
            let runs = [
                ByteRun::new(0, first_len, first_image),
                ByteRun::new(first_len, second_len, second_image),
            ];
            let start = first_len - before.min(first_len);
            let end = first_len + after.min(second_len);

            let mapped = map_intervals(&runs, &[(start, end)]);
            prop_assert_eq!(mapped.runs.len(), 2);
            prop_assert_eq!(mapped.runs[0].length + mapped.runs[1].length, end - start);
            prop_assert_eq!(mapped.runs[0].file_end(), mapped.runs[1].file_offset);
            prop_assert_eq!(mapped.runs[1].image_offset, second_image);
        }
    }
}
