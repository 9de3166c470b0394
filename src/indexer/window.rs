//! Deterministic sliding-window chunking over line ranges.

use std::ops::Range;

pub const DEFAULT_CHUNK_SIZE: usize = 800;
pub const DEFAULT_OVERLAP: usize = 100;

/// Iterator over half-open `start..end` line windows of a block of
/// `total` lines.
///
/// Every window holds at most `chunk_size` lines, the next window starts at
/// `max(start + 1, end - overlap)`, and iteration stops after the window
/// that reaches `total`. Starts therefore strictly increase for any
/// `overlap`, including `overlap >= chunk_size`.
#[derive(Debug, Clone)]
pub struct Windows {
    next_start: usize,
    total: usize,
    chunk_size: usize,
    overlap: usize,
    done: bool,
}

impl Iterator for Windows {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Range<usize>> {
        if self.done || self.next_start >= self.total {
            return None;
        }
        let start = self.next_start;
        let end = start.saturating_add(self.chunk_size).min(self.total);
        if end == self.total {
            self.done = true;
        }
        self.next_start = end.saturating_sub(self.overlap).max(start + 1);
        Some(start..end)
    }
}

/// Split `total` lines into overlapping windows.
///
/// A `chunk_size` of zero is treated as one line per window.
pub fn windows(total: usize, chunk_size: usize, overlap: usize) -> Windows {
    Windows {
        next_start: 0,
        total,
        chunk_size: chunk_size.max(1),
        overlap,
        done: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_block_has_no_windows() {
        assert_eq!(windows(0, 800, 100).count(), 0);
    }

    #[test]
    fn test_short_block_is_one_window() {
        assert_eq!(windows(1, 800, 100).collect::<Vec<_>>(), vec![0..1]);
        assert_eq!(windows(799, 800, 100).collect::<Vec<_>>(), vec![0..799]);
    }

    #[test]
    fn test_common_case_advances_by_size_minus_overlap() {
        let got: Vec<_> = windows(2000, 800, 100).collect();
        assert_eq!(got, vec![0..800, 700..1500, 1400..2000]);
    }

    #[test]
    fn test_ten_lines_size_three_overlap_two() {
        let got: Vec<_> = windows(10, 3, 2).collect();
        assert_eq!(
            got,
            vec![0..3, 1..4, 2..5, 3..6, 4..7, 5..8, 6..9, 7..10]
        );
        let mut covered = [false; 10];
        for w in &got {
            covered[w.clone()].fill(true);
        }
        assert!(covered.iter().all(|&c| c));
    }

    #[test]
    fn test_overlap_not_smaller_than_size_still_advances() {
        let got: Vec<_> = windows(5, 2, 7).collect();
        assert_eq!(got, vec![0..2, 1..3, 2..4, 3..5]);
    }

    #[test]
    fn test_zero_overlap_tiles() {
        let got: Vec<_> = windows(7, 3, 0).collect();
        assert_eq!(got, vec![0..3, 3..6, 6..7]);
    }

    proptest! {
        #[test]
        fn windows_terminate_advance_and_cover(
            total in 1usize..600,
            chunk_size in 1usize..120,
            overlap in 0usize..200,
        ) {
            let got: Vec<_> = windows(total, chunk_size, overlap).take(total + 1).collect();

            prop_assert!(!got.is_empty());
            prop_assert!(got.len() <= total, "more windows than lines");
            prop_assert_eq!(got[0].start, 0);
            prop_assert_eq!(got.last().map(|w| w.end), Some(total));
            for w in &got {
                prop_assert!(w.start < w.end);
                prop_assert!(w.end - w.start <= chunk_size);
            }
            for pair in got.windows(2) {
                prop_assert!(pair[1].start > pair[0].start);
                // No gaps between consecutive windows.
                prop_assert!(pair[1].start <= pair[0].end);
            }
        }
    }
}
