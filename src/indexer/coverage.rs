//! Coverage tracking: which lines of a file no claimed range covers.

/// A maximal run of unclaimed lines, 0-indexed and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UncoveredRun {
    pub start: usize,
    pub end: usize,
}

impl UncoveredRun {
    pub fn line_count(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Compute the maximal uncovered runs of a file with `total_lines` lines.
///
/// `claimed` holds inclusive `(start, end)` ranges in any order; overlap is
/// tolerated, ranges past the end of the file are clipped, and ranges with
/// `end < start` claim nothing. Runs come back in line order.
pub fn uncovered_runs(total_lines: usize, claimed: &[(usize, usize)]) -> Vec<UncoveredRun> {
    let mut covered = vec![false; total_lines];
    for &(start, end) in claimed {
        let stop = end.saturating_add(1).min(total_lines);
        if start < stop {
            covered[start..stop].fill(true);
        }
    }

    let mut runs = Vec::new();
    let mut run_start = None;
    for (line, &is_covered) in covered.iter().enumerate() {
        match (is_covered, run_start) {
            (false, None) => run_start = Some(line),
            (true, Some(start)) => {
                runs.push(UncoveredRun { start, end: line - 1 });
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        runs.push(UncoveredRun {
            start,
            end: total_lines - 1,
        });
    }
    runs
}
