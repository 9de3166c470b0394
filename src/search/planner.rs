//! Paged nearest-neighbour search with a quality filter.

use std::collections::HashSet;

use tracing::debug;

use crate::db::models::SearchCandidate;
use crate::error::Result;

pub const DEFAULT_MIN_SPAN_LINES: usize = 10;

/// Anything that can return the `limit` nearest chunks after skipping the
/// first `offset`, in its own similarity order.
pub trait NearestNeighbors {
    fn nearest(&self, query: &[f32], offset: usize, limit: usize) -> Result<Vec<SearchCandidate>>;
}

/// Minimum size a candidate must have to be worth returning.
#[derive(Debug, Clone, Copy)]
pub struct Admissibility {
    pub min_span_lines: usize,
    /// Non-whitespace-trimmed characters; 0 disables the check.
    pub min_content_chars: usize,
}

impl Default for Admissibility {
    fn default() -> Self {
        Self {
            min_span_lines: DEFAULT_MIN_SPAN_LINES,
            min_content_chars: 0,
        }
    }
}

impl Admissibility {
    pub fn admits(&self, candidate: &SearchCandidate) -> bool {
        candidate.end_line >= candidate.start_line
            && candidate.line_count() >= self.min_span_lines
            && (self.min_content_chars == 0
                || candidate.content.trim().chars().count() >= self.min_content_chars)
    }
}

pub struct VectorQueryPlanner {
    admissibility: Admissibility,
}

impl VectorQueryPlanner {
    pub fn new(admissibility: Admissibility) -> Self {
        Self { admissibility }
    }

    /// Collect up to `k` admissible candidates in index order.
    ///
    /// Pages of `k` raw hits are pulled at increasing offsets until `k`
    /// candidates pass the filter or a page comes back short, meaning the
    /// index is exhausted.
    pub fn plan<N: NearestNeighbors + ?Sized>(
        &self,
        index: &N,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchCandidate>> {
        let mut accepted = Vec::new();
        if k == 0 {
            return Ok(accepted);
        }

        let page_size = k;
        let mut offset = 0;
        let mut seen = HashSet::new();
        let mut pages = 0;

        loop {
            let page = index.nearest(query, offset, page_size)?;
            let fetched = page.len();
            offset += fetched;
            pages += 1;

            for candidate in page {
                if accepted.len() == k {
                    break;
                }
                if !seen.insert(candidate.chunk_id.clone()) {
                    continue;
                }
                if self.admissibility.admits(&candidate) {
                    accepted.push(candidate);
                }
            }

            if accepted.len() == k || fetched < page_size {
                break;
            }
        }

        debug!(
            "planner accepted {} of {offset} raw hits over {pages} page(s)",
            accepted.len()
        );
        Ok(accepted)
    }
}
