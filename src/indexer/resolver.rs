//! Chunk resolution: syntax units first, sliding windows over whatever the
//! syntax pass did not claim.

use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, warn};

use super::coverage::uncovered_runs;
use super::extractor::{LanguageSupport, SyntaxUnit};
use super::languages::language_for_path;
use super::window::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP, windows};
use crate::db::models::{Chunk, ChunkKind};

/// A file's path (relative to the repository root) and its text.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

struct Piece {
    start: usize,
    end: usize,
    kind: ChunkKind,
    unit_type: Option<String>,
}

/// Produces the final chunk set of a repository.
///
/// For every file the union of chunk ranges is exactly `[0, lines)`,
/// syntax-unit chunks are pairwise disjoint, and fallback windows never
/// touch a syntax unit's lines. Windows may overlap each other by
/// `overlap` lines.
pub struct ChunkResolver {
    support: Arc<dyn LanguageSupport>,
    chunk_size: usize,
    overlap: usize,
}

impl ChunkResolver {
    pub fn new(support: Arc<dyn LanguageSupport>, chunk_size: usize, overlap: usize) -> Self {
        Self {
            support,
            chunk_size,
            overlap,
        }
    }

    pub fn with_defaults(support: Arc<dyn LanguageSupport>) -> Self {
        Self::new(support, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP)
    }

    /// Resolve every file in parallel. Files contribute their chunks in line
    /// order; no ordering is guaranteed across files.
    pub fn resolve_repository(&self, repo_name: &str, files: &[SourceFile]) -> Vec<Chunk> {
        files
            .par_iter()
            .flat_map_iter(|file| self.resolve_file(repo_name, file))
            .collect()
    }

    /// Resolve one file into its line-ordered chunk list.
    pub fn resolve_file(&self, repo_name: &str, file: &SourceFile) -> Vec<Chunk> {
        let lines: Vec<&str> = file.content.lines().collect();
        let total = lines.len();
        if total == 0 {
            return Vec::new();
        }

        let units = self.extract_units(file, total);
        let claimed: Vec<(usize, usize)> = units.iter().map(|u| (u.start_line, u.end_line)).collect();

        let mut pieces: Vec<Piece> = units
            .into_iter()
            .map(|u| Piece {
                start: u.start_line,
                end: u.end_line,
                kind: ChunkKind::SyntaxUnit,
                unit_type: Some(u.kind),
            })
            .collect();

        for run in uncovered_runs(total, &claimed) {
            for w in windows(run.line_count(), self.chunk_size, self.overlap) {
                pieces.push(Piece {
                    start: run.start + w.start,
                    end: run.start + w.end - 1,
                    kind: ChunkKind::FallbackWindow,
                    unit_type: None,
                });
            }
        }
        pieces.sort_by_key(|p| (p.start, p.end));

        let language = language_for_path(&file.path).map(str::to_string);
        pieces
            .into_iter()
            .enumerate()
            .map(|(ordinal, p)| Chunk {
                chunk_id: format!("{repo_name}:{}#{ordinal}", file.path),
                repo_name: repo_name.to_string(),
                file_path: file.path.clone(),
                content: lines[p.start..=p.end].join("\n"),
                start_line: p.start,
                end_line: p.end,
                kind: p.kind,
                unit_type: p.unit_type,
                language: language.clone(),
            })
            .collect()
    }

    /// Run the extractor, degrading to "nothing claimed" on failure.
    fn extract_units(&self, file: &SourceFile, total: usize) -> Vec<SyntaxUnit> {
        let ext = Path::new(&file.path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if !self.support.can_extract(ext) {
            return Vec::new();
        }

        match self.support.extract(ext, &file.content) {
            Ok(units) => sanitize_units(units, total),
            Err(e) => {
                warn!("syntax extraction failed for {}, windowing whole file: {e}", file.path);
                Vec::new()
            }
        }
    }
}

/// Clamp units into the file and keep them pairwise disjoint, whatever the
/// extractor returned.
fn sanitize_units(mut units: Vec<SyntaxUnit>, total: usize) -> Vec<SyntaxUnit> {
    units.retain(|u| u.start_line <= u.end_line && u.start_line < total);
    for u in &mut units {
        u.end_line = u.end_line.min(total - 1);
    }
    units.sort_by_key(|u| (u.start_line, u.end_line));

    let mut kept: Vec<SyntaxUnit> = Vec::with_capacity(units.len());
    for unit in units {
        if kept.last().is_some_and(|prev| unit.start_line <= prev.end_line) {
            debug!(
                "dropping overlapping {} unit at lines {}-{}",
                unit.kind, unit.start_line, unit.end_line
            );
            continue;
        }
        kept.push(unit);
    }
    kept
}
