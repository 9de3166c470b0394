use std::collections::HashSet;
use std::fs;
use std::path::Path;

use ignore::WalkBuilder;
use tracing::{debug, warn};

use super::resolver::SourceFile;

/// Collect indexable files under `root`, sorted by relative path.
///
/// Honors `.gitignore`, skips any directory whose name is in
/// `ignored_dirs`, and keeps only files whose (case-insensitive) extension is
/// in `extensions`. Invalid UTF-8 is replaced rather than rejected;
/// unreadable files are skipped with a warning.
pub fn collect_source_files(
    root: &Path,
    extensions: &[String],
    ignored_dirs: &[String],
) -> Vec<SourceFile> {
    let allowed: HashSet<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();
    let ignored: HashSet<String> = ignored_dirs.iter().cloned().collect();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .require_git(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && entry.depth() > 0 && ignored.contains(entry.file_name().to_string_lossy().as_ref()))
        })
        .build();

    let mut files = Vec::new();
    for entry in walker.into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !allowed.contains(&ext) {
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        match fs::read(path) {
            Ok(bytes) => files.push(SourceFile {
                path: relative,
                content: String::from_utf8_lossy(&bytes).into_owned(),
            }),
            Err(e) => warn!("skipping unreadable file {}: {e}", path.display()),
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("collected {} files under {}", files.len(), root.display());
    files
}
