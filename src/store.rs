//! Per-repository chunk persistence and code retrieval.
//!
//! Each repository's chunk set is stored as a JSON array at
//! `{dir}/{repo}_chunks.json`. Lookups go through a [`ChunkCache`] keyed on
//! `(file_path, start_line, end_line)`; a miss falls back to reading the
//! lines straight from the source tree.
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::db::models::Chunk;
use crate::error::Result;

type LineKey = (String, usize, usize);

/// Chunk contents of one repository keyed by location.
#[derive(Debug, Default)]
pub struct ChunkLookup {
    by_location: HashMap<LineKey, String>,
}

impl ChunkLookup {
    fn from_chunks(chunks: Vec<Chunk>) -> Self {
        let by_location = chunks
            .into_iter()
            .map(|c| ((c.file_path, c.start_line, c.end_line), c.content))
            .collect();
        Self { by_location }
    }

    pub fn get(&self, file_path: &str, start_line: usize, end_line: usize) -> Option<&str> {
        self.by_location
            .get(&(file_path.to_string(), start_line, end_line))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_location.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_location.is_empty()
    }
}

/// Loaded chunk sets, one per repository.
///
/// Entries are only replaced through [`ChunkCache::invalidate`] or
/// [`ChunkCache::clear`]; ingestion invalidates the repository it rebuilt.
#[derive(Debug, Default)]
pub struct ChunkCache {
    entries: Mutex<HashMap<String, Arc<ChunkLookup>>>,
}

impl ChunkCache {
    pub fn get(&self, repo: &str) -> Option<Arc<ChunkLookup>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(repo).cloned()
    }

    fn insert(&self, repo: &str, lookup: ChunkLookup) -> Arc<ChunkLookup> {
        let lookup = Arc::new(lookup);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(repo.to_string(), Arc::clone(&lookup));
        lookup
    }

    pub fn invalidate(&self, repo: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(repo).is_some()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ChunkStore {
    dir: PathBuf,
    cache: ChunkCache,
}

impl ChunkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: ChunkCache::default(),
        }
    }

    pub fn cache(&self) -> &ChunkCache {
        &self.cache
    }

    pub fn path(&self, repo: &str) -> PathBuf {
        self.dir.join(format!("{repo}_chunks.json"))
    }

    /// Write the chunk set, replacing any previous one atomically.
    pub fn save(&self, repo: &str, chunks: &[Chunk]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(repo);
        let tmp = path.with_extension("json.tmp");

        let data = serde_json::to_vec_pretty(chunks)?;
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;

        debug!("Saved {} chunks to {}", chunks.len(), path.display());
        Ok(path)
    }

    pub fn load(&self, repo: &str) -> Result<Vec<Chunk>> {
        let data = fs::read(self.path(repo))?;
        Ok(serde_json::from_slice(&data)?)
    }

    fn lookup(&self, repo: &str) -> Option<Arc<ChunkLookup>> {
        if let Some(lookup) = self.cache.get(repo) {
            return Some(lookup);
        }
        match self.load(repo) {
            Ok(chunks) => Some(self.cache.insert(repo, ChunkLookup::from_chunks(chunks))),
            Err(e) => {
                warn!("Chunk store for {repo} unavailable: {e}");
                None
            }
        }
    }

    /// Source text of lines `start_line..=end_line` of `file_path`.
    ///
    /// Prefers the stored chunk with exactly that range, then the file under
    /// `source_root`. Returns an empty string when neither is available.
    pub fn fetch_code(
        &self,
        repo: &str,
        source_root: &Path,
        file_path: &str,
        start_line: usize,
        end_line: usize,
    ) -> String {
        if let Some(content) = self
            .lookup(repo)
            .and_then(|l| l.get(file_path, start_line, end_line).map(str::to_string))
        {
            return content;
        }

        match read_lines(&source_root.join(file_path), start_line, end_line) {
            Ok(content) => content,
            Err(e) => {
                warn!("Cannot read {file_path} lines {start_line}-{end_line} of {repo}: {e}");
                String::new()
            }
        }
    }
}

fn read_lines(path: &Path, start_line: usize, end_line: usize) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text
        .lines()
        .skip(start_line)
        .take(end_line.saturating_sub(start_line) + 1)
        .collect();
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ChunkKind;
    use tempfile::tempdir;

    fn chunk(file: &str, start: usize, end: usize, content: &str) -> Chunk {
        Chunk {
            chunk_id: format!("demo:{file}#{start}"),
            repo_name: "demo".to_string(),
            file_path: file.to_string(),
            content: content.to_string(),
            start_line: start,
            end_line: end,
            kind: ChunkKind::SyntaxUnit,
            unit_type: Some("function_definition".to_string()),
            language: Some("python".to_string()),
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path().join("chunks"));
        let chunks = vec![chunk("a.py", 0, 2, "def f():\n    pass\n")];

        let path = store.save("demo", &chunks).unwrap();
        assert!(path.ends_with("demo_chunks.json"));
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(store.load("demo").unwrap(), chunks);
    }

    #[test]
    fn test_fetch_code_exact_hit() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        store
            .save("demo", &[chunk("a.py", 3, 5, "stored text")])
            .unwrap();

        let code = store.fetch_code("demo", Path::new("/nonexistent"), "a.py", 3, 5);
        assert_eq!(code, "stored text");
        assert_eq!(store.cache().len(), 1);
    }

    #[test]
    fn test_fetch_code_falls_back_to_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("pkg")).unwrap();
        fs::write(src.join("pkg/m.py"), "l0\nl1\nl2\nl3\n").unwrap();

        let store = ChunkStore::new(dir.path().join("chunks"));
        store.save("demo", &[chunk("pkg/m.py", 0, 3, "all")]).unwrap();

        // Range drifted from what was stored.
        assert_eq!(store.fetch_code("demo", &src, "pkg/m.py", 1, 2), "l1\nl2");
    }

    #[test]
    fn test_fetch_code_missing_store_reads_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x.go"), "a\nb\n").unwrap();
        let store = ChunkStore::new(dir.path().join("chunks"));

        assert_eq!(store.fetch_code("ghost", dir.path(), "x.go", 1, 1), "b");
        assert!(store.cache().is_empty());
    }

    #[test]
    fn test_fetch_code_corrupt_store_and_missing_file() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        fs::write(store.path("demo"), "{not json").unwrap();

        assert_eq!(store.fetch_code("demo", dir.path(), "gone.rs", 0, 3), "");
    }

    #[test]
    fn test_invalidate_reloads_new_chunk_set() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        store.save("demo", &[chunk("a.py", 0, 1, "old")]).unwrap();
        assert_eq!(store.fetch_code("demo", dir.path(), "a.py", 0, 1), "old");

        store.save("demo", &[chunk("a.py", 0, 1, "new")]).unwrap();
        assert_eq!(store.fetch_code("demo", dir.path(), "a.py", 0, 1), "old");

        assert!(store.cache().invalidate("demo"));
        assert_eq!(store.fetch_code("demo", dir.path(), "a.py", 0, 1), "new");

        store.cache().clear();
        assert!(store.cache().is_empty());
    }
}
