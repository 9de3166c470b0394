//! Vector index backed by SQLite and sqlite-vec.
//!
//! One `repositories` row per fully built index, its chunks in `chunks`, and
//! one `vec_chunks` row (keyed by chunk rowid) per chunk that embedded.
use rusqlite::{Connection, OptionalExtension};
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;
use tracing::{info, warn};

use crate::error::{Error, Result};

pub mod models;
pub mod repos;
pub mod search;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    source TEXT NOT NULL,
    source_root TEXT NOT NULL,
    chunk_count INTEGER NOT NULL,
    indexed_count INTEGER NOT NULL,
    dimensions INTEGER NOT NULL,
    indexed_at DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL,
    chunk_id TEXT NOT NULL,
    file_path TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    kind TEXT NOT NULL,
    unit_type TEXT,
    language TEXT,
    content TEXT NOT NULL,
    FOREIGN KEY (repo_id) REFERENCES repositories(id) ON DELETE CASCADE,
    UNIQUE(repo_id, chunk_id)
);

CREATE INDEX IF NOT EXISTS idx_chunks_repo ON chunks(repo_id);
CREATE INDEX IF NOT EXISTS idx_chunks_location ON chunks(repo_id, file_path, start_line, end_line);
"#;

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// A SQLite connection with sqlite-vec loaded and the index schema in place.
pub struct Db {
    pub(crate) conn: Connection,
    dimensions: usize,
}

impl Db {
    /// Open (or create) the index at `path` for `dimensions`-wide vectors.
    pub fn open<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening vector index: {}", path.display());

        init_sqlite_vec();
        let conn = Connection::open(path)?;
        Self::init(conn, dimensions)
    }

    /// Open an in-memory index (useful for testing).
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        Self::init(conn, dimensions)
    }

    fn init(conn: Connection, dimensions: usize) -> Result<Self> {
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        info!("sqlite-vec version: {}", vec_version);

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        reconcile_vector_width(&conn, dimensions)?;
        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(embedding FLOAT[{dimensions}]);"
        ))?;

        let db = Self { conn, dimensions };
        db.check_existing_dimensions()?;
        Ok(db)
    }

    /// An index built with another model cannot be queried with this one.
    fn check_existing_dimensions(&self) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT dimensions FROM repositories")?;
        let stored = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        match stored.into_iter().find(|&d| d as usize != self.dimensions) {
            Some(actual) => Err(Error::Dimension {
                expected: self.dimensions,
                actual: actual as usize,
            }),
            None => Ok(()),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub(crate) fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() == self.dimensions {
            Ok(())
        } else {
            Err(Error::Dimension {
                expected: self.dimensions,
                actual: vector.len(),
            })
        }
    }
}

/// Width declared by an existing `vec_chunks` table, if there is one.
fn declared_vector_width(conn: &Connection) -> Result<Option<usize>> {
    let sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE name = 'vec_chunks'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(sql.and_then(|sql| {
        let (_, rest) = sql.split_once("FLOAT[")?;
        let (width, _) = rest.split_once(']')?;
        width.trim().parse().ok()
    }))
}

/// A `vec_chunks` table of another width is rebuilt while no repository
/// uses it; otherwise the mismatch is an error.
fn reconcile_vector_width(conn: &Connection, dimensions: usize) -> Result<()> {
    let Some(width) = declared_vector_width(conn)? else {
        return Ok(());
    };
    if width == dimensions {
        return Ok(());
    }

    let repositories: i64 = conn.query_row("SELECT count(*) FROM repositories", [], |row| row.get(0))?;
    if repositories > 0 {
        return Err(Error::Dimension {
            expected: dimensions,
            actual: width,
        });
    }
    warn!("Rebuilding empty vector table: {width} -> {dimensions} dimensions");
    conn.execute_batch("DROP TABLE vec_chunks; DELETE FROM chunks;")?;
    Ok(())
}

/// Helper to serialize a float32 vector into bytes for vec0 virtual table
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_init() {
        let db = Db::open_in_memory(8).expect("Failed to open in-memory DB");

        let tables: usize = db
            .conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN ('repositories', 'chunks', 'vec_chunks');",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(tables, 3);
        assert_eq!(db.dimensions(), 8);
    }

    #[test]
    fn test_reopen_with_other_dimensions_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        {
            let mut db = Db::open(&path, 4).unwrap();
            db.insert_repository(
                &repos::NewRepository {
                    name: "demo",
                    source: "/tmp/demo",
                    source_root: "/tmp/demo",
                },
                &[],
                &[],
            )
            .unwrap();
        }

        let result = Db::open(&path, 4);
        assert!(result.is_ok());
        let result = Db::open(&path, 8);
        assert!(matches!(
            result,
            Err(Error::Dimension {
                expected: 8,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_reopen_empty_index_with_other_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        {
            let db = Db::open(&path, 4).unwrap();
            assert_eq!(declared_vector_width(&db.conn).unwrap(), Some(4));
        }

        let mut db = Db::open(&path, 8).unwrap();
        assert_eq!(declared_vector_width(&db.conn).unwrap(), Some(8));
        let chunks = vec![repos::tests::chunk("demo", "a.rs", 0, 0, 9)];
        db.insert_repository(
            &repos::NewRepository {
                name: "demo",
                source: "/tmp/demo",
                source_root: "/tmp/demo",
            },
            &chunks,
            &[Some(vec![0.5; 8])],
        )
        .unwrap();
        assert_eq!(db.nearest("demo", &[0.5; 8], 0, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_serialize_vector() {
        let vec = vec![1.0, 2.0, -3.5];
        let bytes = serialize_vector(&vec);
        assert_eq!(bytes.len(), 12);

        // 1.0f32 in hex: 0x3f800000 -> little endian: 00 00 80 3f
        assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x80, 0x3f]);
        // -3.5f32 in hex: 0xc0600000 -> little endian: 00 00 60 c0
        assert_eq!(&bytes[8..12], &[0x00, 0x00, 0x60, 0xc0]);
    }
}
