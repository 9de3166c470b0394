use super::{Db, models::*, serialize_vector};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

/// Identity of a repository about to be indexed.
#[derive(Debug, Clone, Copy)]
pub struct NewRepository<'a> {
    pub name: &'a str,
    pub source: &'a str,
    pub source_root: &'a str,
}

fn map_repository_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RepositoryInfo> {
    Ok(RepositoryInfo {
        name: row.get(0)?,
        source: row.get(1)?,
        source_root: row.get(2)?,
        chunk_count: row.get::<_, i64>(3)? as usize,
        indexed_count: row.get::<_, i64>(4)? as usize,
        dimensions: row.get::<_, i64>(5)? as usize,
        indexed_at: row.get::<_, DateTime<Utc>>(6)?,
    })
}

const REPOSITORY_COLUMNS: &str =
    "name, source, source_root, chunk_count, indexed_count, dimensions, indexed_at";

impl Db {
    /// Build the index for one repository in a single transaction.
    ///
    /// `embeddings[i]` belongs to `chunks[i]`; chunks whose slot is `None`
    /// are stored but not searchable. Nothing is visible to readers until
    /// the commit, and any error rolls the whole build back.
    pub fn insert_repository(
        &mut self,
        repo: &NewRepository<'_>,
        chunks: &[Chunk],
        embeddings: &[Option<Vec<f32>>],
    ) -> Result<RepositoryInfo> {
        if chunks.len() != embeddings.len() {
            return Err(Error::EmbeddingCount {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }
        for vector in embeddings.iter().flatten() {
            self.check_vector(vector)?;
        }

        let indexed_count = embeddings.iter().filter(|e| e.is_some()).count();
        let indexed_at = Utc::now();
        let dimensions = self.dimensions;

        let tx = self.conn.transaction()?;

        let repo_id: i64 = tx.query_row(
            r#"
            INSERT INTO repositories
                (name, source, source_root, chunk_count, indexed_count, dimensions, indexed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
            params![
                repo.name,
                repo.source,
                repo.source_root,
                chunks.len() as i64,
                indexed_count as i64,
                dimensions as i64,
                indexed_at
            ],
            |row| row.get(0),
        )?;

        {
            let mut insert_chunk = tx.prepare(
                r#"
                INSERT INTO chunks
                    (repo_id, chunk_id, file_path, start_line, end_line, kind, unit_type, language, content)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;
            let mut insert_vector =
                tx.prepare("INSERT INTO vec_chunks (rowid, embedding) VALUES (?, ?)")?;

            for (chunk, embedding) in chunks.iter().zip(embeddings) {
                insert_chunk.execute(params![
                    repo_id,
                    chunk.chunk_id,
                    chunk.file_path,
                    chunk.start_line as i64,
                    chunk.end_line as i64,
                    chunk.kind.as_str(),
                    chunk.unit_type,
                    chunk.language,
                    chunk.content,
                ])?;
                let row_id = tx.last_insert_rowid();

                if let Some(vector) = embedding {
                    insert_vector.execute(params![row_id, serialize_vector(vector)])?;
                }
            }
        }

        tx.commit()?;

        Ok(RepositoryInfo {
            name: repo.name.to_string(),
            source: repo.source.to_string(),
            source_root: repo.source_root.to_string(),
            chunk_count: chunks.len(),
            indexed_count,
            dimensions,
            indexed_at,
        })
    }

    /// Look up a repository by its derived name.
    pub fn repository(&self, name: &str) -> Result<Option<RepositoryInfo>> {
        let info = self
            .conn
            .query_row(
                &format!("SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE name = ?"),
                params![name],
                map_repository_row,
            )
            .optional()?;
        Ok(info)
    }

    /// All repositories with a built index, by name.
    pub fn list_repositories(&self) -> Result<Vec<RepositoryInfo>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REPOSITORY_COLUMNS} FROM repositories ORDER BY name"
        ))?;
        let repos = stmt
            .query_map([], map_repository_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(repos)
    }

    /// Drop a repository's index. Returns whether it existed.
    pub fn delete_repository(&mut self, name: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;

        let repo_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM repositories WHERE name = ?",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        let Some(repo_id) = repo_id else {
            return Ok(false);
        };

        // vec0 tables do not take part in foreign-key cascades.
        tx.execute(
            "DELETE FROM vec_chunks WHERE rowid IN (SELECT id FROM chunks WHERE repo_id = ?)",
            params![repo_id],
        )?;
        tx.execute("DELETE FROM repositories WHERE id = ?", params![repo_id])?;
        tx.commit()?;
        Ok(true)
    }
}
