use super::{Db, models::SearchCandidate, serialize_vector};
use crate::error::Result;
use crate::search::planner::NearestNeighbors;
use rusqlite::params;

fn map_candidate_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchCandidate> {
    let distance: f64 = row.get(6)?;

    Ok(SearchCandidate {
        chunk_id: row.get(0)?,
        file_path: row.get(1)?,
        start_line: row.get::<_, i64>(2)? as usize,
        end_line: row.get::<_, i64>(3)? as usize,
        language: row.get(4)?,
        content: row.get(5)?,
        similarity: (1.0 - distance) as f32,
        rerank_score: None,
    })
}

impl Db {
    /// One page of a repository's chunks ordered by cosine distance to
    /// `query_vector` (nearest first, ties by insertion order).
    pub fn nearest(
        &self,
        repo_name: &str,
        query_vector: &[f32],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SearchCandidate>> {
        self.check_vector(query_vector)?;

        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT
                c.chunk_id,
                c.file_path,
                c.start_line,
                c.end_line,
                c.language,
                c.content,
                vec_distance_cosine(v.embedding, ?) AS distance
            FROM vec_chunks v
            JOIN chunks c ON v.rowid = c.id
            JOIN repositories r ON c.repo_id = r.id
            WHERE r.name = ?
            ORDER BY distance ASC, c.id ASC
            LIMIT ? OFFSET ?
            "#,
        )?;

        let rows = stmt.query_map(
            params![
                serialize_vector(query_vector),
                repo_name,
                i64::try_from(limit).unwrap_or(i64::MAX),
                i64::try_from(offset).unwrap_or(i64::MAX)
            ],
            map_candidate_row,
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

/// The nearest-neighbour oracle for one indexed repository.
pub struct RepositoryIndex<'a> {
    db: &'a Db,
    repo_name: &'a str,
}

impl<'a> RepositoryIndex<'a> {
    pub fn new(db: &'a Db, repo_name: &'a str) -> Self {
        Self { db, repo_name }
    }
}

impl NearestNeighbors for RepositoryIndex<'_> {
    fn nearest(&self, query: &[f32], offset: usize, limit: usize) -> Result<Vec<SearchCandidate>> {
        self.db.nearest(self.repo_name, query, offset, limit)
    }
}
