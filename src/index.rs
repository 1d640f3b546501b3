//! Vector index over the SQLite context store.
//!
//! Stores artifacts, their chunks, and chunk embedding vectors. Upserts are
//! idempotent by chunk id: re-upserting an unchanged chunk is a no-op, and
//! a chunk id that existed under a stale artifact version is replaced.
//! When an artifact is regenerated with different chunk boundaries, the
//! chunk ids no longer produced are garbage-collected.

use serde_json::json;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::IndexError;
use crate::models::{Artifact, Chunk, QueryResult, ScoredChunk};

#[derive(Clone)]
pub struct VectorIndex {
    pool: SqlitePool,
}

impl VectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or update index entries. Skips writes for chunk ids whose
    /// stored text hash already matches, so re-indexing unchanged content
    /// touches nothing.
    pub async fn upsert(
        &self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        model: &str,
    ) -> Result<u64, IndexError> {
        debug_assert_eq!(chunks.len(), vectors.len());

        let mut written = 0u64;
        let mut tx = self.pool.begin().await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            let existing: Option<String> =
                sqlx::query_scalar("SELECT hash FROM chunks WHERE id = ?")
                    .bind(&chunk.id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if existing.as_deref() == Some(chunk.hash.as_str()) {
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO chunks (id, artifact_id, chunk_index, start_offset, end_offset, text, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    artifact_id = excluded.artifact_id,
                    chunk_index = excluded.chunk_index,
                    start_offset = excluded.start_offset,
                    end_offset = excluded.end_offset,
                    text = excluded.text,
                    hash = excluded.hash
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.artifact_id)
            .bind(chunk.chunk_index)
            .bind(chunk.start as i64)
            .bind(chunk.end as i64)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (chunk_id, artifact_id, model, dims, embedding)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    artifact_id = excluded.artifact_id,
                    model = excluded.model,
                    dims = excluded.dims,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.artifact_id)
            .bind(model)
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;

            written += 1;
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Remove entries whose chunk ids are no longer produced.
    pub async fn delete(&self, chunk_ids: &[String]) -> Result<u64, IndexError> {
        let mut deleted = 0u64;
        let mut tx = self.pool.begin().await?;
        for id in chunk_ids {
            sqlx::query("DELETE FROM chunk_vectors WHERE chunk_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            let result = sqlx::query("DELETE FROM chunks WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(deleted)
    }

    /// Chunk ids currently stored for an artifact, used to compute the
    /// stale set when the artifact is regenerated.
    pub async fn chunk_ids_for_artifact(&self, artifact_id: &str) -> Result<Vec<String>, IndexError> {
        let ids = sqlx::query_scalar("SELECT id FROM chunks WHERE artifact_id = ? ORDER BY id")
            .bind(artifact_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Store the artifact row itself (body + provenance).
    pub async fn store_artifact(&self, artifact: &Artifact) -> Result<(), IndexError> {
        let source_paths = json!(artifact.source_paths).to_string();
        sqlx::query(
            r#"
            INSERT INTO artifacts (id, kind, source_paths, body, generated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                source_paths = excluded.source_paths,
                body = excluded.body,
                generated_at = excluded.generated_at
            "#,
        )
        .bind(&artifact.id)
        .bind(artifact.kind.as_str())
        .bind(source_paths)
        .bind(&artifact.body)
        .bind(artifact.generated_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace an artifact wholesale: store the new body, upsert the new
    /// chunks, and garbage-collect chunk ids the new version no longer
    /// produces. One transaction per artifact keeps concurrent regeneration
    /// last-writer-wins.
    pub async fn replace_artifact(
        &self,
        artifact: &Artifact,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        model: &str,
    ) -> Result<u64, IndexError> {
        let old_ids = self.chunk_ids_for_artifact(&artifact.id).await?;
        let stale: Vec<String> = old_ids
            .into_iter()
            .filter(|id| !chunks.iter().any(|c| &c.id == id))
            .collect();

        self.store_artifact(artifact).await?;
        let written = self.upsert(chunks, vectors, model).await?;
        self.delete(&stale).await?;
        Ok(written)
    }

    /// Drop an artifact and everything indexed under it. Returns the
    /// removed chunk ids.
    pub async fn delete_artifact(&self, artifact_id: &str) -> Result<Vec<String>, IndexError> {
        let ids = self.chunk_ids_for_artifact(artifact_id).await?;
        self.delete(&ids).await?;
        sqlx::query("DELETE FROM artifacts WHERE id = ?")
            .bind(artifact_id)
            .execute(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Load all stored artifacts of one kind, ordered by id.
    pub async fn artifacts_by_kind(&self, kind: &str) -> Result<Vec<Artifact>, IndexError> {
        let rows = sqlx::query(
            "SELECT id, kind, source_paths, body, generated_at FROM artifacts WHERE kind = ? ORDER BY id",
        )
        .bind(kind)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_artifact).collect())
    }

    /// Nearest-neighbor search by cosine similarity.
    ///
    /// Returns up to `k` entries in non-increasing score order; ties break
    /// by lexicographic chunk id for reproducibility. An empty index yields
    /// an empty result, which is not an error.
    pub async fn search(&self, query_vec: &[f32], k: usize) -> Result<QueryResult, IndexError> {
        let rows = sqlx::query(
            r#"
            SELECT cv.chunk_id, cv.embedding, c.artifact_id, c.text, a.source_paths
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            JOIN artifacts a ON a.id = c.artifact_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut results: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                let artifact_id: String = row.get("artifact_id");
                let source_paths: String = row.get("source_paths");
                ScoredChunk {
                    chunk_id: row.get("chunk_id"),
                    source_paths: parse_source_paths(&artifact_id, &source_paths),
                    artifact_id,
                    text: row.get("text"),
                    score: cosine_similarity(query_vec, &vector),
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        results.truncate(k);
        Ok(results)
    }

    /// Number of indexed entries.
    pub async fn len(&self) -> Result<u64, IndexError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    pub async fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len().await? == 0)
    }
}

fn row_to_artifact(row: &sqlx::sqlite::SqliteRow) -> Artifact {
    let id: String = row.get("id");
    let kind: String = row.get("kind");
    let source_paths: String = row.get("source_paths");
    let generated_at: i64 = row.get("generated_at");
    Artifact {
        kind: crate::models::ArtifactKind::parse(&kind).unwrap_or(crate::models::ArtifactKind::Summary),
        source_paths: parse_source_paths(&id, &source_paths),
        id,
        body: row.get("body"),
        generated_at: chrono::DateTime::from_timestamp(generated_at, 0).unwrap_or_default(),
    }
}

/// Provenance is advisory; a malformed stored value must not fail a query,
/// but it should not go unnoticed either.
fn parse_source_paths(artifact_id: &str, raw: &str) -> Vec<String> {
    match serde_json::from_str(raw) {
        Ok(paths) => paths,
        Err(e) => {
            warn!(artifact_id, error = %e, "malformed source_paths in store; treating as empty");
            Vec::new()
        }
    }
}
