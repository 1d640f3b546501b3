use anyhow::Result;
use sqlx::SqlitePool;

/// Create the context-store schema. Idempotent — `dac init` may run any
/// number of times.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Generated markdown documents
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artifacts (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            source_paths TEXT NOT NULL DEFAULT '[]',
            body TEXT NOT NULL,
            generated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Retrieval-sized slices of artifact bodies
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            artifact_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            FOREIGN KEY (artifact_id) REFERENCES artifacts(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Embedding vectors, one per chunk
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            artifact_id TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Change-tracker snapshot: every path present was successfully indexed
    // at the recorded fingerprint
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snapshot (
            path TEXT PRIMARY KEY,
            fingerprint TEXT NOT NULL,
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_artifact_id ON chunks(artifact_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunk_vectors_artifact_id ON chunk_vectors(artifact_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
