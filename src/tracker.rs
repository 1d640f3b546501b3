//! Change tracking against the persisted project snapshot.
//!
//! The snapshot maps each indexed file path to its content fingerprint.
//! Invariant: every path present was successfully indexed at the recorded
//! fingerprint, so [`ChangeTracker::commit`] must only be called for paths
//! whose whole downstream pipeline (summarize → chunk → embed → upsert)
//! succeeded. Failed paths stay un-committed and are reprocessed on the
//! next run.

use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use crate::error::TrackerError;
use crate::models::ChangeSet;

/// SHA-256 content fingerprint, lowercase hex.
pub fn fingerprint(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

pub struct ChangeTracker {
    pool: SqlitePool,
}

impl ChangeTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Compare current fingerprints against the stored snapshot.
    ///
    /// `added`: absent from the snapshot. `modified`: fingerprint differs.
    /// `removed`: in the snapshot but absent from `current`.
    pub async fn diff(
        &self,
        current: &BTreeMap<String, String>,
    ) -> Result<ChangeSet, TrackerError> {
        let snapshot = self.load_snapshot().await?;

        let mut changes = ChangeSet::default();
        for (path, fp) in current {
            match snapshot.get(path) {
                None => changes.added.push(path.clone()),
                Some(stored) if stored != fp => changes.modified.push(path.clone()),
                Some(_) => {}
            }
        }
        for path in snapshot.keys() {
            if !current.contains_key(path) {
                changes.removed.push(path.clone());
            }
        }
        Ok(changes)
    }

    /// Atomically advance the snapshot for exactly the given paths.
    pub async fn commit(&self, entries: &[(String, String)]) -> Result<(), TrackerError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(TrackerError::Unreadable)?;
        for (path, fp) in entries {
            sqlx::query(
                r#"
                INSERT INTO snapshot (path, fingerprint, indexed_at) VALUES (?, ?, ?)
                ON CONFLICT(path) DO UPDATE SET
                    fingerprint = excluded.fingerprint,
                    indexed_at = excluded.indexed_at
                "#,
            )
            .bind(path)
            .bind(fp)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(TrackerError::Unreadable)?;
        }
        tx.commit().await.map_err(TrackerError::Unreadable)
    }

    /// Forget the given paths (their files no longer exist).
    pub async fn remove(&self, paths: &[String]) -> Result<(), TrackerError> {
        let mut tx = self.pool.begin().await.map_err(TrackerError::Unreadable)?;
        for path in paths {
            sqlx::query("DELETE FROM snapshot WHERE path = ?")
                .bind(path)
                .execute(&mut *tx)
                .await
                .map_err(TrackerError::Unreadable)?;
        }
        tx.commit().await.map_err(TrackerError::Unreadable)
    }

    /// Clear the whole snapshot. Recovery path when the store is corrupt:
    /// the next diff treats every file as added.
    pub async fn reset(&self) -> Result<(), TrackerError> {
        sqlx::query("DELETE FROM snapshot")
            .execute(&self.pool)
            .await
            .map_err(TrackerError::Unreadable)?;
        Ok(())
    }

    async fn load_snapshot(&self) -> Result<BTreeMap<String, String>, TrackerError> {
        let rows = sqlx::query("SELECT path, fingerprint FROM snapshot")
            .fetch_all(&self.pool)
            .await
            .map_err(TrackerError::Unreadable)?;

        let mut snapshot = BTreeMap::new();
        for row in rows {
            let path: String = row.get("path");
            let fp: String = row.get("fingerprint");
            if fp.len() != 64 || !fp.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(TrackerError::Corrupt(format!(
                    "malformed fingerprint for {}",
                    path
                )));
            }
            snapshot.insert(path, fp);
        }
        Ok(snapshot)
    }
}
