//! Error taxonomy.
//!
//! Failures fall into a small set of categories with distinct recovery
//! policies:
//!
//! | Error | Recovery |
//! |-------|----------|
//! | [`ConfigError`] | Abort before any core operation runs |
//! | [`TrackerError`] | Full re-index (treat every file as added) |
//! | [`GenerationError`] | Transient → retried with backoff; permanent → reported per file |
//! | [`IndexError::Unavailable`] | Fatal for the current operation, not the process |
//! | [`ChunkingError`] | Should not occur for well-formed markdown; a defect if it does |

use thiserror::Error;

/// Configuration could not be loaded or failed validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// The snapshot store backing the change tracker is corrupt or unreadable.
///
/// Callers recover by clearing the snapshot and treating every current
/// file as added.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("snapshot store unreadable: {0}")]
    Unreadable(#[source] sqlx::Error),
    #[error("snapshot store corrupt: {0}")]
    Corrupt(String),
}

/// A call to the external text-generation capability failed.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Rate limit, timeout, or server-side error. Retried with backoff;
    /// surfaces only once the attempt budget is exhausted.
    #[error("generation failed (transient): {0}")]
    Transient(String),
    /// Rejected input or client-side error. Never retried.
    #[error("generation failed (permanent): {0}")]
    Permanent(String),
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GenerationError::Transient(_))
    }
}

/// The vector index store could not be used.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The backing store could not be opened. Distinct from an empty
    /// result set, which is a valid non-error outcome.
    #[error("index unavailable: {0}")]
    Unavailable(String),
    #[error("index query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// Chunking parameters or input violated the chunker's contract.
#[derive(Debug, Error)]
#[error("chunking failed for artifact {artifact_id}: {message}")]
pub struct ChunkingError {
    pub artifact_id: String,
    pub message: String,
}
