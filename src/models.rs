//! Core data types shared across the analysis and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// What kind of generated document an [`Artifact`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Per-source-file markdown summary.
    Summary,
    /// Top-down architecture document synthesized from all summaries.
    Architecture,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Summary => "summary",
            ArtifactKind::Architecture => "architecture",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "summary" => Some(ArtifactKind::Summary),
            "architecture" => Some(ArtifactKind::Architecture),
            _ => None,
        }
    }
}

/// A generated markdown document. Immutable once written; regenerated
/// wholesale when its source files change.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Stable identifier: `doc:<relative path>` for summaries,
    /// `architecture` for the synthesized document.
    pub id: String,
    pub kind: ArtifactKind,
    /// Relative paths of the source files this document was derived from.
    pub source_paths: Vec<String>,
    pub body: String,
    pub generated_at: DateTime<Utc>,
}

/// A contiguous slice of an artifact's body text.
///
/// The id is derived from (artifact id, byte offset range), so identical
/// artifact content and chunking parameters always produce identical ids.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub artifact_id: String,
    pub chunk_index: i64,
    /// Byte offset range within the artifact body.
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// SHA-256 of the chunk text, for staleness detection on upsert.
    pub hash: String,
}

/// Result of diffing current file fingerprints against the stored snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// A single search hit: chunk plus relevance score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub artifact_id: String,
    /// Source files behind the chunk's artifact.
    pub source_paths: Vec<String>,
    pub text: String,
    pub score: f32,
}

/// Ordered search results, descending by score, length ≤ k.
pub type QueryResult = Vec<ScoredChunk>;

/// An instruction enriched with retrieved context, ready to hand to a
/// downstream model.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedInstruction {
    pub instruction: String,
    /// The chunks that made it into the payload, highest relevance first.
    pub context: Vec<ScoredChunk>,
    /// Fully rendered payload text.
    pub prompt: String,
    /// True if low-relevance chunks were dropped to fit the size budget.
    pub truncated: bool,
}

/// Outcome of processing one source file during an analysis run.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub path: String,
    pub status: FileStatus,
    pub chunks: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Indexed,
    Removed,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Indexed => "indexed",
            FileStatus::Removed => "removed",
            FileStatus::Failed => "failed",
        }
    }
}
