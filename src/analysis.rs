//! The analysis pipeline: enumerate, diff, summarize, chunk, embed, index.
//!
//! One run processes only the files the change tracker reports as added or
//! modified, fully in parallel up to the configured limit. A file's
//! snapshot entry advances only after its whole pipeline succeeded, so a
//! failed file is retried on the next run while its neighbors stay
//! committed. The architecture document is re-synthesized at the end of
//! every run that changed anything; its failure never fails the run.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{info, warn};

use crate::chunker::chunk_artifact;
use crate::context::AppContext;
use crate::embedding::Embedder;
use crate::files::{enumerate_files, parse_dacignore, SourceFile};
use crate::models::{Artifact, ChangeSet, FileOutcome, FileStatus};
use crate::summarize::{
    repo_structure, summarize_file, summary_artifact_id, synthesize_architecture,
    ARCHITECTURE_ARTIFACT_ID,
};
use crate::tracker::fingerprint;

/// What one analysis run did.
#[derive(Debug, Default)]
pub struct AnalysisReport {
    /// Per-file outcomes for every added, modified, or removed path.
    pub outcomes: Vec<FileOutcome>,
    /// Files whose fingerprints matched the snapshot and were skipped.
    pub unchanged: usize,
    pub architecture_updated: bool,
}

impl AnalysisReport {
    pub fn indexed(&self) -> usize {
        self.count(FileStatus::Indexed)
    }
    pub fn failed(&self) -> usize {
        self.count(FileStatus::Failed)
    }
    pub fn removed(&self) -> usize {
        self.count(FileStatus::Removed)
    }
    fn count(&self, status: FileStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

/// Re-index everything, ignoring the snapshot.
pub async fn run_full_analysis(ctx: &AppContext) -> Result<AnalysisReport> {
    ctx.tracker().reset().await?;
    run_incremental_analysis(ctx).await
}

/// Index exactly the files the snapshot diff reports as changed.
pub async fn run_incremental_analysis(ctx: &AppContext) -> Result<AnalysisReport> {
    let ignore = parse_dacignore(&ctx.project_root)?;
    let files = enumerate_files(&ctx.project_root, &ignore)?;

    let mut current: BTreeMap<String, String> = BTreeMap::new();
    let mut contents: BTreeMap<String, String> = BTreeMap::new();
    for file in &files {
        let bytes = match std::fs::read(&file.abs_path) {
            Ok(bytes) => bytes,
            // Deleted between enumeration and read; next run sees it gone
            Err(e) => {
                warn!(path = %file.rel_path, error = %e, "skipping unreadable file");
                continue;
            }
        };
        current.insert(file.rel_path.clone(), fingerprint(&bytes));
        contents.insert(
            file.rel_path.clone(),
            String::from_utf8_lossy(&bytes).into_owned(),
        );
    }

    let tracker = ctx.tracker();
    let changes = match tracker.diff(&current).await {
        Ok(changes) => changes,
        Err(e) => {
            warn!(error = %e, "snapshot unusable; clearing and re-indexing everything");
            tracker.reset().await?;
            ChangeSet {
                added: current.keys().cloned().collect(),
                ..ChangeSet::default()
            }
        }
    };

    let to_process: Vec<String> = changes
        .added
        .iter()
        .chain(changes.modified.iter())
        .cloned()
        .collect();
    let unchanged = current.len() - to_process.len();

    if changes.is_empty() {
        info!(files = current.len(), "everything up to date");
        return Ok(AnalysisReport {
            unchanged,
            ..AnalysisReport::default()
        });
    }

    info!(
        added = changes.added.len(),
        modified = changes.modified.len(),
        removed = changes.removed.len(),
        unchanged,
        "starting analysis run"
    );

    let mut outcomes: Vec<FileOutcome> = stream::iter(to_process)
        .map(|path| {
            let content = contents.get(&path).cloned().unwrap_or_default();
            async move {
                match index_one_file(ctx, &path, &content).await {
                    Ok(chunks) => FileOutcome {
                        path,
                        status: FileStatus::Indexed,
                        chunks,
                        error: None,
                    },
                    Err(e) => {
                        warn!(path = %path, error = %e, "file failed; will retry next run");
                        FileOutcome {
                            path,
                            status: FileStatus::Failed,
                            chunks: 0,
                            error: Some(format!("{:#}", e)),
                        }
                    }
                }
            }
        })
        .buffer_unordered(ctx.config.analysis.parallelism)
        .collect()
        .await;

    // Advance the snapshot for exactly the files that made it all the way
    let survivors: Vec<(String, String)> = outcomes
        .iter()
        .filter(|o| o.status == FileStatus::Indexed)
        .filter_map(|o| current.get(&o.path).map(|fp| (o.path.clone(), fp.clone())))
        .collect();
    tracker.commit(&survivors).await?;

    for path in &changes.removed {
        remove_file_artifacts(ctx, path).await?;
        outcomes.push(FileOutcome {
            path: path.clone(),
            status: FileStatus::Removed,
            chunks: 0,
            error: None,
        });
    }
    tracker.remove(&changes.removed).await?;

    outcomes.sort_by(|a, b| a.path.cmp(&b.path));

    let architecture_updated = match refresh_architecture(ctx, &files).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "architecture synthesis failed; summaries remain queryable");
            false
        }
    };

    Ok(AnalysisReport {
        outcomes,
        unchanged,
        architecture_updated,
    })
}

/// Summarize, persist, chunk, embed, and index one source file.
async fn index_one_file(ctx: &AppContext, rel_path: &str, content: &str) -> Result<u64> {
    let artifact = summarize_file(ctx.generator.as_ref(), rel_path, content).await?;
    write_doc(&ctx.docs_dir(), rel_path, &artifact.body)?;
    index_artifact(ctx, &artifact).await
}

/// Chunk an artifact, embed its chunks, and replace it in the index.
async fn index_artifact(ctx: &AppContext, artifact: &Artifact) -> Result<u64> {
    let chunks = chunk_artifact(
        artifact,
        ctx.config.chunking.chunk_size,
        ctx.config.chunking.chunk_overlap,
    )?;
    let vectors = embed_chunks(
        ctx.embedder.as_ref(),
        &chunks,
        ctx.config.embedding.batch_size,
    )
    .await?;
    ctx.index
        .replace_artifact(artifact, &chunks, &vectors, ctx.embedder.model_name())
        .await?;
    Ok(chunks.len() as u64)
}

async fn embed_chunks(
    embedder: &dyn Embedder,
    chunks: &[crate::models::Chunk],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder.embed(&texts).await?;
        crate::embedding::ensure_dims(embedder.dims(), &embedded)?;
        vectors.extend(embedded);
    }
    Ok(vectors)
}

/// Drop a removed file's summary from the index and the docs directory.
async fn remove_file_artifacts(ctx: &AppContext, rel_path: &str) -> Result<()> {
    ctx.index
        .delete_artifact(&summary_artifact_id(rel_path))
        .await?;
    let doc = doc_path(&ctx.docs_dir(), rel_path);
    if doc.exists() {
        std::fs::remove_file(&doc)
            .with_context(|| format!("failed to remove {}", doc.display()))?;
    }
    Ok(())
}

/// Re-synthesize the architecture document from all stored summaries.
async fn refresh_architecture(ctx: &AppContext, files: &[SourceFile]) -> Result<()> {
    let summaries = ctx.index.artifacts_by_kind("summary").await?;
    let covered: BTreeSet<&str> = summaries
        .iter()
        .flat_map(|a| a.source_paths.iter().map(String::as_str))
        .collect();
    let missing: Vec<String> = files
        .iter()
        .filter(|f| !covered.contains(f.rel_path.as_str()))
        .map(|f| f.rel_path.clone())
        .collect();

    let structure = repo_structure(files);
    let artifact =
        synthesize_architecture(ctx.generator.as_ref(), &summaries, &structure, &missing).await?;

    write_doc(&ctx.docs_dir(), ARCHITECTURE_ARTIFACT_ID, &artifact.body)?;
    index_artifact(ctx, &artifact).await?;
    Ok(())
}

fn doc_path(docs_dir: &Path, rel_path: &str) -> std::path::PathBuf {
    docs_dir.join(format!("{}.md", rel_path))
}

fn write_doc(docs_dir: &Path, rel_path: &str, body: &str) -> Result<()> {
    let path = doc_path(docs_dir, rel_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))
}
