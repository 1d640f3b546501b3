//! End-to-end pipeline tests with in-process fake providers.
//!
//! The generator echoes the source content it is asked to summarize and
//! the embedder is a deterministic bag-of-words hash, so runs are fully
//! reproducible without any network access.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use sourcedac::analysis::{run_full_analysis, run_incremental_analysis};
use sourcedac::config::Config;
use sourcedac::context::AppContext;
use sourcedac::db;
use sourcedac::embedding::Embedder;
use sourcedac::error::GenerationError;
use sourcedac::generation::TextGenerator;
use sourcedac::migrate::run_migrations;
use sourcedac::models::FileStatus;
use sourcedac::service::{answer_optimize, answer_query};

/// Echoes the file content back as its "summary"; fails permanently for
/// configured paths. Records every call for idempotence assertions.
struct ScriptedGenerator {
    fail_paths: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new() -> Self {
        Self::failing([])
    }

    fn failing<const N: usize>(paths: [&str; N]) -> Self {
        Self {
            fail_paths: paths.iter().map(|p| p.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.calls.lock().unwrap().push(prompt.to_string());

        let file = prompt
            .split("File: ")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .map(str::trim);
        match file {
            Some(path) => {
                if self.fail_paths.contains(path) {
                    return Err(GenerationError::Permanent(format!(
                        "content rejected for {}",
                        path
                    )));
                }
                let content = prompt.split("```").nth(1).unwrap_or("").trim();
                Ok(format!("Covers: {}", content))
            }
            None => Ok("High-level overview of the project.".to_string()),
        }
    }
}

/// Deterministic bag-of-words embedding: each word hashes into one of 16
/// buckets, so texts sharing words get similar vectors.
struct HashEmbedder;

fn bag_of_words(text: &str, dims: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dims];
    for word in text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for b in word.to_ascii_lowercase().bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x0000_0100_0000_01b3);
        }
        v[(h % dims as u64) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-test"
    }
    fn dims(&self) -> usize {
        16
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| bag_of_words(t, 16)).collect())
    }
}

async fn test_context(root: &Path, generator: Arc<dyn TextGenerator>) -> AppContext {
    let pool = db::connect(&root.join(".dac/index")).await.unwrap();
    run_migrations(&pool).await.unwrap();
    AppContext::with_providers(
        root.to_path_buf(),
        Config::default(),
        generator,
        Arc::new(HashEmbedder),
        pool,
    )
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

const FUNCTION_FILE: &str =
    "def parse_tokens(stream):\n    \"\"\"A function definition for parsing tokens.\"\"\"\n    return stream\n";
const CONFIG_FILE: &str = "DATABASE_URL = 'sqlite://store'\nTIMEOUT_SECONDS = 30\n";

#[tokio::test]
async fn first_run_indexes_everything_and_rerun_is_a_noop() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "a.py", FUNCTION_FILE);
    write(tmp.path(), "b.py", CONFIG_FILE);

    let generator = Arc::new(ScriptedGenerator::new());
    let ctx = test_context(tmp.path(), generator.clone()).await;

    let report = run_incremental_analysis(&ctx).await.unwrap();
    assert_eq!(report.indexed(), 2);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.unchanged, 0);
    assert!(report.architecture_updated);
    // Two summaries plus the architecture synthesis
    assert_eq!(generator.call_count(), 3);

    // Generated docs land under .dac/docs, mirroring the source layout
    assert!(tmp.path().join(".dac/docs/a.py.md").exists());
    assert!(tmp.path().join(".dac/docs/architecture.md").exists());

    let again = run_incremental_analysis(&ctx).await.unwrap();
    assert!(again.outcomes.is_empty());
    assert_eq!(again.unchanged, 2);
    assert_eq!(generator.call_count(), 3, "no-op run performs no generation");
}

#[tokio::test]
async fn only_changed_files_are_reprocessed() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "a.py", FUNCTION_FILE);
    write(tmp.path(), "b.py", CONFIG_FILE);

    let ctx = test_context(tmp.path(), Arc::new(ScriptedGenerator::new())).await;
    run_incremental_analysis(&ctx).await.unwrap();

    write(tmp.path(), "b.py", "RETRY_LIMIT = 5\n");
    let report = run_incremental_analysis(&ctx).await.unwrap();

    let processed: Vec<&str> = report
        .outcomes
        .iter()
        .filter(|o| o.status == FileStatus::Indexed)
        .map(|o| o.path.as_str())
        .collect();
    assert_eq!(processed, vec!["b.py"]);
    assert_eq!(report.unchanged, 1);
}

#[tokio::test]
async fn full_run_reprocesses_unchanged_files() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "a.py", FUNCTION_FILE);

    let generator = Arc::new(ScriptedGenerator::new());
    let ctx = test_context(tmp.path(), generator.clone()).await;

    run_incremental_analysis(&ctx).await.unwrap();
    let report = run_full_analysis(&ctx).await.unwrap();
    assert_eq!(report.indexed(), 1);
    assert_eq!(generator.call_count(), 4);
}

#[tokio::test]
async fn one_failing_file_does_not_block_the_rest() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "ok1.py", FUNCTION_FILE);
    write(tmp.path(), "bad.py", "whatever\n");
    write(tmp.path(), "ok2.py", CONFIG_FILE);

    let ctx = test_context(tmp.path(), Arc::new(ScriptedGenerator::failing(["bad.py"]))).await;
    let report = run_incremental_analysis(&ctx).await.unwrap();

    assert_eq!(report.indexed(), 2);
    assert_eq!(report.failed(), 1);
    let failed = report
        .outcomes
        .iter()
        .find(|o| o.status == FileStatus::Failed)
        .unwrap();
    assert_eq!(failed.path, "bad.py");
    assert!(failed.error.as_deref().unwrap().contains("bad.py"));

    // The failed file stays pending; the successes stay committed
    let retry = run_incremental_analysis(&ctx).await.unwrap();
    assert_eq!(retry.failed(), 1);
    assert_eq!(retry.unchanged, 2);

    // Architecture still synthesized, with the gap noted
    assert!(report.architecture_updated);
    let architecture =
        std::fs::read_to_string(tmp.path().join(".dac/docs/architecture.md")).unwrap();
    assert!(architecture.contains("`bad.py`"));
}

#[tokio::test]
async fn removed_files_are_garbage_collected() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "a.py", FUNCTION_FILE);
    write(tmp.path(), "b.py", CONFIG_FILE);

    let ctx = test_context(tmp.path(), Arc::new(ScriptedGenerator::new())).await;
    run_incremental_analysis(&ctx).await.unwrap();

    std::fs::remove_file(tmp.path().join("b.py")).unwrap();
    let report = run_incremental_analysis(&ctx).await.unwrap();
    assert_eq!(report.removed(), 1);

    assert!(!tmp.path().join(".dac/docs/b.py.md").exists());
    let hits = answer_query(&ctx, "DATABASE_URL TIMEOUT_SECONDS", Some(10))
        .await
        .unwrap();
    assert!(
        hits.iter().all(|h| h.artifact_id != "doc:b.py"),
        "no chunks left for the removed file"
    );
}

#[tokio::test]
async fn query_ranks_the_matching_file_first() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "a.py", FUNCTION_FILE);
    write(tmp.path(), "b.py", CONFIG_FILE);

    let ctx = test_context(tmp.path(), Arc::new(ScriptedGenerator::new())).await;
    run_incremental_analysis(&ctx).await.unwrap();

    let hits = answer_query(&ctx, "function definition", Some(1))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source_paths, vec!["a.py"]);
    assert!(hits[0].score > 0.0);
}

#[tokio::test]
async fn query_on_empty_index_returns_no_hits() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = test_context(tmp.path(), Arc::new(ScriptedGenerator::new())).await;
    let hits = answer_query(&ctx, "anything", None).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn optimize_respects_the_context_budget() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "a.py", FUNCTION_FILE);
    write(tmp.path(), "b.py", CONFIG_FILE);

    let ctx = test_context(tmp.path(), Arc::new(ScriptedGenerator::new())).await;
    run_incremental_analysis(&ctx).await.unwrap();

    let enriched = answer_optimize(&ctx, "refactor the token parsing function")
        .await
        .unwrap();
    assert!(!enriched.truncated);
    assert!(!enriched.context.is_empty());
    assert!(enriched.prompt.contains("refactor the token parsing function"));
    assert!(enriched.prompt.len() <= ctx.config.retrieval.context_budget);

    // A tiny budget drops all context but never the instruction
    let mut tight = test_context(tmp.path(), Arc::new(ScriptedGenerator::new())).await;
    tight.config.retrieval.context_budget = 60;
    let enriched = answer_optimize(&tight, "refactor the token parsing function")
        .await
        .unwrap();
    assert!(enriched.truncated);
    assert!(enriched.prompt.contains("refactor the token parsing function"));
}
