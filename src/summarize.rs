//! Summary and architecture artifact generation.
//!
//! Per-file summaries and the synthesized architecture document are
//! [`Artifact`]s: markdown with a fixed structural skeleton (title,
//! provenance line, generated body), so downstream chunking always sees
//! well-formed markdown even though the generated prose varies.

use chrono::Utc;

use crate::error::GenerationError;
use crate::files::SourceFile;
use crate::generation::TextGenerator;
use crate::models::{Artifact, ArtifactKind};

/// Stable artifact id for a source file's summary.
pub fn summary_artifact_id(rel_path: &str) -> String {
    format!("doc:{}", rel_path)
}

/// Stable artifact id for the synthesized architecture document.
pub const ARCHITECTURE_ARTIFACT_ID: &str = "architecture";

/// Summarize one source file into a markdown artifact.
///
/// The generation call may fail transiently (retried inside the generator)
/// or permanently; either way the error is per-file and must not abort the
/// batch — the caller records it and moves on.
pub async fn summarize_file(
    generator: &dyn TextGenerator,
    rel_path: &str,
    content: &str,
) -> Result<Artifact, GenerationError> {
    let prompt = format!(
        "Summarize the following source file for a developer-facing \
         documentation store. Describe its purpose, the key functions, \
         classes, or types it defines, and how it relates to the rest of \
         the project. Answer in concise markdown prose without a top-level \
         heading.\n\nFile: {}\n\n```\n{}\n```\n",
        rel_path, content
    );

    let summary = generator.generate(&prompt).await?;

    let body = format!(
        "# {}\n\n> Generated summary of `{}`.\n\n{}\n",
        rel_path,
        rel_path,
        summary.trim()
    );

    Ok(Artifact {
        id: summary_artifact_id(rel_path),
        kind: ArtifactKind::Summary,
        source_paths: vec![rel_path.to_string()],
        body,
        generated_at: Utc::now(),
    })
}

/// Render the repository structure metadata fed to the synthesizer: an
/// indented directory-tree listing of the enumerated files.
pub fn repo_structure(files: &[SourceFile]) -> String {
    let mut out = String::new();
    let mut last_dirs: Vec<String> = Vec::new();

    for file in files {
        let mut parts: Vec<&str> = file.rel_path.split('/').collect();
        let name = parts.pop().unwrap_or("");

        let dirs: Vec<String> = parts.iter().map(|s| s.to_string()).collect();
        let mut shared = 0;
        while shared < dirs.len() && shared < last_dirs.len() && dirs[shared] == last_dirs[shared] {
            shared += 1;
        }
        for (depth, dir) in dirs.iter().enumerate().skip(shared) {
            out.push_str(&"  ".repeat(depth));
            out.push_str(dir);
            out.push_str("/\n");
        }
        out.push_str(&"  ".repeat(dirs.len()));
        out.push_str(name);
        out.push('\n');
        last_dirs = dirs;
    }
    out
}

/// Combine per-file summaries into a single top-down architecture artifact.
///
/// Tolerates an empty or partial summary set: files that have no summary
/// (e.g. their generation failed) are listed in a coverage note instead of
/// failing the synthesis.
pub async fn synthesize_architecture(
    generator: &dyn TextGenerator,
    summaries: &[Artifact],
    structure: &str,
    missing: &[String],
) -> Result<Artifact, GenerationError> {
    let mut prompt = String::from(
        "You are producing a top-down architecture overview of a software \
         project from its per-file summaries. Describe the major components, \
         how they interact, and the overall data flow. Answer in markdown \
         prose without a top-level heading.\n\n## Directory structure\n\n",
    );
    prompt.push_str(structure);

    if summaries.is_empty() {
        prompt.push_str("\n\nNo per-file summaries are available yet; describe what can be inferred from the structure alone.\n");
    } else {
        prompt.push_str("\n\n## File summaries\n");
        for artifact in summaries {
            prompt.push_str("\n---\n\n");
            prompt.push_str(&artifact.body);
        }
    }

    let overview = generator.generate(&prompt).await?;

    let mut body = format!("# Architecture\n\n{}\n", overview.trim());
    if !missing.is_empty() {
        body.push_str("\n## Coverage notes\n\nNo summary was available for:\n\n");
        for path in missing {
            body.push_str(&format!("- `{}`\n", path));
        }
    }

    let mut source_paths: Vec<String> = summaries
        .iter()
        .flat_map(|a| a.source_paths.iter().cloned())
        .collect();
    source_paths.sort();
    source_paths.dedup();

    Ok(Artifact {
        id: ARCHITECTURE_ARTIFACT_ID.to_string(),
        kind: ArtifactKind::Architecture,
        source_paths,
        body,
        generated_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct EchoGenerator;

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Ok("Generated prose.".to_string())
        }
    }

    fn source(rel: &str) -> SourceFile {
        SourceFile {
            rel_path: rel.to_string(),
            abs_path: PathBuf::from(rel),
        }
    }

    #[tokio::test]
    async fn summary_has_stable_markdown_skeleton() {
        let artifact = summarize_file(&EchoGenerator, "src/app.py", "print('hi')")
            .await
            .unwrap();
        assert_eq!(artifact.id, "doc:src/app.py");
        assert_eq!(artifact.kind, ArtifactKind::Summary);
        assert!(artifact.body.starts_with("# src/app.py\n"));
        assert!(artifact.body.contains("Generated prose."));
        assert!(artifact.body.ends_with('\n'));
    }

    #[test]
    fn structure_renders_nested_tree() {
        let files = vec![
            source("README.md"),
            source("src/app.py"),
            source("src/util/io.py"),
        ];
        let tree = repo_structure(&files);
        assert_eq!(tree, "README.md\nsrc/\n  app.py\n  util/\n    io.py\n");
    }

    #[tokio::test]
    async fn synthesis_notes_missing_summaries() {
        let summary = summarize_file(&EchoGenerator, "a.py", "x = 1").await.unwrap();
        let artifact = synthesize_architecture(
            &EchoGenerator,
            &[summary],
            "a.py\nb.py\n",
            &["b.py".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(artifact.id, ARCHITECTURE_ARTIFACT_ID);
        assert!(artifact.body.contains("## Coverage notes"));
        assert!(artifact.body.contains("`b.py`"));
        assert_eq!(artifact.source_paths, vec!["a.py"]);
    }

    #[tokio::test]
    async fn synthesis_tolerates_empty_set() {
        let artifact = synthesize_architecture(&EchoGenerator, &[], "", &[])
            .await
            .unwrap();
        assert!(artifact.body.starts_with("# Architecture\n"));
        assert!(artifact.source_paths.is_empty());
    }
}
