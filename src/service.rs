//! Retrieval operations: semantic query and instruction enrichment.

use anyhow::Result;
use tracing::debug;

use crate::context::AppContext;
use crate::embedding::embed_query;
use crate::models::{EnrichedInstruction, QueryResult, ScoredChunk};

/// Embed the query text and return the `k` most similar chunks.
///
/// An empty index yields an empty result. `k` falls back to the configured
/// retrieval default.
pub async fn answer_query(ctx: &AppContext, text: &str, k: Option<usize>) -> Result<QueryResult> {
    let k = k.unwrap_or(ctx.config.retrieval.k);
    let query_vec = embed_query(ctx.embedder.as_ref(), text).await?;
    let results = ctx.index.search(&query_vec, k).await?;
    debug!(k, hits = results.len(), "query answered");
    Ok(results)
}

/// Enrich an instruction with retrieved context, honoring the configured
/// payload size budget.
///
/// Chunks are retrieved at the default `k`, then dropped lowest-relevance
/// first until the rendered payload fits the budget. The instruction itself
/// is never truncated.
pub async fn answer_optimize(ctx: &AppContext, instruction: &str) -> Result<EnrichedInstruction> {
    let mut context = answer_query(ctx, instruction, None).await?;
    let budget = ctx.config.retrieval.context_budget;

    let mut prompt = render_prompt(instruction, &context);
    let mut truncated = false;
    while prompt.len() > budget && !context.is_empty() {
        context.pop();
        truncated = true;
        prompt = render_prompt(instruction, &context);
    }

    Ok(EnrichedInstruction {
        instruction: instruction.to_string(),
        context,
        prompt,
        truncated,
    })
}

fn render_prompt(instruction: &str, context: &[ScoredChunk]) -> String {
    let mut out = String::new();
    if !context.is_empty() {
        out.push_str("## Project context\n");
        for chunk in context {
            out.push_str("\n---\n");
            if !chunk.source_paths.is_empty() {
                out.push_str(&format!("Source: {}\n\n", chunk.source_paths.join(", ")));
            }
            out.push_str(&chunk.text);
            out.push('\n');
        }
        out.push_str("\n---\n\n");
    }
    out.push_str("## Instruction\n\n");
    out.push_str(instruction);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk_id: id.to_string(),
            artifact_id: "doc:a.py".to_string(),
            source_paths: vec!["a.py".to_string()],
            text: text.to_string(),
            score,
        }
    }

    #[test]
    fn prompt_contains_context_then_instruction() {
        let prompt = render_prompt("do the thing", &[chunk("c1", "some context", 0.9)]);
        let ctx_pos = prompt.find("some context").unwrap();
        let inst_pos = prompt.find("do the thing").unwrap();
        assert!(ctx_pos < inst_pos);
        assert!(prompt.contains("Source: a.py"));
    }

    #[test]
    fn prompt_without_context_is_just_the_instruction() {
        let prompt = render_prompt("do the thing", &[]);
        assert!(!prompt.contains("Project context"));
        assert!(prompt.ends_with("do the thing"));
    }
}
