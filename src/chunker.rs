//! Markdown-aware text chunker.
//!
//! Splits an artifact body into retrieval-sized chunks, preferring heading
//! and paragraph boundaries over hard byte cuts, with a configurable
//! overlap carried between consecutive chunks.
//!
//! Every chunk is a contiguous slice of the artifact body. Chunk ids are
//! SHA-256 digests of (artifact id, byte offset range), so identical
//! (content, size, overlap) inputs always produce identical chunk
//! sequences — the property that makes re-indexing an idempotent upsert.

use sha2::{Digest, Sha256};

use crate::error::ChunkingError;
use crate::models::{Artifact, Chunk};

/// Split an artifact body into chunks of at most `max_size` bytes with
/// `overlap` bytes of context carried from the previous chunk.
pub fn chunk_artifact(
    artifact: &Artifact,
    max_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ChunkingError> {
    if max_size == 0 {
        return Err(ChunkingError {
            artifact_id: artifact.id.clone(),
            message: "max chunk size must be > 0".to_string(),
        });
    }
    if overlap >= max_size {
        return Err(ChunkingError {
            artifact_id: artifact.id.clone(),
            message: format!("overlap {} must be smaller than max size {}", overlap, max_size),
        });
    }

    let text = artifact.body.as_str();
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut spans: Vec<(usize, usize)> = Vec::new();
    // Open chunk span, if any
    let mut current: Option<(usize, usize)> = None;
    // Start of the most recently opened span, to guarantee forward progress
    // when backing up for overlap
    let mut prev_start = 0usize;

    for (bs, be) in block_ranges(text) {
        match current {
            Some((cs, _)) if be - cs <= max_size => {
                current = Some((cs, be));
            }
            _ => {
                if let Some(span) = current.take() {
                    spans.push(span);
                    prev_start = span.0;
                }
                let mut s = overlap_start(text, bs, prev_start, overlap);
                // A single block larger than max_size gets hard cuts,
                // preferring newline then space boundaries
                while be - s > max_size {
                    let cut = find_cut(text, s, s + max_size);
                    spans.push((s, cut));
                    prev_start = s;
                    s = overlap_start(text, cut, prev_start, overlap);
                }
                current = Some((s, be));
            }
        }
    }
    if let Some(span) = current {
        spans.push(span);
    }

    Ok(spans
        .into_iter()
        .enumerate()
        .map(|(i, (start, end))| make_chunk(&artifact.id, i as i64, start, end, &text[start..end]))
        .collect())
}

/// Byte ranges of content blocks: paragraphs delimited by blank lines,
/// with markdown headings always starting a new block.
fn block_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut blocks = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let content = line.trim_end_matches(['\n', '\r']);

        if content.trim().is_empty() {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            continue;
        }

        let end = start + content.len();
        if content.trim_start().starts_with('#') {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            current = Some((start, end));
        } else {
            match &mut current {
                Some(block) => block.1 = end,
                None => current = Some((start, end)),
            }
        }
    }
    if let Some(block) = current {
        blocks.push(block);
    }
    blocks
}

/// Where the next chunk should start so that up to `overlap` bytes of the
/// preceding text are repeated. Prefers resuming at a line start inside the
/// overlap window and never reaches back to (or before) the previous
/// chunk's start.
fn overlap_start(text: &str, boundary: usize, prev_start: usize, overlap: usize) -> usize {
    if overlap == 0 || boundary == 0 {
        return boundary;
    }
    let mut s = boundary.saturating_sub(overlap);
    if s <= prev_start {
        s = (prev_start + 1).min(boundary);
    }
    while s < boundary && !text.is_char_boundary(s) {
        s += 1;
    }
    if let Some(pos) = text[s..boundary].find('\n') {
        s = s + pos + 1;
    }
    s
}

/// Hard-cut position in `(from, limit]`, aligned to a char boundary and
/// preferring newline then space boundaries.
fn find_cut(text: &str, from: usize, limit: usize) -> usize {
    let mut cut = limit.min(text.len());
    while cut > from && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    if let Some(pos) = text[from..cut]
        .rfind('\n')
        .or_else(|| text[from..cut].rfind(' '))
    {
        if pos > 0 {
            cut = from + pos + 1;
        }
    }
    if cut <= from {
        cut = from + 1;
        while cut < text.len() && !text.is_char_boundary(cut) {
            cut += 1;
        }
    }
    cut
}

fn make_chunk(artifact_id: &str, index: i64, start: usize, end: usize, text: &str) -> Chunk {
    let mut id_hasher = Sha256::new();
    id_hasher.update(artifact_id.as_bytes());
    id_hasher.update([0]);
    id_hasher.update(start.to_le_bytes());
    id_hasher.update(end.to_le_bytes());
    let id = format!("{:x}", id_hasher.finalize());

    let mut text_hasher = Sha256::new();
    text_hasher.update(text.as_bytes());
    let hash = format!("{:x}", text_hasher.finalize());

    Chunk {
        id,
        artifact_id: artifact_id.to_string(),
        chunk_index: index,
        start,
        end,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::models::ArtifactKind;

    fn artifact(body: &str) -> Artifact {
        Artifact {
            id: "doc:src/main.py".to_string(),
            kind: ArtifactKind::Summary,
            source_paths: vec!["src/main.py".to_string()],
            body: body.to_string(),
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn small_body_is_one_chunk() {
        let chunks = chunk_artifact(&artifact("# Title\n\nOne short paragraph."), 500, 50).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert!(chunks[0].text.contains("One short paragraph."));
    }

    #[test]
    fn empty_body_yields_no_chunks() {
        assert!(chunk_artifact(&artifact(""), 500, 50).unwrap().is_empty());
        assert!(chunk_artifact(&artifact("\n\n  \n"), 500, 50).unwrap().is_empty());
    }

    #[test]
    fn splits_on_paragraph_boundaries() {
        let body = "# Doc\n\nFirst paragraph with some words.\n\nSecond paragraph with more words.\n\nThird paragraph here.";
        let chunks = chunk_artifact(&artifact(body), 60, 0).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 60, "chunk too large: {}", c.text.len());
        }
        // Paragraphs are not split mid-sentence at this size
        assert!(chunks.iter().any(|c| c.text.contains("First paragraph")));
        assert!(chunks.iter().any(|c| c.text.contains("Third paragraph")));
    }

    #[test]
    fn headings_start_new_blocks() {
        let body = "## A\ncontent under a\n## B\ncontent under b";
        let chunks = chunk_artifact(&artifact(body), 20, 0).unwrap();
        assert!(chunks.len() >= 2);
        assert!(chunks[0].text.starts_with("## A"));
        assert!(chunks.iter().any(|c| c.text.starts_with("## B")));
    }

    #[test]
    fn deterministic_ids_and_boundaries() {
        let body = "# Doc\n\nAlpha beta gamma delta.\n\nEpsilon zeta eta theta.\n\nIota kappa lambda mu.";
        let a = chunk_artifact(&artifact(body), 40, 10).unwrap();
        let b = chunk_artifact(&artifact(body), 40, 10).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.text, y.text);
            assert_eq!((x.start, x.end), (y.start, y.end));
        }
    }

    #[test]
    fn ids_depend_on_artifact_and_range() {
        let body = "Paragraph one.\n\nParagraph two that is long enough to split.";
        let a = chunk_artifact(&artifact(body), 20, 0).unwrap();
        let mut other = artifact(body);
        other.id = "doc:other.py".to_string();
        let b = chunk_artifact(&other, 20, 0).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_ne!(x.id, y.id);
        }
    }

    #[test]
    fn overlap_repeats_tail_of_previous_chunk() {
        let body = "line one line one\n\nline two line two\n\nline three line three";
        let chunks = chunk_artifact(&artifact(body), 30, 12).unwrap();
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            // Next chunk starts at or before the previous chunk's end when
            // overlap applies, never after a gap larger than the separator
            assert!(pair[1].start <= pair[0].end + 2);
        }
    }

    #[test]
    fn oversized_block_gets_hard_cuts() {
        let word = "word ".repeat(100);
        let chunks = chunk_artifact(&artifact(&word), 64, 0).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 64);
        }
        // Contiguous coverage with no dropped text
        for pair in chunks.windows(2) {
            assert!(pair[1].start <= pair[0].end);
        }
    }

    #[test]
    fn chunks_are_exact_slices_of_body() {
        let body = "# Doc\n\nOne paragraph.\n\nAnother paragraph entirely.";
        let art = artifact(body);
        for c in chunk_artifact(&art, 30, 8).unwrap() {
            assert_eq!(&art.body[c.start..c.end], c.text);
        }
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(chunk_artifact(&artifact("text"), 10, 10).is_err());
        assert!(chunk_artifact(&artifact("text"), 0, 0).is_err());
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let body = "héllo wörld ".repeat(30);
        let chunks = chunk_artifact(&artifact(&body), 40, 6).unwrap();
        for c in &chunks {
            // Slicing would have panicked on a bad boundary; double-check
            assert!(c.text.is_char_boundary(0));
            assert!(c.text.len() <= 40);
        }
    }
}
