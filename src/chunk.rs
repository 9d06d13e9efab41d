//! Sentence-boundary text chunker.
//!
//! Splits extracted document text into [`Chunk`]s that respect a configurable
//! token budget, carrying whole trailing sentences up to a configurable
//! overlap budget into the next window. Splitting happens on sentence
//! boundaries; a window never cuts a sentence in half when a boundary fits.
//! A single sentence larger than the budget becomes its own oversized chunk
//! rather than being truncated silently.
//!
//! Tokens are whitespace-delimited words. Chunk ids are deterministic,
//! derived from the document id and chunk index, so re-ingesting the same
//! document overwrites its chunks instead of duplicating them.

use crate::models::Chunk;

/// Ingestion metadata inherited by every chunk of a document.
#[derive(Debug, Clone)]
pub struct ChunkMeta {
    pub document_id: String,
    pub filename: String,
    pub source_title: Option<String>,
}

/// Split text into sentence-aligned chunks. Deterministic for identical
/// input. Empty or whitespace-only input produces zero chunks.
pub fn chunk_document(
    text: &str,
    meta: &ChunkMeta,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let sentences = split_sentences(text);
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut window: Vec<String> = Vec::new();
    let mut window_tokens = 0usize;

    for sentence in sentences {
        let sentence_tokens = sentence.split_whitespace().count();
        if sentence_tokens == 0 {
            continue;
        }

        // An oversized sentence is emitted whole, on its own.
        if sentence_tokens > max_tokens {
            if !window.is_empty() {
                let text = join_sentences(&window);
                chunks.push(make_chunk(meta, chunks.len() as i64, &text));
                window.clear();
                window_tokens = 0;
            }
            chunks.push(make_chunk(meta, chunks.len() as i64, sentence.trim_end()));
            continue;
        }

        if window_tokens + sentence_tokens > max_tokens && !window.is_empty() {
            let text = join_sentences(&window);
            chunks.push(make_chunk(meta, chunks.len() as i64, &text));

            // Seed the next window with whole trailing sentences up to the
            // overlap budget. Whole sentences, so carried text keeps its
            // line structure.
            let mut carried: Vec<String> = Vec::new();
            let mut carried_tokens = 0usize;
            for prev in window.iter().rev() {
                let n = prev.split_whitespace().count();
                if carried_tokens + n > overlap_tokens {
                    break;
                }
                carried_tokens += n;
                carried.push(prev.clone());
            }
            carried.reverse();

            // The carry must leave room for the incoming sentence, or the
            // next emission would break the token budget.
            while !carried.is_empty() && carried_tokens + sentence_tokens > max_tokens {
                let dropped = carried.remove(0);
                carried_tokens -= dropped.split_whitespace().count();
            }

            window = carried;
            window_tokens = carried_tokens;
        }

        window_tokens += sentence_tokens;
        window.push(sentence);
    }

    if !window.is_empty() {
        let text = join_sentences(&window);
        chunks.push(make_chunk(meta, chunks.len() as i64, &text));
    }

    chunks
}

/// Join window sentences, inserting a space only where the previous sentence
/// did not already end in a newline.
fn join_sentences(sentences: &[String]) -> String {
    let mut out = String::new();
    for sentence in sentences {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push(' ');
        }
        out.push_str(sentence);
    }
    out.trim_end().to_string()
}

/// Split on sentence terminators, keeping `[Page N]` markers attached to the
/// text that follows them so page provenance survives chunking.
///
/// A terminator only ends a sentence when followed by whitespace, so
/// decimals and abbreviations ("Rs.450.00") stay intact. Line breaks end a
/// sentence and are kept as a trailing newline, preserving the row
/// structure that transaction extraction relies on.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\n' {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(format!("{}\n", trimmed));
            }
            current.clear();
            continue;
        }

        current.push(ch);
        if matches!(ch, '.' | '!' | '?')
            && chars.peek().map(|c| c.is_whitespace()).unwrap_or(true)
        {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }

    sentences
}

fn make_chunk(meta: &ChunkMeta, index: i64, text: &str) -> Chunk {
    Chunk {
        id: format!("{}-{:04}", meta.document_id, index),
        document_id: meta.document_id.clone(),
        chunk_index: index,
        token_count: text.split_whitespace().count(),
        page_numbers: page_numbers_in(text),
        source_title: meta.source_title.clone(),
        filename: meta.filename.clone(),
        text: text.to_string(),
    }
}

/// Sorted, deduplicated page numbers from `[Page N]` markers in the text.
pub fn page_numbers_in(text: &str) -> Vec<i64> {
    let mut pages: Vec<i64> = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("[Page ") {
        rest = &rest[start + 6..];
        if let Some(end) = rest.find(']') {
            if let Ok(n) = rest[..end].trim().parse::<i64>() {
                pages.push(n);
            }
            rest = &rest[end + 1..];
        } else {
            break;
        }
    }
    pages.sort_unstable();
    pages.dedup();
    pages
}
