//! Document ingestion: read, chunk, embed, index.
//!
//! The unit of work is one document. Embedding happens for the whole chunk
//! set before anything is written, and the index add is a single
//! transaction, so a failure partway leaves no half-ingested document
//! behind. Re-ingesting a filename reuses its document id and replaces its
//! chunks.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::chunk::{self, ChunkMeta};
use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::index::VectorIndex;
use crate::models::{Document, EmbeddedChunk};

const TEXT_EXTENSIONS: [&str; 3] = ["txt", "md", "text"];

#[derive(Debug, serde::Serialize)]
pub struct IngestOutcome {
    pub document_id: String,
    pub filename: String,
    pub chunks_written: usize,
}

pub async fn run_ingest(config: &Config, path: &Path, cancel: &CancelToken) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Ingestion requires embeddings. Set [embedding] provider in config.");
    }

    let pool = db::connect(config).await?;
    let outcome = ingest_file(config, &pool, path, cancel).await?;

    println!("ingest {}", outcome.filename);
    println!("  document: {}", outcome.document_id);
    println!("  chunks written: {}", outcome.chunks_written);

    pool.close().await;
    Ok(())
}

/// Ingest a single text file into the index.
pub async fn ingest_file(
    config: &Config,
    pool: &SqlitePool,
    path: &Path,
    cancel: &CancelToken,
) -> Result<IngestOutcome> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if !TEXT_EXTENSIONS.contains(&extension.as_str()) {
        bail!(
            "Unsupported file type '{}'. Supported: {}",
            extension,
            TEXT_EXTENSIONS.join(", ")
        );
    }

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .with_context(|| format!("Bad file path: {}", path.display()))?;

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    cancel.checkpoint()?;

    let document_id = existing_document_id(pool, &filename)
        .await?
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let document = Document {
        id: document_id.clone(),
        filename: filename.clone(),
        created_at: Utc::now().timestamp(),
    };

    let meta = ChunkMeta {
        document_id: document_id.clone(),
        filename: filename.clone(),
        source_title: title_from_text(&text),
    };

    let mut chunks: Vec<_> = chunk::chunk_document(
        &text,
        &meta,
        config.chunking.max_tokens,
        config.chunking.overlap_tokens,
    )
    .into_iter()
    .filter(|c| c.text.len() >= config.chunking.min_chunk_chars)
    .collect();

    // Renumber so indices stay contiguous after the noise filter.
    for (i, c) in chunks.iter_mut().enumerate() {
        c.chunk_index = i as i64;
        c.id = format!("{}-{:04}", document_id, i);
    }

    if chunks.is_empty() {
        info!(filename = %filename, "no chunks produced, nothing to index");
        return Ok(IngestOutcome {
            document_id,
            filename,
            chunks_written: 0,
        });
    }

    cancel.checkpoint()?;

    // Embed every chunk before writing anything.
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(config.embedding.batch_size.max(1)) {
        cancel.checkpoint()?;
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedding::embed_texts(&config.embedding, &texts).await?;
        vectors.extend(embedded);
    }

    let embedded: Vec<EmbeddedChunk> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
        .collect();

    cancel.checkpoint()?;

    let index = VectorIndex::new(pool.clone());
    let written = embedded.len();
    index.add_batch(&document, &embedded).await?;

    info!(filename = %filename, chunks = written, "document indexed");

    Ok(IngestOutcome {
        document_id,
        filename,
        chunks_written: written,
    })
}

async fn existing_document_id(pool: &SqlitePool, filename: &str) -> Result<Option<String>> {
    let row = sqlx::query("SELECT id FROM documents WHERE filename = ?1")
        .bind(filename)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get("id")))
}

/// Use a markdown-style heading on the first non-empty line as the source
/// title, if present.
fn title_from_text(text: &str) -> Option<String> {
    let first = text.lines().find(|l| !l.trim().is_empty())?;
    let trimmed = first.trim();
    let title = trimmed.trim_start_matches('#').trim();
    if trimmed.starts_with('#') && !title.is_empty() {
        Some(title.to_string())
    } else {
        None
    }
}
