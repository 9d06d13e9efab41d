//! Look up a single document and its chunks.

use anyhow::{bail, Result};
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Print a document's metadata and chunk inventory. Accepts a document id
/// or a filename.
pub async fn run_get(config: &Config, key: &str) -> Result<()> {
    let pool = db::connect(config).await?;

    let row = sqlx::query("SELECT id, filename, created_at FROM documents WHERE id = ?1 OR filename = ?1")
        .bind(key)
        .fetch_optional(&pool)
        .await?;

    let Some(row) = row else {
        pool.close().await;
        bail!("No document matching '{}'.", key);
    };

    let id: String = row.get("id");
    let filename: String = row.get("filename");
    let created_at: i64 = row.get("created_at");

    println!("document {}", id);
    println!("  filename: {}", filename);
    println!("  created:  {}", created_at);

    let chunks = sqlx::query(
        "SELECT chunk_index, token_count, page_numbers FROM chunks
         WHERE document_id = ?1 ORDER BY chunk_index",
    )
    .bind(&id)
    .fetch_all(&pool)
    .await?;

    println!("  chunks:   {}", chunks.len());
    for chunk in &chunks {
        let index: i64 = chunk.get("chunk_index");
        let tokens: i64 = chunk.get("token_count");
        let pages: String = chunk.get("page_numbers");
        if pages == "[]" {
            println!("    [{}] {} tokens", index, tokens);
        } else {
            println!("    [{}] {} tokens, pages {}", index, tokens, pages);
        }
    }

    pool.close().await;
    Ok(())
}
