//! Semantic search over the index.

use anyhow::{bail, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::error::CoreResult;
use crate::index::VectorIndex;
use crate::models::SearchHit;

/// Embed the query and return the top-k hits.
pub async fn search_chunks(
    config: &Config,
    pool: &SqlitePool,
    query: &str,
    k: i64,
) -> CoreResult<Vec<SearchHit>> {
    let query_vec = embedding::embed_query(&config.embedding, query).await?;
    let index = VectorIndex::new(pool.clone());
    index.search(&query_vec, k).await
}

pub async fn run_search(config: &Config, query: &str, limit: Option<i64>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let pool = db::connect(config).await?;
    let k = limit.unwrap_or(config.retrieval.top_k);
    let hits = search_chunks(config, &pool, query, k).await?;

    if hits.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for hit in &hits {
        let pages = if hit.page_numbers.is_empty() {
            String::new()
        } else {
            let list: Vec<String> = hit.page_numbers.iter().map(|p| p.to_string()).collect();
            format!(" p.{}", list.join(","))
        };
        println!("{}. [{:.3}] {}{}", hit.rank, hit.score, hit.filename, pages);
        let snippet: String = hit.text.chars().take(config.retrieval.preview_chars).collect();
        println!("   {}", snippet.split_whitespace().collect::<Vec<_>>().join(" "));
    }

    pool.close().await;
    Ok(())
}
