//! Database statistics overview.
//!
//! A quick summary of what's stored: document, chunk, vector, and
//! transaction counts, plus per-document chunk breakdowns. Used by
//! `lens stats` to confirm ingestion and analysis are doing their job.

use anyhow::Result;
use sqlx::Row;

use crate::category::Category;
use crate::config::Config;
use crate::db;
use crate::txstore;

struct DocumentStats {
    filename: String,
    chunk_count: i64,
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;

    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;

    let total_vectors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
        .fetch_one(&pool)
        .await?;

    let total_transactions = txstore::count(&pool).await?;

    let needs_review = txstore::load_all(&pool)
        .await?
        .iter()
        .filter(|t| t.category.needs_review(t.confidence))
        .count();

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("LedgerLens - Database Stats");
    println!("===========================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!();
    println!("  Documents:    {}", total_docs);
    println!("  Chunks:       {}", total_chunks);
    println!(
        "  Embedded:     {} / {} ({}%)",
        total_vectors,
        total_chunks,
        if total_chunks > 0 {
            (total_vectors * 100) / total_chunks
        } else {
            0
        }
    );
    println!();
    println!("  Transactions: {}", total_transactions);
    if needs_review > 0 {
        println!(
            "  Needs review: {} ({} or low confidence)",
            needs_review,
            Category::Miscellaneous.label()
        );
    }

    let rows = sqlx::query(
        r#"
        SELECT d.filename, COUNT(c.id) AS chunk_count
        FROM documents d
        LEFT JOIN chunks c ON c.document_id = d.id
        GROUP BY d.id
        ORDER BY d.filename
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let per_doc: Vec<DocumentStats> = rows
        .iter()
        .map(|row| DocumentStats {
            filename: row.get("filename"),
            chunk_count: row.get("chunk_count"),
        })
        .collect();

    if !per_doc.is_empty() {
        println!();
        println!("  By document:");
        for doc in &per_doc {
            println!("    {:<40} {} chunks", doc.filename, doc.chunk_count);
        }
    }

    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
