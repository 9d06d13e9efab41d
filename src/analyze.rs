//! Expense analysis: extract transactions from indexed documents and
//! categorize them.
//!
//! Analysis is re-runnable. Extraction runs over the stored chunk text of
//! every document; rows already known by dedup key are refreshed rather
//! than duplicated, and manually overridden rows are never touched.

use std::collections::HashMap;

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::cancel::CancelToken;
use crate::classify::Classifier;
use crate::config::Config;
use crate::db;
use crate::extract;
use crate::models::Transaction;
use crate::txstore;

#[derive(Debug, serde::Serialize)]
pub struct AnalyzeOutcome {
    pub documents_scanned: usize,
    pub transactions_total: usize,
    pub transactions_new: usize,
    pub needs_review: usize,
}

pub async fn run_analyze(config: &Config, cancel: &CancelToken) -> Result<()> {
    let pool = db::connect(config).await?;
    let outcome = analyze_documents(config, &pool, cancel).await?;

    println!("analyze");
    println!("  documents scanned: {}", outcome.documents_scanned);
    println!("  transactions: {}", outcome.transactions_total);
    println!("  new this run: {}", outcome.transactions_new);
    if outcome.needs_review > 0 {
        println!("  needs review: {}", outcome.needs_review);
    }

    pool.close().await;
    Ok(())
}

pub async fn analyze_documents(
    config: &Config,
    pool: &SqlitePool,
    cancel: &CancelToken,
) -> Result<AnalyzeOutcome> {
    let documents = document_texts(pool).await?;
    let documents_scanned = documents.len();

    // Extract across all documents; the dedup key collapses repeats caused
    // by chunk overlap or the same statement ingested twice.
    let mut extracted: Vec<Transaction> = Vec::new();
    let mut seen_keys = std::collections::HashSet::new();
    for (document_id, text) in &documents {
        cancel.checkpoint()?;
        for txn in extract::extract_transactions(text, &[], document_id) {
            if seen_keys.insert(txn.dedup_key()) {
                extracted.push(txn);
            }
        }
    }

    let existing = txstore::load_all(pool).await?;
    let existing_by_key: HashMap<_, _> = existing
        .iter()
        .map(|t| (t.dedup_key(), t.clone()))
        .collect();

    // Known rows keep their identity (and any override); unseen rows are new.
    let mut transactions_new = 0usize;
    let mut working: Vec<Transaction> = Vec::with_capacity(extracted.len());
    for txn in extracted {
        match existing_by_key.get(&txn.dedup_key()) {
            Some(known) => working.push(known.clone()),
            None => {
                transactions_new += 1;
                working.push(txn);
            }
        }
    }

    cancel.checkpoint()?;

    let classifier = Classifier::new(config.generation.clone());
    classifier.classify_all(&mut working).await;

    cancel.checkpoint()?;

    for txn in &working {
        txstore::upsert(pool, txn).await?;
    }

    let stored = txstore::load_all(pool).await?;
    let needs_review = stored
        .iter()
        .filter(|t| t.category.needs_review(t.confidence))
        .count();

    info!(
        documents = documents_scanned,
        transactions = stored.len(),
        new = transactions_new,
        "analysis complete"
    );

    Ok(AnalyzeOutcome {
        documents_scanned,
        transactions_total: stored.len(),
        transactions_new,
        needs_review,
    })
}

/// Reassemble each document's text from its stored chunks in index order.
async fn document_texts(pool: &SqlitePool) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query(
        "SELECT document_id, text FROM chunks ORDER BY document_id, chunk_index",
    )
    .fetch_all(pool)
    .await?;

    let mut out: Vec<(String, String)> = Vec::new();
    for row in rows {
        let document_id: String = row.get("document_id");
        let text: String = row.get("text");
        match out.last_mut() {
            Some((id, body)) if *id == document_id => {
                body.push('\n');
                body.push_str(&text);
            }
            _ => out.push((document_id, text)),
        }
    }
    Ok(out)
}
