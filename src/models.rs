//! Core data models flowing through the ingestion, retrieval, and
//! categorization pipelines.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::category::Category;

/// A document as stored. Re-ingesting a file with the same name replaces the
/// previous document and its chunks.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub created_at: i64,
}

/// A bounded, overlapping segment of a document's extracted text, the unit
/// of embedding and retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Deterministic: `{document_id}-{chunk_index:04}`.
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    /// Whitespace token count of `text`.
    pub token_count: usize,
    /// Pages the chunk's span covers, from `[Page N]` markers. May be empty.
    pub page_numbers: Vec<i64>,
    /// Optional section title inherited from ingestion metadata.
    pub source_title: Option<String>,
    pub filename: String,
}

/// A chunk paired with its embedding vector, ready for the index.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// One nearest-neighbor result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub document_id: String,
    pub filename: String,
    pub page_numbers: Vec<i64>,
    pub source_title: Option<String>,
    pub text: String,
    /// Similarity in [0, 1]; cosine mapped by `(c + 1) / 2`.
    pub score: f64,
    /// 1-based dense rank; ties broken by earliest insertion order.
    pub rank: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxnKind {
    Debit,
    Credit,
}

impl TxnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnKind::Debit => "debit",
            TxnKind::Credit => "credit",
        }
    }

    pub fn parse(s: &str) -> Option<TxnKind> {
        match s {
            "debit" => Some(TxnKind::Debit),
            "credit" => Some(TxnKind::Credit),
            _ => None,
        }
    }
}

/// A transaction mined from a document. Category and confidence start at
/// their defaults and are populated by the classifier, unless the row has
/// been manually overridden.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: String,
    pub date: NaiveDate,
    pub description: String,
    /// Non-negative magnitude; direction lives in `kind`.
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: TxnKind,
    pub category: Category,
    pub confidence: f64,
    pub source_document_id: String,
    pub manually_overridden: bool,
}

impl Transaction {
    /// Composite key used for extraction dedup and re-analysis matching:
    /// (date, normalized description, amount in cents).
    pub fn dedup_key(&self) -> (NaiveDate, String, i64) {
        (
            self.date,
            crate::extract::normalize_description(&self.description),
            (self.amount * 100.0).round() as i64,
        )
    }
}

/// Per-category expense rollup. Derived on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub name: String,
    pub total: f64,
    pub count: usize,
    /// Share of the grand debit total, in percent. 0 when the total is 0.
    pub percentage: f64,
}
