//! Transaction extraction from document text.
//!
//! Bank statements arrive in wildly different shapes after text extraction:
//! pipe-delimited tables with serial numbers, UPI app exports with
//! "02 Aug 8:37 PM" timestamps, or loose "date description amount" lines.
//! A small set of line patterns covers these; structured tables are handled
//! separately by matching header names to columns.
//!
//! Every candidate must yield a parseable date and amount or it is skipped.
//! Duplicates collapse on (date, normalized description, amount in cents);
//! the first occurrence wins.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use uuid::Uuid;

use crate::category::Category;
use crate::models::{Transaction, TxnKind};

/// A table recovered from document structure: header row plus data rows.
#[derive(Debug, Clone, Default)]
pub struct ExtractedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Lowercase and collapse runs of whitespace. This is the canonical form
/// used for dedup keys and the classification cache.
pub fn normalize_description(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn line_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            // Pipe table with serial number: | 123 | 02-08-2024 | ... | desc | ... | 450.00 |
            Regex::new(
                r"\|\s*\d{1,5}\s*\|\s*(\d{2}-\d{2}-\d{4})\s*\|[^|]*\|\s*([^|]+?)\s*\|[^|]*\|\s*([-+]?[\d,]+(?:[.\s]\d{1,2})?)\s*\|",
            )
            .unwrap(),
            // UPI export row: | 02 Aug 8:37 PM | Paid to X | ... | - Rs.450 |
            Regex::new(
                r"\|\s*(\d{1,2}\s+[A-Za-z]{3})\s+[\d:]+\s*[AP]M\s*\|\s*([^|]+?)\s*\|(?:[^|]*\|)*\s*([-+]?\s*(?:Rs\.?|₹|\$)\s*[\d,]+(?:\.\d{1,2})?)\s*\|",
            )
            .unwrap(),
            // Loose line: 02-08-2024 Some Merchant Rs.1,250.00
            Regex::new(
                r"(\d{2}[-/]\d{2}[-/]\d{2,4}|\d{4}-\d{2}-\d{2})\s+(.+?)\s+([-+]?\s*(?:Rs\.?|₹|\$)?\s*[\d,]+(?:\.\d{1,2})?)\s*(CR|DR|Cr|Dr)?\s*$",
            )
            .unwrap(),
        ]
    })
}

/// Extract transactions from free text plus any structured tables.
///
/// Extracted rows start uncategorized: `Miscellaneous` at confidence 0.0
/// until the classifier runs over them.
pub fn extract_transactions(
    text: &str,
    tables: &[ExtractedTable],
    source_document_id: &str,
) -> Vec<Transaction> {
    let mut out: Vec<Transaction> = Vec::new();
    let mut seen: HashSet<(NaiveDate, String, i64)> = HashSet::new();

    for table in tables {
        for candidate in table_candidates(table) {
            push_unique(&mut out, &mut seen, candidate, source_document_id);
        }
    }

    for line in text.lines() {
        for pattern in line_patterns() {
            let Some(caps) = pattern.captures(line) else {
                continue;
            };

            let date_str = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let description = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            let amount_str = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            let marker = caps.get(4).map(|m| m.as_str());

            let candidate = Candidate {
                date_str: date_str.to_string(),
                description: description.to_string(),
                amount_str: amount_str.to_string(),
                kind_hint: marker.and_then(kind_from_marker),
            };
            if push_unique(&mut out, &mut seen, candidate, source_document_id) {
                break;
            }
        }
    }

    out
}

struct Candidate {
    date_str: String,
    description: String,
    amount_str: String,
    kind_hint: Option<TxnKind>,
}

/// Returns true when the candidate parsed cleanly and was not a duplicate.
fn push_unique(
    out: &mut Vec<Transaction>,
    seen: &mut HashSet<(NaiveDate, String, i64)>,
    candidate: Candidate,
    source_document_id: &str,
) -> bool {
    let Some(date) = parse_date(&candidate.date_str) else {
        return false;
    };
    let Some((amount, sign_kind)) = parse_amount(&candidate.amount_str) else {
        return false;
    };
    if candidate.description.is_empty() || amount <= 0.0 {
        return false;
    }

    let kind = candidate
        .kind_hint
        .or(sign_kind)
        .unwrap_or_else(|| kind_from_description(&candidate.description));

    let key = (
        date,
        normalize_description(&candidate.description),
        (amount * 100.0).round() as i64,
    );
    if !seen.insert(key) {
        return false;
    }

    out.push(Transaction {
        id: Uuid::new_v4().to_string(),
        date,
        description: candidate.description,
        amount,
        kind,
        category: Category::Miscellaneous,
        confidence: 0.0,
        source_document_id: source_document_id.to_string(),
        manually_overridden: false,
    });
    true
}

fn table_candidates(table: &ExtractedTable) -> Vec<Candidate> {
    let headers: Vec<String> = table.headers.iter().map(|h| h.to_lowercase()).collect();

    let find = |names: &[&str]| -> Option<usize> {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.contains(n)))
    };

    let Some(date_col) = find(&["date"]) else {
        return Vec::new();
    };
    let Some(desc_col) = find(&["description", "narration", "particulars", "details", "paid to"])
    else {
        return Vec::new();
    };
    let debit_col = find(&["debit", "withdrawal"]);
    let credit_col = find(&["credit", "deposit"]);
    let amount_col = find(&["amount"]);

    let mut candidates = Vec::new();

    for row in &table.rows {
        let cell = |i: usize| row.get(i).map(|s| s.trim()).unwrap_or("");

        let date_str = cell(date_col);
        let description = cell(desc_col);

        // Separate debit/credit columns decide direction; a lone amount
        // column falls back to sign and keywords.
        let (amount_str, kind_hint) = match (debit_col, credit_col) {
            (Some(d), Some(c)) => {
                if !cell(d).is_empty() && cell(d) != "-" {
                    (cell(d), Some(TxnKind::Debit))
                } else if !cell(c).is_empty() && cell(c) != "-" {
                    (cell(c), Some(TxnKind::Credit))
                } else {
                    continue;
                }
            }
            _ => match amount_col {
                Some(a) => (cell(a), None),
                None => continue,
            },
        };

        candidates.push(Candidate {
            date_str: date_str.to_string(),
            description: description.to_string(),
            amount_str: amount_str.to_string(),
            kind_hint,
        });
    }

    candidates
}

/// Parse the date formats bank exports actually use. Day-and-month forms
/// like "02 Aug" get the current UTC year.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    for fmt in ["%d-%m-%Y", "%d/%m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in ["%d-%m-%y", "%d/%m/%y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    // "02 Aug" (optionally with trailing time already stripped by the regex)
    let parts: Vec<&str> = s.split_whitespace().collect();
    if parts.len() == 2 {
        let year = Utc::now().year();
        let candidate = format!("{} {} {}", parts[0], parts[1], year);
        if let Ok(d) = NaiveDate::parse_from_str(&candidate, "%d %b %Y") {
            return Some(d);
        }
    }

    None
}

/// Parse an amount string into a positive magnitude plus any direction the
/// sign implies. Handles currency markers, thousands separators, and the
/// OCR artifact "25 00" meaning "25.00".
fn parse_amount(s: &str) -> Option<(f64, Option<TxnKind>)> {
    let s = s.trim();
    let sign_kind = if s.starts_with('-') {
        Some(TxnKind::Debit)
    } else if s.starts_with('+') {
        Some(TxnKind::Credit)
    } else {
        None
    };

    // Strip currency markers before filtering so the dot in "Rs." does not
    // survive into the number.
    let stripped = s
        .to_lowercase()
        .replace("rs.", "")
        .replace("rs", "")
        .replace("inr", "")
        .replace('₹', "")
        .replace('$', "");

    let mut cleaned: String = stripped
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || *c == ' ')
        .collect::<String>()
        .trim()
        .to_string();

    // "25 00" → "25.00"
    if cleaned.contains(' ') && !cleaned.contains('.') {
        let parts: Vec<&str> = cleaned.split_whitespace().collect();
        if parts.len() == 2 && parts[1].len() <= 2 && parts[1].chars().all(|c| c.is_ascii_digit())
        {
            cleaned = format!("{}.{}", parts[0], parts[1]);
        } else {
            return None;
        }
    } else if cleaned.contains(' ') {
        return None;
    }

    let value: f64 = cleaned.replace(',', "").parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some((value.abs(), sign_kind))
}

fn kind_from_marker(marker: &str) -> Option<TxnKind> {
    match marker.to_lowercase().as_str() {
        "cr" => Some(TxnKind::Credit),
        "dr" => Some(TxnKind::Debit),
        _ => None,
    }
}

/// Keyword fallback when neither sign nor column said which way the money
/// moved. Statements are debit-heavy, so that is the default.
fn kind_from_description(description: &str) -> TxnKind {
    let lower = description.to_lowercase();
    let credit_markers = ["salary", "refund", "cashback", "interest credit", "received from", "deposit"];
    if credit_markers.iter().any(|m| lower.contains(m)) {
        return TxnKind::Credit;
    }
    TxnKind::Debit
}
