//! Builds the context block handed to the answer generator.
//!
//! Hits are consumed greedily in rank order against a whitespace-token
//! budget. The first hit that would overflow the budget stops assembly;
//! later, smaller hits are not considered, which keeps the included set a
//! strict rank prefix.

use serde::Serialize;

use crate::models::SearchHit;

#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub filename: String,
    pub page_numbers: Vec<i64>,
    pub source_title: Option<String>,
    pub preview: String,
}

/// Assemble a context string and the citations for the hits it includes.
pub fn assemble(
    hits: &[SearchHit],
    token_budget: usize,
    preview_chars: usize,
) -> (String, Vec<Citation>) {
    let mut blocks: Vec<String> = Vec::new();
    let mut citations: Vec<Citation> = Vec::new();
    let mut used_tokens = 0usize;

    for hit in hits {
        let tokens = hit.text.split_whitespace().count();
        if used_tokens + tokens > token_budget {
            break;
        }
        used_tokens += tokens;

        let n = blocks.len() + 1;
        let mut block = format!("[Context {}]\n", n);
        block.push_str(&format!("Source: {}{}\n", hit.filename, page_suffix(hit)));
        if let Some(title) = &hit.source_title {
            block.push_str(&format!("Title: {}\n", title));
        }
        block.push_str(&format!("Content: {}", hit.text.trim()));
        blocks.push(block);

        citations.push(Citation {
            filename: hit.filename.clone(),
            page_numbers: hit.page_numbers.clone(),
            source_title: hit.source_title.clone(),
            preview: truncate_preview(&hit.text, preview_chars),
        });
    }

    (blocks.join("\n\n"), citations)
}

fn page_suffix(hit: &SearchHit) -> String {
    if hit.page_numbers.is_empty() {
        String::new()
    } else {
        let pages: Vec<String> = hit.page_numbers.iter().map(|p| p.to_string()).collect();
        format!(" (page {})", pages.join(", "))
    }
}

/// Trim to at most `max_chars`, backing off to a char boundary.
fn truncate_preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
