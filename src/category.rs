//! The closed transaction category enum and the single canonical mapping
//! between categories and their display labels.
//!
//! Both the classifier (mapping free-form model output onto the enum) and the
//! reconciler (validating manual overrides) go through this module, so there
//! is exactly one place where an unknown label can fall through.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Confidence below which a transaction is considered in need of review.
pub const REVIEW_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Food & Dining")]
    FoodAndDining,
    Transportation,
    Shopping,
    #[serde(rename = "Bills & Utilities")]
    BillsAndUtilities,
    Healthcare,
    Entertainment,
    Travel,
    Income,
    Transfers,
    Miscellaneous,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::FoodAndDining,
        Category::Transportation,
        Category::Shopping,
        Category::BillsAndUtilities,
        Category::Healthcare,
        Category::Entertainment,
        Category::Travel,
        Category::Income,
        Category::Transfers,
        Category::Miscellaneous,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::FoodAndDining => "Food & Dining",
            Category::Transportation => "Transportation",
            Category::Shopping => "Shopping",
            Category::BillsAndUtilities => "Bills & Utilities",
            Category::Healthcare => "Healthcare",
            Category::Entertainment => "Entertainment",
            Category::Travel => "Travel",
            Category::Income => "Income",
            Category::Transfers => "Transfers",
            Category::Miscellaneous => "Miscellaneous",
        }
    }

    /// Strict parse of a label. Used by the reconciler: anything that is not
    /// exactly one of the closed labels (after normalization) is rejected.
    pub fn parse(label: &str) -> CoreResult<Category> {
        let wanted = normalize(label);
        Category::ALL
            .iter()
            .copied()
            .find(|c| normalize(c.label()) == wanted)
            .ok_or_else(|| CoreError::UnknownCategory(label.to_string()))
    }

    /// Lenient mapping of free-form model output onto the closed enum.
    ///
    /// Accepts an exact normalized match, containment in either direction,
    /// or sufficient word overlap. Returns `None` below the threshold, which
    /// callers treat as the needs-review fallback.
    pub fn match_label(label: &str) -> Option<Category> {
        let wanted = normalize(label);
        if wanted.is_empty() {
            return None;
        }

        // Exact normalized match first.
        if let Ok(cat) = Category::parse(label) {
            return Some(cat);
        }

        let mut best: Option<(Category, f64)> = None;
        for cat in Category::ALL {
            let candidate = normalize(cat.label());
            let score = if wanted.contains(&candidate) || candidate.contains(&wanted) {
                0.9
            } else {
                word_overlap(&wanted, &candidate)
            };
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((cat, score));
            }
        }

        best.filter(|(_, score)| *score >= 0.5).map(|(cat, _)| cat)
    }

    /// The single needs-review predicate: Miscellaneous, or confidence below
    /// [`REVIEW_CONFIDENCE`]. All classified/unclassified counts use this.
    pub fn needs_review(&self, confidence: f64) -> bool {
        *self == Category::Miscellaneous || confidence < REVIEW_CONFIDENCE
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Lowercase, keep alphanumerics, collapse everything else to single spaces.
/// "Bills & Utilities" and "bills and utilities" normalize identically.
fn normalize(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut last_space = true;
    for ch in label.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    let out = out.trim_end().to_string();
    // "and" carries no signal in labels like "bills and utilities".
    out.split_whitespace()
        .filter(|w| *w != "and")
        .collect::<Vec<_>>()
        .join(" ")
}

fn word_overlap(a: &str, b: &str) -> f64 {
    let wa: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let wb: std::collections::HashSet<&str> = b.split_whitespace().collect();
    if wa.is_empty() || wb.is_empty() {
        return 0.0;
    }
    let shared = wa.intersection(&wb).count();
    shared as f64 / wa.len().max(wb.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exact_labels() {
        for cat in Category::ALL {
            assert_eq!(Category::parse(cat.label()).unwrap(), cat);
        }
    }

    #[test]
    fn test_parse_is_punctuation_insensitive() {
        assert_eq!(
            Category::parse("bills and utilities").unwrap(),
            Category::BillsAndUtilities
        );
        assert_eq!(
            Category::parse("FOOD & DINING").unwrap(),
            Category::FoodAndDining
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(matches!(
            Category::parse("Groceries"),
            Err(CoreError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_match_label_accepts_partial_output() {
        assert_eq!(Category::match_label("Food"), Some(Category::FoodAndDining));
        assert_eq!(
            Category::match_label("The category is Transportation."),
            Some(Category::Transportation)
        );
        assert_eq!(
            Category::match_label("utilities"),
            Some(Category::BillsAndUtilities)
        );
    }

    #[test]
    fn test_match_label_below_threshold_is_none() {
        assert_eq!(Category::match_label("quantum flux"), None);
        assert_eq!(Category::match_label(""), None);
    }

    #[test]
    fn test_needs_review_predicate() {
        assert!(Category::Miscellaneous.needs_review(1.0));
        assert!(Category::FoodAndDining.needs_review(0.69));
        assert!(!Category::FoodAndDining.needs_review(0.7));
        assert!(!Category::Income.needs_review(0.95));
    }
}
