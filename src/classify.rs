//! Transaction categorization.
//!
//! Two stages. A keyword rule pass handles the merchants that appear in
//! nearly every statement; a confident rule hit (>= 0.8) never goes to the
//! model. Everything else is sent to the generation provider with the
//! closed category list and a one-label reply format. A failed or
//! unparseable model reply falls back to (Miscellaneous, 0.0) so a flaky
//! backend degrades to "needs review" rather than an error.
//!
//! Results are cached per normalized description for the life of the
//! classifier, and batch classification fans unique descriptions out under
//! a semaphore sized by `generation.max_in_flight`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tracing::debug;

use crate::category::Category;
use crate::config::GenerationConfig;
use crate::extract::normalize_description;
use crate::generation;
use crate::models::Transaction;

/// Confidence at or above which a rule hit skips the model.
const RULE_SHORT_CIRCUIT: f64 = 0.8;
/// Confidence assigned to a model answer that maps onto a known category.
const MODEL_CONFIDENCE: f64 = 0.8;

pub struct Classifier {
    generation: GenerationConfig,
    semaphore: Arc<Semaphore>,
    cache: Mutex<HashMap<String, (Category, f64)>>,
}

impl Classifier {
    pub fn new(generation: GenerationConfig) -> Arc<Self> {
        let permits = generation.max_in_flight.max(1);
        Arc::new(Self {
            generation,
            semaphore: Arc::new(Semaphore::new(permits)),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Categorize one description. Never fails; the worst outcome is
    /// (Miscellaneous, 0.0).
    pub async fn classify(&self, description: &str) -> (Category, f64) {
        let key = normalize_description(description);
        if key.is_empty() {
            return (Category::Miscellaneous, 0.0);
        }

        if let Some(hit) = self.cache.lock().await.get(&key) {
            return *hit;
        }

        let (rule_category, rule_confidence) = rule_categorize(&key);

        let result = if rule_confidence >= RULE_SHORT_CIRCUIT {
            (rule_category, rule_confidence)
        } else if self.generation.is_enabled() {
            match self.classify_with_model(description).await {
                Some(hit) => hit,
                None => (Category::Miscellaneous, 0.0),
            }
        } else {
            // No model available; whatever the rules found stands.
            (rule_category, rule_confidence)
        };

        self.cache.lock().await.insert(key, result);
        result
    }

    async fn classify_with_model(&self, description: &str) -> Option<(Category, f64)> {
        let prompt = build_category_prompt(description);
        match generation::generate(&self.generation, &prompt, 32).await {
            Ok(reply) => {
                let label = reply.lines().next().unwrap_or("").trim();
                match Category::match_label(label) {
                    Some(category) => Some((category, MODEL_CONFIDENCE)),
                    None => {
                        debug!(reply = label, "model returned unknown category label");
                        None
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "classification call failed");
                None
            }
        }
    }

    /// Categorize every non-overridden transaction in place. Unique
    /// descriptions are classified once, concurrently, and fanned back out.
    pub async fn classify_all(self: &Arc<Self>, txns: &mut [Transaction]) {
        let mut uniques: HashMap<String, String> = HashMap::new();
        for txn in txns.iter() {
            if txn.manually_overridden {
                continue;
            }
            uniques
                .entry(normalize_description(&txn.description))
                .or_insert_with(|| txn.description.clone());
        }

        let mut set = tokio::task::JoinSet::new();
        for (key, description) in uniques {
            let this = Arc::clone(self);
            set.spawn(async move {
                let _permit = this.semaphore.acquire().await;
                let result = this.classify(&description).await;
                (key, result)
            });
        }

        let mut results: HashMap<String, (Category, f64)> = HashMap::new();
        while let Some(joined) = set.join_next().await {
            if let Ok((key, result)) = joined {
                results.insert(key, result);
            }
        }

        for txn in txns.iter_mut() {
            if txn.manually_overridden {
                continue;
            }
            if let Some((category, confidence)) =
                results.get(&normalize_description(&txn.description))
            {
                txn.category = *category;
                txn.confidence = *confidence;
            }
        }
    }
}

fn build_category_prompt(description: &str) -> String {
    let labels: Vec<&str> = Category::ALL.iter().map(|c| c.label()).collect();
    format!(
        "Categorize this bank transaction into exactly one of these categories:\n\
{}\n\n\
Transaction: {}\n\n\
Respond with only the category name, nothing else.",
        labels.join(", "),
        description
    )
}

/// Keyword tables keyed by normalized description substrings.
fn category_keywords() -> &'static [(Category, &'static [&'static str])] {
    &[
        (
            Category::FoodAndDining,
            &[
                "restaurant", "cafe", "food", "dining", "pizza", "burger", "coffee",
                "starbucks", "mcdonalds", "kfc", "dominos", "swiggy", "zomato", "grocery",
                "supermarket", "bakery", "bar", "pub",
            ],
        ),
        (
            Category::Transportation,
            &[
                "uber", "lyft", "taxi", "cab", "ola", "rapido", "metro", "bus", "train",
                "fuel", "petrol", "diesel", "parking", "toll", "rickshaw", "car rental",
            ],
        ),
        (
            Category::Shopping,
            &[
                "amazon", "flipkart", "myntra", "shopping", "mall", "store", "retail",
                "clothing", "electronics", "furniture", "ikea", "ecommerce",
            ],
        ),
        (
            Category::BillsAndUtilities,
            &[
                "electricity", "water bill", "gas bill", "internet", "phone", "mobile",
                "broadband", "wifi", "utility", "power", "telecom", "airtel", "jio",
                "vodafone",
            ],
        ),
        (
            Category::Healthcare,
            &[
                "hospital", "doctor", "medical", "pharmacy", "medicine", "clinic",
                "health", "dental", "apollo", "diagnostic", "lab test",
            ],
        ),
        (
            Category::Entertainment,
            &[
                "movie", "cinema", "theater", "netflix", "spotify", "prime video",
                "hotstar", "gaming", "concert", "bookmyshow",
            ],
        ),
        (
            Category::Travel,
            &[
                "hotel", "booking", "travel", "vacation", "trip", "flight", "airline",
                "makemytrip", "goibibo", "oyo", "airbnb", "resort", "holiday",
            ],
        ),
        (
            Category::Income,
            &[
                "salary", "wage", "income", "refund", "cashback", "bonus", "dividend",
                "interest credit",
            ],
        ),
        (
            Category::Transfers,
            &[
                "transfer", "paytm", "phonepe", "googlepay", "upi", "neft", "rtgs",
                "imps", "wallet", "send money",
            ],
        ),
    ]
}

/// Score a normalized description against the keyword tables.
///
/// Exact match 1.0, containment of a keyword longer than 3 chars 0.9,
/// shorter keyword 0.7; a second matching keyword in the same category
/// nudges the score up. Best category wins.
pub fn rule_categorize(normalized: &str) -> (Category, f64) {
    let mut best = (Category::Miscellaneous, 0.0f64);

    for (category, keywords) in category_keywords() {
        let mut score = 0.0f64;
        let mut matched = 0usize;

        for keyword in keywords.iter() {
            if !normalized.contains(keyword) {
                continue;
            }
            let hit = if normalized == *keyword {
                1.0
            } else if keyword.len() > 3 {
                0.9
            } else {
                0.7
            };
            score = score.max(hit);
            matched += 1;
        }

        if matched > 1 {
            score = (score + 0.05).min(1.0);
        }
        if score > best.1 {
            best = (*category, score);
        }
    }

    best
}
