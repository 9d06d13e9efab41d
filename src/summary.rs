//! Spending summaries over stored transactions.
//!
//! Category totals count debits only; credits shape the income/savings
//! report but never a spending bucket. Ordering is total descending with
//! name ascending as the tie-break, so equal totals come out in a stable
//! alphabetical order.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use crate::category::Category;
use crate::config::Config;
use crate::db;
use crate::models::{CategorySummary, Transaction, TxnKind};
use crate::txstore;

#[derive(Debug, Serialize)]
pub struct SpendingReport {
    pub categories: Vec<CategorySummary>,
    pub total_expenses: f64,
    pub total_income: f64,
    pub net_savings: f64,
    pub transaction_count: usize,
    pub needs_review: usize,
}

/// Aggregate debit transactions into per-category totals.
pub fn summarize(txns: &[Transaction]) -> Vec<CategorySummary> {
    let mut buckets: BTreeMap<&'static str, (f64, usize)> = BTreeMap::new();

    for txn in txns {
        if txn.kind != TxnKind::Debit {
            continue;
        }
        let entry = buckets.entry(txn.category.label()).or_insert((0.0, 0));
        entry.0 += txn.amount.abs();
        entry.1 += 1;
    }

    let grand_total: f64 = buckets.values().map(|(total, _)| total).sum();

    let mut rows: Vec<CategorySummary> = buckets
        .into_iter()
        .map(|(name, (total, count))| CategorySummary {
            name: name.to_string(),
            total,
            count,
            percentage: if grand_total > 0.0 {
                total / grand_total * 100.0
            } else {
                0.0
            },
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total
            .partial_cmp(&a.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    rows
}

/// Full report: category breakdown plus income/expense/savings totals.
pub fn build_report(txns: &[Transaction]) -> SpendingReport {
    let categories = summarize(txns);
    let total_expenses: f64 = txns
        .iter()
        .filter(|t| t.kind == TxnKind::Debit)
        .map(|t| t.amount.abs())
        .sum();
    let total_income: f64 = txns
        .iter()
        .filter(|t| t.kind == TxnKind::Credit)
        .map(|t| t.amount.abs())
        .sum();
    let needs_review = txns
        .iter()
        .filter(|t| t.category.needs_review(t.confidence))
        .count();

    SpendingReport {
        categories,
        total_expenses,
        total_income,
        net_savings: total_income - total_expenses,
        transaction_count: txns.len(),
        needs_review,
    }
}

pub async fn run_summary(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let txns = txstore::load_all(&pool).await?;

    if txns.is_empty() {
        println!("No transactions stored. Run analyze first.");
        pool.close().await;
        return Ok(());
    }

    let report = build_report(&txns);

    println!("Spending by category:");
    for row in &report.categories {
        println!(
            "  {:<20} {:>12.2}  ({} txn{}, {:.1}%)",
            row.name,
            row.total,
            row.count,
            if row.count == 1 { "" } else { "s" },
            row.percentage
        );
    }
    println!();
    println!("Total expenses: {:.2}", report.total_expenses);
    println!("Total income:   {:.2}", report.total_income);
    println!("Net savings:    {:.2}", report.net_savings);
    if report.needs_review > 0 {
        println!(
            "{} transaction(s) need review (low confidence or {}).",
            report.needs_review,
            Category::Miscellaneous.label()
        );
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn txn(description: &str, amount: f64, kind: TxnKind, category: Category) -> Transaction {
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            date: NaiveDate::from_ymd_opt(2024, 8, 2).unwrap(),
            description: description.to_string(),
            amount,
            kind,
            category,
            confidence: 0.9,
            source_document_id: "doc1".to_string(),
            manually_overridden: false,
        }
    }

    #[test]
    fn test_equal_totals_tie_break_alphabetically() {
        let txns = vec![
            txn("a1", 100.0, TxnKind::Debit, Category::Shopping),
            txn("a2", 200.0, TxnKind::Debit, Category::Shopping),
            txn("b1", 300.0, TxnKind::Debit, Category::Travel),
        ];
        let rows = summarize(&txns);
        assert_eq!(rows.len(), 2);
        // Both categories total 300; Shopping sorts before Travel.
        assert_eq!(rows[0].name, "Shopping");
        assert_eq!(rows[0].count, 2);
        assert!((rows[0].percentage - 50.0).abs() < 1e-9);
        assert_eq!(rows[1].name, "Travel");
        assert_eq!(rows[1].count, 1);
        assert!((rows[1].percentage - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_credits_excluded_from_categories() {
        let txns = vec![
            txn("salary", 5000.0, TxnKind::Credit, Category::Income),
            txn("rent", 1500.0, TxnKind::Debit, Category::BillsAndUtilities),
        ];
        let rows = summarize(&txns);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Bills & Utilities");
        assert!((rows[0].percentage - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_and_credit_only_inputs() {
        assert!(summarize(&[]).is_empty());

        let txns = vec![txn("salary", 5000.0, TxnKind::Credit, Category::Income)];
        assert!(summarize(&txns).is_empty());
    }

    #[test]
    fn test_report_totals_and_review_count() {
        let mut needs_review = txn("mystery", 50.0, TxnKind::Debit, Category::Miscellaneous);
        needs_review.confidence = 0.0;

        let txns = vec![
            txn("salary", 5000.0, TxnKind::Credit, Category::Income),
            txn("groceries", 800.0, TxnKind::Debit, Category::FoodAndDining),
            needs_review,
        ];
        let report = build_report(&txns);
        assert!((report.total_expenses - 850.0).abs() < 1e-9);
        assert!((report.total_income - 5000.0).abs() < 1e-9);
        assert!((report.net_savings - 4150.0).abs() < 1e-9);
        assert_eq!(report.needs_review, 1);
        assert_eq!(report.transaction_count, 3);
    }
}
