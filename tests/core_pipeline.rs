//! End-to-end pipeline tests against a real on-disk database, using the
//! deterministic local embedding provider so nothing needs a network.

use std::path::PathBuf;

use tempfile::TempDir;

use ledgerlens::analyze;
use ledgerlens::cancel::CancelToken;
use ledgerlens::category::Category;
use ledgerlens::clear;
use ledgerlens::config::{Config, DbConfig};
use ledgerlens::db;
use ledgerlens::error::CoreError;
use ledgerlens::index::VectorIndex;
use ledgerlens::ingest;
use ledgerlens::models::TxnKind;
use ledgerlens::reconcile;
use ledgerlens::search;
use ledgerlens::summary;
use ledgerlens::txstore;
use ledgerlens::{ask, generation::ResponseLength, migrate};

fn test_config(dir: &TempDir) -> Config {
    let mut config: Config = toml::from_str(&format!(
        r#"
        [db]
        path = "{}"

        [embedding]
        provider = "local"
        dims = 64

        [chunking]
        max_tokens = 64
        overlap_tokens = 8
        min_chunk_chars = 5
        "#,
        dir.path().join("lens.sqlite").display()
    ))
    .unwrap();
    config.db = DbConfig {
        path: dir.path().join("lens.sqlite"),
    };
    config
}

fn write_statement(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

const STATEMENT: &str = "\
# Statement August

Account summary for the month of August.
02-08-2024 Paid to Arabian Restaurant Rs.450.00
03-08-2024 Uber trip downtown Rs.220.00
05-08-2024 ACME PAYROLL SALARY 55,000.00 CR
07-08-2024 Netflix subscription Rs.649.00
07-08-2024 Mystery merchant 9981 Rs.75.00
The closing balance was healthy this month.
";

#[tokio::test]
async fn test_ingest_search_roundtrip() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let pool = db::connect(&config).await.unwrap();
    migrate::run(&pool).await.unwrap();

    let path = write_statement(&dir, "statement.txt", STATEMENT);
    let cancel = CancelToken::new();
    let outcome = ingest::ingest_file(&config, &pool, &path, &cancel)
        .await
        .unwrap();
    assert!(outcome.chunks_written > 0);
    assert_eq!(outcome.filename, "statement.txt");

    let hits = search::search_chunks(&config, &pool, "Uber trip downtown", 3)
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].rank, 1);
    assert!(hits[0].score >= hits.last().unwrap().score);
    assert!(hits.iter().any(|h| h.text.contains("Uber trip downtown")));

    pool.close().await;
}

#[tokio::test]
async fn test_multi_page_document_exact_chunks_and_first_rank() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.chunking.max_tokens = 12;
    config.chunking.overlap_tokens = 0;
    let pool = db::connect(&config).await.unwrap();
    migrate::run(&pool).await.unwrap();

    // Four 6-token sentences: exactly two sentences fit each 12-token
    // window, so the document lands as exactly two chunks, one per page.
    let body = "\
[Page 1] alpha beta gamma delta.
[Page 1] interest accrued on savings.
[Page 2] zebra quagga okapi wildebeest.
[Page 2] closing balance retained fully.
";
    let path = write_statement(&dir, "pages.txt", body);
    let cancel = CancelToken::new();
    let outcome = ingest::ingest_file(&config, &pool, &path, &cancel)
        .await
        .unwrap();
    assert_eq!(outcome.chunks_written, 2);

    let index = VectorIndex::new(pool.clone());
    assert_eq!(index.count().await.unwrap(), 2);

    // Query with the second chunk's own text: its vector is exactly the
    // chunk's, so that chunk must rank first at k=3.
    let query = "[Page 2] zebra quagga okapi wildebeest. [Page 2] closing balance retained fully.";
    let hits = search::search_chunks(&config, &pool, query, 3)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].rank, 1);
    assert!(hits[0].chunk_id.ends_with("-0001"), "{}", hits[0].chunk_id);
    assert_eq!(hits[0].page_numbers, vec![2]);
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    assert!(hits[0].score > hits[1].score);

    pool.close().await;
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let pool = db::connect(&config).await.unwrap();
    migrate::run(&pool).await.unwrap();

    let path = write_statement(&dir, "statement.txt", STATEMENT);
    let cancel = CancelToken::new();

    let first = ingest::ingest_file(&config, &pool, &path, &cancel)
        .await
        .unwrap();
    let index = VectorIndex::new(pool.clone());
    let count_before = index.count().await.unwrap();
    let hits_before = search::search_chunks(&config, &pool, "restaurant", 5)
        .await
        .unwrap();

    let second = ingest::ingest_file(&config, &pool, &path, &cancel)
        .await
        .unwrap();
    assert_eq!(first.document_id, second.document_id);
    assert_eq!(index.count().await.unwrap(), count_before);

    let hits_after = search::search_chunks(&config, &pool, "restaurant", 5)
        .await
        .unwrap();
    let ids = |hits: &[ledgerlens::models::SearchHit]| {
        hits.iter().map(|h| h.chunk_id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&hits_before), ids(&hits_after));

    pool.close().await;
}

#[tokio::test]
async fn test_analyze_extracts_and_categorizes() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let pool = db::connect(&config).await.unwrap();
    migrate::run(&pool).await.unwrap();

    let path = write_statement(&dir, "statement.txt", STATEMENT);
    let cancel = CancelToken::new();
    ingest::ingest_file(&config, &pool, &path, &cancel)
        .await
        .unwrap();

    let outcome = analyze::analyze_documents(&config, &pool, &cancel)
        .await
        .unwrap();
    assert_eq!(outcome.transactions_total, 5);
    assert_eq!(outcome.transactions_new, 5);

    let txns = txstore::load_all(&pool).await.unwrap();
    let restaurant = txns
        .iter()
        .find(|t| t.description.contains("Arabian Restaurant"))
        .unwrap();
    assert_eq!(restaurant.category, Category::FoodAndDining);
    assert_eq!(restaurant.kind, TxnKind::Debit);

    let salary = txns
        .iter()
        .find(|t| t.description.contains("PAYROLL"))
        .unwrap();
    assert_eq!(salary.kind, TxnKind::Credit);

    // With generation disabled the unknown merchant stays Miscellaneous at
    // zero confidence, flagged for review.
    let mystery = txns
        .iter()
        .find(|t| t.description.contains("Mystery merchant"))
        .unwrap();
    assert_eq!(mystery.category, Category::Miscellaneous);
    assert!(mystery.category.needs_review(mystery.confidence));

    // Re-analysis finds nothing new.
    let again = analyze::analyze_documents(&config, &pool, &cancel)
        .await
        .unwrap();
    assert_eq!(again.transactions_new, 0);
    assert_eq!(again.transactions_total, 5);

    pool.close().await;
}

#[tokio::test]
async fn test_override_survives_reanalysis() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let pool = db::connect(&config).await.unwrap();
    migrate::run(&pool).await.unwrap();

    let path = write_statement(&dir, "statement.txt", STATEMENT);
    let cancel = CancelToken::new();
    ingest::ingest_file(&config, &pool, &path, &cancel)
        .await
        .unwrap();
    analyze::analyze_documents(&config, &pool, &cancel)
        .await
        .unwrap();

    let txns = txstore::load_all(&pool).await.unwrap();
    let mystery = txns
        .iter()
        .find(|t| t.description.contains("Mystery merchant"))
        .unwrap();

    let updated = reconcile::override_category(&pool, &mystery.id, "Entertainment")
        .await
        .unwrap();
    assert_eq!(updated.category, Category::Entertainment);
    assert!((updated.confidence - 1.0).abs() < 1e-9);
    assert!(updated.manually_overridden);

    analyze::analyze_documents(&config, &pool, &cancel)
        .await
        .unwrap();
    let after = txstore::get(&pool, &mystery.id).await.unwrap();
    assert_eq!(after.category, Category::Entertainment);
    assert!((after.confidence - 1.0).abs() < 1e-9);
    assert!(after.manually_overridden);

    // Unknown labels are rejected without touching the row.
    let err = reconcile::override_category(&pool, &mystery.id, "Snacks")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::UnknownCategory(_)));

    pool.close().await;
}

#[tokio::test]
async fn test_summary_over_analyzed_statement() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let pool = db::connect(&config).await.unwrap();
    migrate::run(&pool).await.unwrap();

    let path = write_statement(&dir, "statement.txt", STATEMENT);
    let cancel = CancelToken::new();
    ingest::ingest_file(&config, &pool, &path, &cancel)
        .await
        .unwrap();
    analyze::analyze_documents(&config, &pool, &cancel)
        .await
        .unwrap();

    let txns = txstore::load_all(&pool).await.unwrap();
    let report = summary::build_report(&txns);

    // Credits shape income, not a spending bucket.
    assert!((report.total_income - 55000.0).abs() < 1e-6);
    assert!((report.total_expenses - (450.0 + 220.0 + 649.0 + 75.0)).abs() < 1e-6);
    assert!(report.categories.iter().all(|c| c.name != "Income"));

    let percent_sum: f64 = report.categories.iter().map(|c| c.percentage).sum();
    assert!((percent_sum - 100.0).abs() < 1e-6);

    // Sorted by total descending.
    for pair in report.categories.windows(2) {
        assert!(pair[0].total >= pair[1].total);
    }

    pool.close().await;
}

#[tokio::test]
async fn test_clear_resets_index_and_optionally_transactions() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let pool = db::connect(&config).await.unwrap();
    migrate::run(&pool).await.unwrap();

    let path = write_statement(&dir, "statement.txt", STATEMENT);
    let cancel = CancelToken::new();
    ingest::ingest_file(&config, &pool, &path, &cancel)
        .await
        .unwrap();
    analyze::analyze_documents(&config, &pool, &cancel)
        .await
        .unwrap();

    // Index clear keeps transactions.
    clear::clear_data(&pool, false).await.unwrap();
    let index = VectorIndex::new(pool.clone());
    assert_eq!(index.count().await.unwrap(), 0);
    assert!(txstore::count(&pool).await.unwrap() > 0);

    let hits = search::search_chunks(&config, &pool, "restaurant", 5)
        .await
        .unwrap();
    assert!(hits.is_empty());

    clear::clear_data(&pool, true).await.unwrap();
    assert_eq!(txstore::count(&pool).await.unwrap(), 0);

    pool.close().await;
}

#[tokio::test]
async fn test_ask_requires_generation_provider() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let pool = db::connect(&config).await.unwrap();
    migrate::run(&pool).await.unwrap();

    let path = write_statement(&dir, "statement.txt", STATEMENT);
    let cancel = CancelToken::new();
    ingest::ingest_file(&config, &pool, &path, &cancel)
        .await
        .unwrap();

    let err = ask::answer_question(&config, &pool, "How much on travel?", ResponseLength::Brief)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::GenerationUnavailable(_)));

    pool.close().await;
}

#[tokio::test]
async fn test_cancelled_ingest_stops_before_writes() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let pool = db::connect(&config).await.unwrap();
    migrate::run(&pool).await.unwrap();

    let path = write_statement(&dir, "statement.txt", STATEMENT);
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = ingest::ingest_file(&config, &pool, &path, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CoreError>(),
        Some(CoreError::Cancelled)
    ));

    let index = VectorIndex::new(pool.clone());
    assert_eq!(index.count().await.unwrap(), 0);

    pool.close().await;
}
