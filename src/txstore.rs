//! Persistence for extracted transactions.

use chrono::{NaiveDate, Utc};
use sqlx::{Row, SqlitePool};

use crate::category::Category;
use crate::error::{CoreError, CoreResult};
use crate::extract::normalize_description;
use crate::models::{Transaction, TxnKind};

fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Transaction> {
    let date_str: String = row.get("txn_date");
    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .map_err(|e| CoreError::InvalidInput(format!("bad stored date {}: {}", date_str, e)))?;

    let kind_str: String = row.get("kind");
    let kind = TxnKind::parse(&kind_str)
        .ok_or_else(|| CoreError::InvalidInput(format!("bad stored kind: {}", kind_str)))?;

    let category_str: String = row.get("category");
    let category = Category::parse(&category_str)?;

    Ok(Transaction {
        id: row.get("id"),
        date,
        description: row.get("description"),
        amount: row.get("amount"),
        kind,
        category,
        confidence: row.get("confidence"),
        source_document_id: row.get::<Option<String>, _>("source_document_id").unwrap_or_default(),
        manually_overridden: row.get::<i64, _>("manually_overridden") != 0,
    })
}

/// Insert or refresh a transaction row.
///
/// Conflicts on the dedup key (date, normalized description, cents) update
/// category and confidence in place but never touch a manually overridden
/// row, and never flip the overridden flag itself.
pub async fn upsert(pool: &SqlitePool, txn: &Transaction) -> CoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO transactions
            (id, txn_date, description, normalized_description, amount, kind,
             category, confidence, source_document_id, manually_overridden, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(id) DO UPDATE SET
            category = CASE WHEN transactions.manually_overridden = 0
                            THEN excluded.category ELSE transactions.category END,
            confidence = CASE WHEN transactions.manually_overridden = 0
                              THEN excluded.confidence ELSE transactions.confidence END
        ON CONFLICT(txn_date, normalized_description, CAST(ROUND(amount * 100) AS INTEGER))
        DO UPDATE SET
            category = CASE WHEN transactions.manually_overridden = 0
                            THEN excluded.category ELSE transactions.category END,
            confidence = CASE WHEN transactions.manually_overridden = 0
                              THEN excluded.confidence ELSE transactions.confidence END
        "#,
    )
    .bind(&txn.id)
    .bind(txn.date.format("%Y-%m-%d").to_string())
    .bind(&txn.description)
    .bind(normalize_description(&txn.description))
    .bind(txn.amount)
    .bind(txn.kind.as_str())
    .bind(txn.category.label())
    .bind(txn.confidence)
    .bind(&txn.source_document_id)
    .bind(txn.manually_overridden as i64)
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

/// All stored transactions, newest date first, then description.
pub async fn load_all(pool: &SqlitePool) -> CoreResult<Vec<Transaction>> {
    let rows = sqlx::query(
        "SELECT * FROM transactions ORDER BY txn_date DESC, description ASC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_transaction).collect()
}

pub async fn get(pool: &SqlitePool, id: &str) -> CoreResult<Transaction> {
    let row = sqlx::query("SELECT * FROM transactions WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::TransactionNotFound(id.to_string()))?;
    row_to_transaction(&row)
}

/// Apply a category with a confidence, optionally marking the row as a
/// manual override.
pub async fn set_category(
    pool: &SqlitePool,
    id: &str,
    category: Category,
    confidence: f64,
    manually_overridden: bool,
) -> CoreResult<()> {
    let result = sqlx::query(
        "UPDATE transactions
         SET category = ?1, confidence = ?2, manually_overridden = ?3
         WHERE id = ?4",
    )
    .bind(category.label())
    .bind(confidence)
    .bind(manually_overridden as i64)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::TransactionNotFound(id.to_string()));
    }
    Ok(())
}

pub async fn count(pool: &SqlitePool) -> CoreResult<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM transactions")
        .fetch_one(pool)
        .await?;
    Ok(row.get("n"))
}

pub async fn delete_all(pool: &SqlitePool) -> CoreResult<u64> {
    let result = sqlx::query("DELETE FROM transactions").execute(pool).await?;
    Ok(result.rows_affected())
}
