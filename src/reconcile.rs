//! Manual category overrides.
//!
//! An override validates the label against the closed category set, pins
//! confidence at 1.0, and freezes the row: later analysis passes leave it
//! alone.

use sqlx::SqlitePool;

use crate::category::Category;
use crate::error::CoreResult;
use crate::models::Transaction;
use crate::txstore;

/// Set a transaction's category by hand and return the updated row.
pub async fn override_category(
    pool: &SqlitePool,
    id: &str,
    label: &str,
) -> CoreResult<Transaction> {
    let category = Category::parse(label)?;
    txstore::set_category(pool, id, category, 1.0, true).await?;
    txstore::get(pool, id).await
}
