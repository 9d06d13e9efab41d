//! Destructive reset of the index and, optionally, stored transactions.

use anyhow::{bail, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::index::VectorIndex;
use crate::txstore;

/// Drop the index and, optionally, stored transactions.
pub async fn clear_data(pool: &SqlitePool, with_transactions: bool) -> Result<()> {
    let index = VectorIndex::new(pool.clone());
    index.clear().await?;
    if with_transactions {
        txstore::delete_all(pool).await?;
    }
    Ok(())
}

pub async fn run_clear(config: &Config, with_transactions: bool, yes: bool) -> Result<()> {
    if !yes {
        bail!("clear is destructive. Re-run with --yes to confirm.");
    }

    let pool = db::connect(config).await?;
    clear_data(&pool, with_transactions).await?;
    println!("Cleared documents, chunks, and vectors.");
    if with_transactions {
        println!("Cleared transactions.");
    }

    pool.close().await;
    Ok(())
}
