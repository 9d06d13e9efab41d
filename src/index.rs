//! Persistent vector index over SQLite.
//!
//! Vectors live in `chunk_vectors` as little-endian f32 BLOBs. Search is a
//! full scan with cosine similarity computed in Rust, which is fine at the
//! corpus sizes this tool targets. Results carry a score mapped from
//! cosine's [-1, 1] into [0, 1]; ties break on insertion order (`seq`), so
//! a repeated query over an unchanged index returns an identical list.

use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{CoreError, CoreResult};
use crate::models::{Document, EmbeddedChunk, SearchHit};

pub struct VectorIndex {
    pool: SqlitePool,
}

impl VectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Add a document's embedded chunks in a single transaction.
    ///
    /// Idempotent per chunk id: re-adding updates text and embedding in
    /// place while preserving the vector's original insertion order. The
    /// first add establishes the index dimensionality; later adds with a
    /// different width are rejected before any write.
    pub async fn add_batch(
        &self,
        document: &Document,
        embedded: &[EmbeddedChunk],
    ) -> CoreResult<()> {
        if embedded.is_empty() {
            return Ok(());
        }

        let width = embedded[0].vector.len();
        for item in embedded {
            if item.vector.len() != width {
                return Err(CoreError::DimensionMismatch {
                    expected: width,
                    actual: item.vector.len(),
                });
            }
        }

        let mut tx = self.pool.begin().await?;

        match self.stored_dims_tx(&mut tx).await? {
            Some(dims) if dims != width => {
                return Err(CoreError::DimensionMismatch {
                    expected: dims,
                    actual: width,
                });
            }
            Some(_) => {}
            None => {
                sqlx::query(
                    "INSERT INTO index_meta (key, value) VALUES ('dims', ?1)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                )
                .bind(width.to_string())
                .execute(&mut *tx)
                .await?;
            }
        }

        sqlx::query(
            "INSERT INTO documents (id, filename, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET filename = excluded.filename",
        )
        .bind(&document.id)
        .bind(&document.filename)
        .bind(document.created_at)
        .execute(&mut *tx)
        .await?;

        // Drop any stale tail from a previous, longer ingest of this document.
        sqlx::query("DELETE FROM chunks WHERE document_id = ?1 AND chunk_index >= ?2")
            .bind(&document.id)
            .bind(embedded.len() as i64)
            .execute(&mut *tx)
            .await?;

        for item in embedded {
            let chunk = &item.chunk;
            let pages = serde_json::to_string(&chunk.page_numbers)
                .map_err(|e| CoreError::InvalidInput(e.to_string()))?;

            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, text, token_count, page_numbers, source_title)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(id) DO UPDATE SET
                    text = excluded.text,
                    token_count = excluded.token_count,
                    page_numbers = excluded.page_numbers,
                    source_title = excluded.source_title
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(chunk.token_count as i64)
            .bind(&pages)
            .bind(&chunk.source_title)
            .execute(&mut *tx)
            .await?;

            // Upsert keeps the original seq so tie-break order survives
            // re-ingestion.
            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (chunk_id, document_id, embedding)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(vec_to_blob(&item.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Return the top-k hits for a query vector, best first.
    ///
    /// An empty index yields an empty list. A query vector whose width
    /// differs from the stored dimensionality is rejected.
    pub async fn search(&self, query: &[f32], k: i64) -> CoreResult<Vec<SearchHit>> {
        if k < 1 {
            return Err(CoreError::InvalidInput(format!(
                "search k must be >= 1, got {}",
                k
            )));
        }

        let Some(dims) = self.stored_dims().await? else {
            return Ok(Vec::new());
        };
        if query.len() != dims {
            return Err(CoreError::DimensionMismatch {
                expected: dims,
                actual: query.len(),
            });
        }

        let rows = sqlx::query(
            r#"
            SELECT cv.seq, cv.chunk_id, cv.embedding,
                   c.document_id, c.text, c.page_numbers, c.source_title,
                   d.filename
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            JOIN documents d ON d.id = c.document_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        struct Scored {
            seq: i64,
            score: f64,
            hit: SearchHit,
        }

        let mut scored: Vec<Scored> = Vec::with_capacity(rows.len());
        for row in &rows {
            let seq: i64 = row.get("seq");
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            let cos = cosine_similarity(query, &vector) as f64;
            let score = (cos + 1.0) / 2.0;

            let pages_json: String = row.get("page_numbers");
            let page_numbers: Vec<i64> = serde_json::from_str(&pages_json).unwrap_or_default();

            scored.push(Scored {
                seq,
                score,
                hit: SearchHit {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    filename: row.get("filename"),
                    page_numbers,
                    source_title: row.get("source_title"),
                    text: row.get("text"),
                    score,
                    rank: 0,
                },
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.seq.cmp(&b.seq))
        });
        scored.truncate(k as usize);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(i, s)| SearchHit {
                rank: i + 1,
                ..s.hit
            })
            .collect())
    }

    /// Remove all documents, chunks, and vectors atomically. The next add
    /// may use a different dimensionality.
    pub async fn clear(&self) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM index_meta WHERE key = 'dims'")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Number of indexed vectors.
    pub async fn count(&self) -> CoreResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    async fn stored_dims(&self) -> CoreResult<Option<usize>> {
        let row = sqlx::query("SELECT value FROM index_meta WHERE key = 'dims'")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|r| r.get::<String, _>("value").parse().ok()))
    }

    async fn stored_dims_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    ) -> CoreResult<Option<usize>> {
        let row = sqlx::query("SELECT value FROM index_meta WHERE key = 'dims'")
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.and_then(|r| r.get::<String, _>("value").parse().ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Document};

    async fn test_pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::run(&pool).await.unwrap();
        pool
    }

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_string(),
            filename: format!("{}.txt", id),
            created_at: 0,
        }
    }

    fn embedded(doc_id: &str, index: i64, text: &str, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk {
                id: format!("{}-{:04}", doc_id, index),
                document_id: doc_id.to_string(),
                chunk_index: index,
                text: text.to_string(),
                token_count: text.split_whitespace().count(),
                page_numbers: Vec::new(),
                source_title: None,
                filename: format!("{}.txt", doc_id),
            },
            vector,
        }
    }

    #[tokio::test]
    async fn test_search_orders_by_score_then_insertion() {
        let pool = test_pool().await;
        let index = VectorIndex::new(pool);

        index
            .add_batch(
                &doc("d1"),
                &[
                    embedded("d1", 0, "exact match", vec![1.0, 0.0]),
                    embedded("d1", 1, "orthogonal", vec![0.0, 1.0]),
                    embedded("d1", 2, "also orthogonal", vec![0.0, -1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].chunk_id, "d1-0000");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        // Both orthogonal vectors score 0.5; insertion order breaks the tie.
        assert_eq!(hits[1].chunk_id, "d1-0001");
        assert_eq!(hits[2].chunk_id, "d1-0002");
        assert_eq!(
            hits.iter().map(|h| h.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_re_add_is_idempotent_and_keeps_order() {
        let pool = test_pool().await;
        let index = VectorIndex::new(pool);

        let batch = vec![
            embedded("d1", 0, "alpha", vec![0.0, 1.0]),
            embedded("d1", 1, "beta", vec![0.0, 1.0]),
        ];
        index.add_batch(&doc("d1"), &batch).await.unwrap();
        let before = index.search(&[1.0, 0.0], 5).await.unwrap();

        index.add_batch(&doc("d1"), &batch).await.unwrap();
        let after = index.search(&[1.0, 0.0], 5).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 2);
        let ids = |hits: &[SearchHit]| hits.iter().map(|h| h.chunk_id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&before), ids(&after));
    }

    #[tokio::test]
    async fn test_re_add_updates_content() {
        let pool = test_pool().await;
        let index = VectorIndex::new(pool);

        index
            .add_batch(&doc("d1"), &[embedded("d1", 0, "old text", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .add_batch(&doc("d1"), &[embedded("d1", 0, "new text", vec![0.5, 0.5])])
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        let hits = index.search(&[0.5, 0.5], 1).await.unwrap();
        assert_eq!(hits[0].text, "new text");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let pool = test_pool().await;
        let index = VectorIndex::new(pool);

        index
            .add_batch(&doc("d1"), &[embedded("d1", 0, "a", vec![1.0, 0.0])])
            .await
            .unwrap();

        let err = index
            .add_batch(&doc("d2"), &[embedded("d2", 0, "b", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));

        let err = index.search(&[1.0, 0.0, 0.0], 1).await.unwrap_err();
        assert!(matches!(err, CoreError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_empty_index_and_bad_k() {
        let pool = test_pool().await;
        let index = VectorIndex::new(pool);

        assert!(index.search(&[1.0, 0.0], 5).await.unwrap().is_empty());
        assert_eq!(index.count().await.unwrap(), 0);

        let err = index.search(&[1.0, 0.0], 0).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_clear_resets_dimensionality() {
        let pool = test_pool().await;
        let index = VectorIndex::new(pool);

        index
            .add_batch(&doc("d1"), &[embedded("d1", 0, "a", vec![1.0, 0.0])])
            .await
            .unwrap();
        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);

        // A different width is accepted after clear.
        index
            .add_batch(&doc("d2"), &[embedded("d2", 0, "b", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
    }
}
