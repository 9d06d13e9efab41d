//! Embedding backends.
//!
//! Three providers, selected by `[embedding] provider`:
//! - **`openai`**: calls the OpenAI embeddings API with batching, bounded
//!   retry, and exponential backoff.
//! - **`local`**: a deterministic feature-hash embedder. No network, no
//!   model weights; word hashes are folded into a fixed-dimension vector and
//!   L2-normalized. Similar texts land near each other, identical texts land
//!   exactly on each other, which is what the test and offline paths need.
//! - **`disabled`**: every call fails with `EmbeddingUnavailable`.
//!
//! Also provides the vector byte-codec used for SQLite BLOB storage
//! ([`vec_to_blob`] / [`blob_to_vec`]) and [`cosine_similarity`].
//!
//! A batch either produces a vector for every input, in input order, or
//! fails as a whole; callers rely on that to keep a document's chunk set
//! atomic.

use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{CoreError, CoreResult};

/// Embed a batch of texts with the configured provider. Output order matches
/// input order; the batch succeeds or fails as a whole.
pub async fn embed_texts(config: &EmbeddingConfig, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
    match config.provider.as_str() {
        "openai" => embed_openai(config, texts).await,
        "local" => {
            let dims = config.dims.unwrap_or(0);
            if dims == 0 {
                return Err(CoreError::EmbeddingUnavailable(
                    "local provider requires embedding.dims".to_string(),
                ));
            }
            Ok(texts.iter().map(|t| hash_embed(t, dims)).collect())
        }
        "disabled" => Err(CoreError::EmbeddingUnavailable(
            "embedding provider is disabled".to_string(),
        )),
        other => Err(CoreError::EmbeddingUnavailable(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

/// Embed a single query text.
pub async fn embed_query(config: &EmbeddingConfig, text: &str) -> CoreResult<Vec<f32>> {
    let results = embed_texts(config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::EmbeddingUnavailable("empty embedding response".to_string()))
}

// ============ OpenAI backend ============

/// Call the OpenAI embeddings API with retry/backoff.
///
/// - HTTP 429 or 5xx → retry with exponential backoff
/// - other HTTP 4xx → fail immediately
/// - network error → retry
async fn embed_openai(config: &EmbeddingConfig, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| CoreError::EmbeddingUnavailable("OPENAI_API_KEY not set".to_string()))?;

    let model = config
        .model
        .as_ref()
        .ok_or_else(|| CoreError::EmbeddingUnavailable("embedding.model required".to_string()))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| CoreError::EmbeddingUnavailable(e.to_string()))?;

    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            // 1s, 2s, 4s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response
                        .json()
                        .await
                        .map_err(|e| CoreError::EmbeddingUnavailable(e.to_string()))?;
                    return parse_openai_response(&json, texts.len());
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(format!("embeddings API error {}: {}", status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                return Err(CoreError::EmbeddingUnavailable(format!(
                    "embeddings API error {}: {}",
                    status, body_text
                )));
            }
            Err(e) => {
                last_err = Some(e.to_string());
                continue;
            }
        }
    }

    Err(CoreError::EmbeddingUnavailable(
        last_err.unwrap_or_else(|| "embedding failed after retries".to_string()),
    ))
}

fn parse_openai_response(json: &serde_json::Value, expected: usize) -> CoreResult<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| CoreError::EmbeddingUnavailable("missing data array".to_string()))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| CoreError::EmbeddingUnavailable("missing embedding".to_string()))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }

    if embeddings.len() != expected {
        return Err(CoreError::EmbeddingUnavailable(format!(
            "expected {} embeddings, got {}",
            expected,
            embeddings.len()
        )));
    }

    Ok(embeddings)
}

// ============ Local feature-hash backend ============

/// Deterministic bag-of-words embedding: each lowercased word is hashed into
/// a dimension bucket with a signed contribution, then the vector is
/// L2-normalized. Zero-word input yields the zero vector.
fn hash_embed(text: &str, dims: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dims];

    for word in text.split_whitespace() {
        let lowered = word.to_lowercase();
        let digest = Sha256::digest(lowered.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[0..8]);
        let bucket = u64::from_le_bytes(prefix) as usize % dims;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vec[bucket] += sign;
    }

    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
    vec
}

// ============ Vector codec & similarity ============

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in [-1, 1]. Returns 0.0 for empty or mismatched-length
/// vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;

    fn local_config(dims: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "local".to_string(),
            dims: Some(dims),
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_local_provider_deterministic_and_ordered() {
        let config = local_config(64);
        let texts = vec!["coffee shop receipt".to_string(), "airline booking".to_string()];
        let a = embed_texts(&config, &texts).await.unwrap();
        let b = embed_texts(&config, &texts).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].len(), 64);
        // Identical text embeds identically regardless of batch position.
        let single = embed_query(&config, "airline booking").await.unwrap();
        assert_eq!(single, a[1]);
    }

    #[tokio::test]
    async fn test_local_provider_vectors_normalized() {
        let config = local_config(32);
        let v = embed_query(&config, "grocery store purchase").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_disabled_provider_fails_typed() {
        let config = EmbeddingConfig::default();
        let err = embed_texts(&config, &["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, CoreError::EmbeddingUnavailable(_)));
    }

}
