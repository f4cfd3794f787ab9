//! Embedding client abstraction and memoizing cache.
//!
//! [`EmbeddingClient`] is the seam to the external embedding service: an
//! ordered list of texts in, a same-length ordered list of fixed-dimension
//! vectors out. [`HttpEmbeddingClient`] implements it against an
//! OpenAI-compatible `/embeddings` endpoint with bounded timeouts and
//! exponential backoff.
//!
//! [`EmbeddingCache`] wraps a client with exact-text memoization. The cache
//! grows monotonically — entries are never invalidated or evicted. That is a
//! known scalability limit; an eviction layer belongs above this type.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result, Service};

/// External embedding service: ordered texts in, ordered vectors out.
///
/// Implementations must accept empty input without error and must return
/// exactly one vector of their declared dimensionality per input text.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
}

/// Embedding client for an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl HttpEmbeddingClient {
    /// Create a client from configuration.
    ///
    /// Fails if the API key environment variable is unset or the HTTP
    /// client cannot be built.
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.embedding_model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let url = format!("{}/embeddings", self.base_url);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            Error::external(Service::Embedding, e.to_string())
                        })?;
                        return parse_embedding_response(&json, texts.len());
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(format!("HTTP {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    return Err(Error::external(
                        Service::Embedding,
                        format!("HTTP {}: {}", status, body_text),
                    ));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(Error::external(
            Service::Embedding,
            last_err.unwrap_or_else(|| "embedding failed after retries".to_string()),
        ))
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Extract `data[].embedding` arrays in input order.
fn parse_embedding_response(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::external(Service::Embedding, "response missing data array"))?;

    if data.len() != expected {
        return Err(Error::external(
            Service::Embedding,
            format!("expected {} embeddings, got {}", expected, data.len()),
        ));
    }

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| Error::external(Service::Embedding, "response missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }

    Ok(embeddings)
}

/// Memoizing wrapper around an [`EmbeddingClient`].
///
/// Keyed by exact text equality; a hit skips the external call entirely.
/// Every successful computation is cached unconditionally. The lock is held
/// only around map access, never across awaits, so concurrent queries can
/// at worst duplicate an external call — they cannot corrupt a cached
/// vector.
pub struct EmbeddingCache {
    client: Arc<dyn EmbeddingClient>,
    cache: RwLock<HashMap<String, Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new(client: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            client,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn dims(&self) -> usize {
        self.client.dims()
    }

    /// Number of memoized texts.
    pub fn len(&self) -> usize {
        self.cache.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached vector for `text`, computing and caching it on a
    /// miss. Failures propagate — single-text embedding backs the query
    /// path, where a missing vector means the whole turn fails.
    pub async fn get_or_compute(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.read().unwrap().get(text) {
            return Ok(hit.clone());
        }

        let mut vectors = self.client.embed(&[text.to_string()]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| Error::external(Service::Embedding, "empty embedding response"))?;

        self.cache
            .write()
            .unwrap()
            .insert(text.to_string(), vector.clone());
        Ok(vector)
    }

    /// Embed many texts, order-preserving, one external request per
    /// `batch_size` group of cache misses.
    ///
    /// Degraded-but-available policy: a failed group falls back to per-item
    /// calls, and an item that still fails is substituted with a zero vector
    /// of dimension D instead of aborting the batch. Zero vectors are
    /// recorded as failures and never cached.
    pub async fn batch_get_or_compute(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> Vec<Vec<f32>> {
        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<usize> = Vec::new();

        {
            let cache = self.cache.read().unwrap();
            for (i, text) in texts.iter().enumerate() {
                match cache.get(text) {
                    Some(hit) => out[i] = Some(hit.clone()),
                    None => misses.push(i),
                }
            }
        }

        for group in misses.chunks(batch_size.max(1)) {
            let group_texts: Vec<String> = group.iter().map(|&i| texts[i].clone()).collect();

            match self.client.embed(&group_texts).await {
                Ok(vectors) if vectors.len() == group.len() => {
                    let mut cache = self.cache.write().unwrap();
                    for (&i, vector) in group.iter().zip(vectors) {
                        cache.insert(texts[i].clone(), vector.clone());
                        out[i] = Some(vector);
                    }
                }
                Ok(vectors) => {
                    tracing::warn!(
                        expected = group.len(),
                        got = vectors.len(),
                        "embedding group returned wrong length, retrying per item"
                    );
                    self.embed_per_item(texts, group, &mut out).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "embedding group failed, retrying per item");
                    self.embed_per_item(texts, group, &mut out).await;
                }
            }
        }

        out.into_iter()
            .map(|v| v.unwrap_or_else(|| vec![0.0; self.dims()]))
            .collect()
    }

    async fn embed_per_item(
        &self,
        texts: &[String],
        group: &[usize],
        out: &mut [Option<Vec<f32>>],
    ) {
        for &i in group {
            match self.client.embed(std::slice::from_ref(&texts[i])).await {
                Ok(mut vectors) if !vectors.is_empty() => {
                    let vector = vectors.remove(0);
                    self.cache
                        .write()
                        .unwrap()
                        .insert(texts[i].clone(), vector.clone());
                    out[i] = Some(vector);
                }
                Ok(_) | Err(_) => {
                    tracing::warn!(index = i, "embedding item failed, substituting zero vector");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic fake embedder: vector derived from text length, with a
    /// configurable set of texts that always fail.
    struct FakeEmbedder {
        calls: AtomicUsize,
        fail_texts: Vec<String>,
        fail_groups: bool,
    }

    impl FakeEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_texts: Vec::new(),
                fail_groups: false,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingClient for FakeEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_groups && texts.len() > 1 {
                return Err(Error::external(Service::Embedding, "group failure"));
            }
            texts
                .iter()
                .map(|t| {
                    if self.fail_texts.contains(t) {
                        Err(Error::external(Service::Embedding, "bad text"))
                    } else {
                        Ok(vec![t.len() as f32, 1.0, 2.0, 3.0])
                    }
                })
                .collect()
        }

        fn dims(&self) -> usize {
            4
        }
    }

    #[tokio::test]
    async fn test_get_or_compute_is_idempotent() {
        let client = Arc::new(FakeEmbedder::new());
        let cache = EmbeddingCache::new(client.clone());

        let first = cache.get_or_compute("hello").await.unwrap();
        let second = cache.get_or_compute("hello").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(client.call_count(), 1, "cache hit must skip the external call");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_caches() {
        let client = Arc::new(FakeEmbedder::new());
        let cache = EmbeddingCache::new(client.clone());

        let texts: Vec<String> = vec!["a".into(), "bb".into(), "ccc".into()];
        let vectors = cache.batch_get_or_compute(&texts, 2).await;

        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0][0], 1.0);
        assert_eq!(vectors[1][0], 2.0);
        assert_eq!(vectors[2][0], 3.0);
        assert_eq!(cache.len(), 3);

        // Second pass is served entirely from cache.
        let before = client.call_count();
        let again = cache.batch_get_or_compute(&texts, 2).await;
        assert_eq!(again, vectors);
        assert_eq!(client.call_count(), before);
    }

    #[tokio::test]
    async fn test_group_failure_falls_back_per_item() {
        let client = Arc::new(FakeEmbedder {
            calls: AtomicUsize::new(0),
            fail_texts: Vec::new(),
            fail_groups: true,
        });
        let cache = EmbeddingCache::new(client.clone());

        let texts: Vec<String> = vec!["a".into(), "bb".into()];
        let vectors = cache.batch_get_or_compute(&texts, 16).await;

        assert_eq!(vectors[0][0], 1.0);
        assert_eq!(vectors[1][0], 2.0);
        // One failed group call plus two per-item calls.
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failed_item_becomes_zero_vector_and_is_not_cached() {
        let client = Arc::new(FakeEmbedder {
            calls: AtomicUsize::new(0),
            fail_texts: vec!["poison".to_string()],
            fail_groups: false,
        });
        let cache = EmbeddingCache::new(client);

        let texts: Vec<String> = vec!["ok".into(), "poison".into()];
        let vectors = cache.batch_get_or_compute(&texts, 1).await;

        assert_eq!(vectors[0][0], 2.0);
        assert_eq!(vectors[1], vec![0.0; 4]);
        assert_eq!(cache.len(), 1, "zero vectors must not be cached");
    }

    #[tokio::test]
    async fn test_empty_batch_is_accepted() {
        let client = Arc::new(FakeEmbedder::new());
        let cache = EmbeddingCache::new(client.clone());
        let vectors = cache.batch_get_or_compute(&[], 8).await;
        assert!(vectors.is_empty());
        assert_eq!(client.call_count(), 0);
    }
}
