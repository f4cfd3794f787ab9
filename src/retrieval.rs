//! Retrieval engine: search, threshold filtering, and source deduplication.
//!
//! Composes the [`VectorIndex`] with the [`EmbeddingCache`]: the query is
//! embedded (cache-first), ranked by exhaustive distance scan, mapped to
//! similarity scores, and filtered by a hard threshold.
//!
//! Similarity is the fixed transform `1 / (1 + distance)` — monotonically
//! decreasing in distance, bounded in `(0, 1]`. The threshold is a hard
//! filter applied after ranking, not a re-weighting: raising it can only
//! shrink or preserve the result set for a fixed query and index.
//!
//! Source names are deduplicated in first-seen order for citations; the
//! concatenated context keeps every surviving chunk, repeats included.

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingCache;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::models::Chunk;

/// A chunk that survived threshold filtering.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub similarity: f32,
    /// 1-based rank by ascending distance.
    pub rank: usize,
}

/// The outcome of one retrieval pass.
///
/// An empty `chunks` list means the query is unanswerable from documents —
/// a policy signal for the caller, not a search failure.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    pub chunks: Vec<RetrievedChunk>,
    /// Deduplicated source names in first-seen order.
    pub sources: Vec<String>,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Concatenated, numbered context for the generation prompt. Every
    /// surviving chunk appears, including repeats from the same source.
    pub fn context(&self) -> String {
        self.chunks
            .iter()
            .map(|rc| format!("[{}] {}", rc.rank, rc.chunk.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Convert a squared distance into a similarity score in `(0, 1]`.
pub fn similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

/// Deduplicate source names, preserving first-seen order.
pub fn dedup_sources<'a>(sources: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for source in sources {
        if !unique.iter().any(|s| s == source) {
            unique.push(source.to_string());
        }
    }
    unique
}

/// Composes index search with threshold filtering and source deduplication.
pub struct RetrievalEngine {
    index: Arc<VectorIndex>,
    embeddings: Arc<EmbeddingCache>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        index: Arc<VectorIndex>,
        embeddings: Arc<EmbeddingCache>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            embeddings,
            config,
        }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Embed the query and retrieve the surviving chunks.
    ///
    /// An empty index skips the embedding call entirely and returns an
    /// empty retrieval.
    pub async fn retrieve(&self, query: &str) -> Result<Retrieval> {
        if self.index.is_empty() {
            return Ok(Retrieval::default());
        }

        let query_vec = self.embeddings.get_or_compute(query).await?;
        let hits = self.index.search(&query_vec, self.config.top_k);

        let mut chunks = Vec::new();
        for (rank, hit) in hits.iter().enumerate() {
            let score = similarity(hit.distance);
            if score < self.config.similarity_threshold {
                continue;
            }
            if let Some(chunk) = self.index.chunk_at(hit.position) {
                chunks.push(RetrievedChunk {
                    chunk,
                    similarity: score,
                    rank: rank + 1,
                });
            }
        }

        let sources = dedup_sources(chunks.iter().map(|rc| rc.chunk.source.as_str()));
        Ok(Retrieval { chunks, sources })
    }
}
