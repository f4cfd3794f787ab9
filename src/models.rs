//! Core data models used throughout Dossier.
//!
//! These types represent the chunks, sessions, and query results that flow
//! through the ingestion and question-answering pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bounded segment of document text with source metadata.
///
/// Immutable once created; `chunk_index` / `total_chunks` locate the chunk
/// within its source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub source: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// A single timestamped conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A bounded-lifetime conversation keyed by an opaque identifier.
///
/// Message order is strict insertion order; the session is logically absent
/// once idle time exceeds the store's timeout, even while physically stored.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

/// The classification verdict for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The answer should be grounded in the document collection.
    Grounded,
    /// The answer can come from general knowledge.
    Direct,
}

/// Metadata describing how a query was handled.
#[derive(Debug, Clone, Serialize)]
pub struct QueryMetadata {
    /// Raw label returned by the classifier (e.g. `"DOCUMENT"`).
    pub classification: String,
    /// Whether document retrieval was used for this answer.
    pub used_grounding: bool,
    /// Number of distinct sources cited.
    pub num_sources: usize,
}

/// The result bundle for one completed query. Built once, immutable after.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub answer: String,
    /// Deduplicated source names in first-seen order (empty if ungrounded).
    pub sources: Vec<String>,
    pub session_id: String,
    pub metadata: QueryMetadata,
}

/// A document discovered in the collection directory.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub name: String,
    pub path: String,
    /// File extension without the dot (e.g. `"txt"`).
    pub r#type: String,
}

/// Size and shape of the vector index, reported by `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub chunks: usize,
    pub dims: usize,
}

/// Session store statistics, reported by `GET /api/v1/sessions/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub timeout_minutes: i64,
}
