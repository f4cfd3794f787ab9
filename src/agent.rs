//! Per-query orchestrator.
//!
//! `ask` drives one query through a fixed state sequence:
//!
//! ```text
//! RECEIVED -> SESSION_RESOLVED -> CLASSIFIED -> {RETRIEVED | SKIPPED}
//!          -> ANSWERED -> RECORDED
//! ```
//!
//! The user's turn is recorded immediately after the context snapshot is
//! taken and before classification, so it becomes visible to the *next*
//! query's context, not the current one. Zero surviving sources
//! short-circuits to a fixed fallback answer with no generation call, which
//! removes a hallucination path.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::llm::{ChatClient, ChatRequest};
use crate::models::{QueryMetadata, QueryOutcome, Role, Verdict};
use crate::retrieval::RetrievalEngine;
use crate::session::SessionStore;

/// Fixed answer when retrieval survives with zero sources.
pub const NO_GROUNDING_ANSWER: &str = "I couldn't find relevant information in the document \
collection. This might be outside my knowledge base.";

/// Fail-open policy: when classification fails, default to grounding.
/// Unnecessary retrieval degrades at worst to a "not found" answer, while
/// silently skipping real grounding needs loses correctness.
pub const CLASSIFICATION_FALLBACK: Verdict = Verdict::Grounded;

/// Raw label reported when the fallback verdict is used.
const FALLBACK_LABEL: &str = "DOCUMENT";

/// Orchestrates classification, retrieval, generation, and memory writes.
///
/// Owns no ambient state: the index, cache, and session store arrive
/// through the injected collaborators at construction.
pub struct Agent {
    chat: Arc<dyn ChatClient>,
    retrieval: RetrievalEngine,
    sessions: Arc<SessionStore>,
    max_query_length: usize,
    max_context_messages: usize,
}

impl Agent {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        retrieval: RetrievalEngine,
        sessions: Arc<SessionStore>,
        max_query_length: usize,
        max_context_messages: usize,
    ) -> Self {
        Self {
            chat,
            retrieval,
            sessions,
            max_query_length,
            max_context_messages,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn retrieval(&self) -> &RetrievalEngine {
        &self.retrieval
    }

    /// Process one query end to end.
    pub async fn ask(&self, query: &str, session_id: Option<&str>) -> Result<QueryOutcome> {
        // Validation happens before any external call or side effect.
        let query_len = query.chars().count();
        if query_len > self.max_query_length {
            return Err(Error::Validation(format!(
                "query is {} characters, maximum is {}",
                query_len, self.max_query_length
            )));
        }

        // SESSION_RESOLVED: reuse a live session or create a fresh one.
        let session_id = match session_id {
            Some(id) if self.sessions.is_live(id) => id.to_string(),
            _ => self.sessions.create(),
        };

        // The context snapshot excludes the current turn by construction:
        // it is taken before the user turn is appended.
        let conversation_context = self
            .sessions
            .conversation_context(&session_id, self.max_context_messages);
        self.sessions.add_message(&session_id, Role::User, query)?;

        // CLASSIFIED
        let (verdict, label) = self.classify(query, &conversation_context).await;
        tracing::debug!(session = %session_id, label = %label, "query classified");

        let (answer, sources) = match verdict {
            Verdict::Grounded => {
                // RETRIEVED
                let retrieval = self.retrieval.retrieve(query).await?;
                if retrieval.is_empty() {
                    tracing::debug!(session = %session_id, "no surviving sources, fixed answer");
                    (NO_GROUNDING_ANSWER.to_string(), Vec::new())
                } else {
                    let request = ChatRequest::answer(
                        query,
                        Some(&retrieval.context()),
                        &conversation_context,
                    );
                    let answer = self.chat.complete(&request).await?;
                    (answer, retrieval.sources)
                }
            }
            Verdict::Direct => {
                // SKIPPED
                let request = ChatRequest::answer(query, None, &conversation_context);
                let answer = self.chat.complete(&request).await?;
                (answer, Vec::new())
            }
        };

        // RECORDED
        self.sessions
            .add_message(&session_id, Role::Assistant, &answer)?;

        Ok(QueryOutcome {
            answer,
            metadata: QueryMetadata {
                classification: label,
                used_grounding: verdict == Verdict::Grounded,
                num_sources: sources.len(),
            },
            sources,
            session_id,
        })
    }

    /// One closed two-label judgment. Failure falls open to
    /// [`CLASSIFICATION_FALLBACK`].
    async fn classify(&self, query: &str, conversation_context: &str) -> (Verdict, String) {
        let request = ChatRequest::classification(query, conversation_context);
        match self.chat.complete(&request).await {
            Ok(label) => {
                let label = label.trim().to_uppercase();
                (parse_verdict(&label), label)
            }
            Err(e) => {
                tracing::warn!(error = %e, "classification failed, falling open to grounding");
                (CLASSIFICATION_FALLBACK, FALLBACK_LABEL.to_string())
            }
        }
    }
}

/// Map a raw classifier label to a verdict. Anything mentioning `DOCUMENT`
/// selects grounding.
pub fn parse_verdict(label: &str) -> Verdict {
    if label.to_uppercase().contains("DOCUMENT") {
        Verdict::Grounded
    } else {
        Verdict::Direct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verdict_document() {
        assert_eq!(parse_verdict("DOCUMENT"), Verdict::Grounded);
        assert_eq!(parse_verdict("document"), Verdict::Grounded);
        assert_eq!(parse_verdict("\"DOCUMENT\"."), Verdict::Grounded);
    }

    #[test]
    fn test_parse_verdict_direct() {
        assert_eq!(parse_verdict("DIRECT"), Verdict::Direct);
        assert_eq!(parse_verdict("something else"), Verdict::Direct);
    }

    #[test]
    fn test_fallback_policy_is_grounded() {
        assert_eq!(CLASSIFICATION_FALLBACK, Verdict::Grounded);
    }
}
