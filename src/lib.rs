//! Dossier: a document-grounded question-answering service.
//!
//! Dossier ingests a local document collection, chunks and embeds it into a
//! persistent vector index, and answers queries over HTTP or the CLI. Each
//! query is classified first: queries about the collection are grounded in
//! retrieved chunks, everything else is answered directly from the model's
//! general knowledge.
//!
//! # Architecture
//!
//! ```text
//!   documents/ ──> chunk ──> embedding cache ──> vector index
//!                                                    │
//!   query ──> agent ──> classify ──> retrieve ───────┘
//!               │           │
//!               │           └──> direct answer (no retrieval)
//!               │
//!               └──> session store (conversation memory)
//! ```
//!
//! # Modules
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`config`] | TOML configuration with defaults and validation |
//! | [`error`] | Typed error taxonomy shared across the pipeline |
//! | [`models`] | Core data types (chunks, sessions, query outcomes) |
//! | [`chunk`] | Recursive text splitting with overlap |
//! | [`embedding`] | Embedding client trait, HTTP client, and cache |
//! | [`index`] | Exhaustive vector index with paired snapshots |
//! | [`retrieval`] | Threshold-filtered retrieval over the index |
//! | [`session`] | Conversation sessions with lazy idle expiry |
//! | [`llm`] | Chat client trait and the two prompt shapes |
//! | [`agent`] | Per-query orchestration |
//! | [`documents`] | Collection scanning and the ingestion pipeline |
//! | [`server`] | Axum HTTP API |

pub mod agent;
pub mod chunk;
pub mod config;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod index;
pub mod llm;
pub mod models;
pub mod retrieval;
pub mod server;
pub mod session;
