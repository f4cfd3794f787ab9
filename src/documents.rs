//! Document collection scanning and the ingestion pipeline.
//!
//! Scanning walks the configured root with include/exclude globs and
//! returns entries in deterministic path order. A missing root is an empty
//! collection, never a fatal error.
//!
//! Ingestion coordinates the full flow: scan → load → chunk → batch embed
//! (degraded per item) → index append → snapshot save. Unreadable files are
//! skipped with a warning; embedding failures surface as zero vectors, so a
//! flaky embedding service can never abort a run.
//!
//! File-type text extraction is delegated upstream: only plain-text formats
//! are loaded here, which is why the default include globs are `*.txt` and
//! `*.md`.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::chunk::chunk_document;
use crate::config::{Config, DocumentsConfig};
use crate::embedding::EmbeddingCache;
use crate::index::VectorIndex;
use crate::models::DocumentInfo;

/// Counters reported after an ingestion run.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestSummary {
    pub documents: usize,
    pub chunks: usize,
    pub embedded: usize,
    /// Chunks whose embedding failed and were substituted with zero vectors.
    pub degraded: usize,
}

/// Enumerate supported files under the configured root in path order.
///
/// A missing root yields an empty collection.
pub fn scan_documents(config: &DocumentsConfig) -> Result<Vec<DocumentInfo>> {
    if !config.root.exists() {
        return Ok(Vec::new());
    }

    let include_set = build_globset(&config.include_globs)?;
    let exclude_set = build_globset(&config.exclude_globs)?;

    let mut documents = Vec::new();
    for entry in WalkDir::new(&config.root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(&config.root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        documents.push(DocumentInfo {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| rel_str.clone()),
            path: path.to_string_lossy().to_string(),
            r#type: path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default(),
        });
    }

    // Sort for deterministic ordering
    documents.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(documents)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob: {pattern}"))?);
    }
    Ok(builder.build()?)
}

/// Run the ingestion pipeline over the document collection.
///
/// With `dry_run` set, documents are scanned and chunked but nothing is
/// embedded, indexed, or saved.
pub async fn ingest(
    config: &Config,
    cache: &EmbeddingCache,
    index: &VectorIndex,
    dir_override: Option<&Path>,
    dry_run: bool,
) -> Result<IngestSummary> {
    let docs_config = match dir_override {
        Some(dir) => DocumentsConfig {
            root: dir.to_path_buf(),
            ..config.documents.clone()
        },
        None => config.documents.clone(),
    };

    let documents = scan_documents(&docs_config)?;
    let mut summary = IngestSummary::default();

    for doc in &documents {
        let text = match std::fs::read_to_string(&doc.path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %doc.path, error = %e, "skipping unreadable document");
                continue;
            }
        };

        let chunks = chunk_document(&doc.name, text.trim(), &config.chunking);
        if chunks.is_empty() {
            continue;
        }

        summary.documents += 1;
        summary.chunks += chunks.len();

        if dry_run {
            continue;
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = cache
            .batch_get_or_compute(&texts, config.llm.batch_size)
            .await;

        let degraded = vectors
            .iter()
            .filter(|v| v.iter().all(|x| *x == 0.0))
            .count();
        summary.degraded += degraded;
        summary.embedded += vectors.len() - degraded;

        index.append(vectors, chunks).map_err(anyhow::Error::new)?;
        tracing::info!(document = %doc.name, "indexed document");
    }

    if !dry_run && summary.documents > 0 {
        index.save(&config.index.path).map_err(anyhow::Error::new)?;
    }

    Ok(summary)
}
