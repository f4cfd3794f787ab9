//! Append-only vector index with exhaustive search and paired snapshots.
//!
//! The index holds `(vector, chunk)` pairs behind a `RwLock`. Serving is
//! read-mostly; ingestion appends. A search observes either the pre-append
//! or the fully post-append state, never a partially written vector.
//!
//! # Search
//!
//! `search(query, k)` computes squared Euclidean distance from the query to
//! every stored vector — an exact exhaustive scan, no approximation — and
//! returns the `k` smallest with their positions. Ties are broken by
//! insertion order (earliest-inserted wins). An index of size `n < k`
//! returns exactly `n` results.
//!
//! # Snapshots
//!
//! A snapshot is a pair of artifacts in one directory:
//!
//! - `vectors.bin` — `dims: u32 LE`, `count: u32 LE`, then `count × dims`
//!   little-endian `f32` values
//! - `chunks.json` — the chunk metadata, in the same order
//!
//! The pair is written to temp files and renamed into place, and must load
//! as one unit: both missing (or either missing) falls back to a fresh
//! empty index; a corrupt or mismatched pair is a [`Error::Persistence`],
//! fatal at startup only.

use std::path::Path;
use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::{Chunk, IndexStats};

const VECTORS_FILE: &str = "vectors.bin";
const CHUNKS_FILE: &str = "chunks.json";

#[derive(Debug)]
struct IndexEntry {
    vector: Vec<f32>,
    chunk: Chunk,
}

/// Append-only store of `(vector, chunk)` pairs with exhaustive search.
#[derive(Debug)]
pub struct VectorIndex {
    dims: usize,
    entries: RwLock<Vec<IndexEntry>>,
}

/// One search hit: the entry's insertion position and its squared distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub position: usize,
    pub distance: f32,
}

impl VectorIndex {
    /// Create an empty index for vectors of dimension `dims`.
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            chunks: self.len(),
            dims: self.dims,
        }
    }

    /// Append `(vector, chunk)` pairs. Insertion order is preserved and is
    /// the tie-break key for search; there is no update or delete.
    pub fn append(&self, vectors: Vec<Vec<f32>>, chunks: Vec<Chunk>) -> Result<()> {
        if vectors.len() != chunks.len() {
            return Err(Error::Validation(format!(
                "vector/chunk count mismatch: {} vs {}",
                vectors.len(),
                chunks.len()
            )));
        }
        for v in &vectors {
            if v.len() != self.dims {
                return Err(Error::Validation(format!(
                    "vector dimension {} does not match index dimension {}",
                    v.len(),
                    self.dims
                )));
            }
        }

        let mut entries = self.entries.write().unwrap();
        for (vector, chunk) in vectors.into_iter().zip(chunks) {
            entries.push(IndexEntry { vector, chunk });
        }
        Ok(())
    }

    /// Exhaustive scan: the `k` smallest squared Euclidean distances, ties
    /// broken by insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let entries = self.entries.read().unwrap();

        let mut hits: Vec<SearchHit> = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| SearchHit {
                position,
                distance: squared_distance(query, &entry.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k);
        hits
    }

    /// Fetch the chunk stored at an insertion position.
    pub fn chunk_at(&self, position: usize) -> Option<Chunk> {
        self.entries
            .read()
            .unwrap()
            .get(position)
            .map(|e| e.chunk.clone())
    }

    /// Save the snapshot pair atomically (temp file + rename).
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::Persistence(format!("create {}: {}", dir.display(), e)))?;

        let entries = self.entries.read().unwrap();

        let mut blob = Vec::with_capacity(8 + entries.len() * self.dims * 4);
        blob.extend_from_slice(&(self.dims as u32).to_le_bytes());
        blob.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for entry in entries.iter() {
            for &v in &entry.vector {
                blob.extend_from_slice(&v.to_le_bytes());
            }
        }

        let chunks: Vec<&Chunk> = entries.iter().map(|e| &e.chunk).collect();
        let chunks_json = serde_json::to_vec(&chunks)
            .map_err(|e| Error::Persistence(format!("encode chunks: {}", e)))?;

        write_atomic(&dir.join(VECTORS_FILE), &blob)?;
        write_atomic(&dir.join(CHUNKS_FILE), &chunks_json)?;
        Ok(())
    }

    /// Load a snapshot pair, or start fresh when the pair is absent.
    ///
    /// A missing file (either one) yields a fresh empty index. A corrupt or
    /// mismatched pair is treated as corruption and fails, which aborts
    /// startup — serving never loads a partial snapshot.
    pub fn load(dir: &Path, dims: usize) -> Result<Self> {
        let vectors_path = dir.join(VECTORS_FILE);
        let chunks_path = dir.join(CHUNKS_FILE);

        if !vectors_path.exists() || !chunks_path.exists() {
            return Ok(Self::new(dims));
        }

        let blob = std::fs::read(&vectors_path)
            .map_err(|e| Error::Persistence(format!("read {}: {}", vectors_path.display(), e)))?;
        let chunks_json = std::fs::read(&chunks_path)
            .map_err(|e| Error::Persistence(format!("read {}: {}", chunks_path.display(), e)))?;

        if blob.len() < 8 {
            return Err(Error::Persistence("vector snapshot truncated".to_string()));
        }
        let stored_dims = u32::from_le_bytes([blob[0], blob[1], blob[2], blob[3]]) as usize;
        let count = u32::from_le_bytes([blob[4], blob[5], blob[6], blob[7]]) as usize;

        if stored_dims != dims {
            return Err(Error::Persistence(format!(
                "snapshot dimension {} does not match configured dimension {}",
                stored_dims, dims
            )));
        }
        let expected_bytes = 8 + count * dims * 4;
        if blob.len() != expected_bytes {
            return Err(Error::Persistence(format!(
                "vector snapshot has {} bytes, expected {}",
                blob.len(),
                expected_bytes
            )));
        }

        let chunks: Vec<Chunk> = serde_json::from_slice(&chunks_json)
            .map_err(|e| Error::Persistence(format!("decode chunks: {}", e)))?;
        if chunks.len() != count {
            return Err(Error::Persistence(format!(
                "snapshot pair mismatch: {} vectors, {} chunks",
                count,
                chunks.len()
            )));
        }

        let mut entries = Vec::with_capacity(count);
        for (i, chunk) in chunks.into_iter().enumerate() {
            let start = 8 + i * dims * 4;
            let vector: Vec<f32> = blob[start..start + dims * 4]
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            entries.push(IndexEntry { vector, chunk });
        }

        Ok(Self {
            dims,
            entries: RwLock::new(entries),
        })
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)
        .map_err(|e| Error::Persistence(format!("write {}: {}", tmp.display(), e)))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| Error::Persistence(format!("rename {}: {}", path.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, index: usize) -> Chunk {
        Chunk {
            id: format!("{source}-{index}"),
            text: format!("chunk {index} of {source}"),
            source: source.to_string(),
            chunk_index: index,
            total_chunks: 1,
        }
    }

    #[test]
    fn test_search_smaller_index_than_k() {
        let index = VectorIndex::new(2);
        index
            .append(vec![vec![0.0, 0.0], vec![1.0, 1.0]], vec![chunk("a", 0), chunk("a", 1)])
            .unwrap();

        let hits = index.search(&[0.0, 0.0], 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[0].distance, 0.0);
    }

    #[test]
    fn test_tie_break_prefers_earliest_inserted() {
        let index = VectorIndex::new(2);
        index
            .append(
                vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![5.0, 5.0]],
                vec![chunk("a", 0), chunk("b", 0), chunk("c", 0)],
            )
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits[0].position, 0, "earliest insertion wins the tie");
        assert_eq!(hits[1].position, 1);
        assert_eq!(hits[0].distance, hits[1].distance);
    }

    #[test]
    fn test_append_rejects_wrong_dimension() {
        let index = VectorIndex::new(3);
        let err = index
            .append(vec![vec![1.0, 2.0]], vec![chunk("a", 0)])
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_append_rejects_unpaired_input() {
        let index = VectorIndex::new(2);
        let err = index.append(vec![vec![1.0, 2.0]], vec![]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = VectorIndex::new(3);
        index
            .append(
                vec![vec![1.0, 2.0, 3.0], vec![-1.0, 0.5, 0.0]],
                vec![chunk("notes.txt", 0), chunk("notes.txt", 1)],
            )
            .unwrap();
        index.save(tmp.path()).unwrap();

        let restored = VectorIndex::load(tmp.path(), 3).unwrap();
        assert_eq!(restored.len(), 2);

        let hits = restored.search(&[1.0, 2.0, 3.0], 1);
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[0].distance, 0.0);
        assert_eq!(restored.chunk_at(1).unwrap().chunk_index, 1);
    }

    #[test]
    fn test_missing_pair_falls_back_to_fresh() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = VectorIndex::load(tmp.path(), 4).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dims(), 4);
    }

    #[test]
    fn test_half_missing_pair_falls_back_to_fresh() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join(VECTORS_FILE), b"garbage").unwrap();
        // chunks.json absent: treat as no snapshot, not corruption.
        let index = VectorIndex::load(tmp.path(), 4).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_corrupt_pair_is_persistence_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join(VECTORS_FILE), b"garbage").unwrap();
        std::fs::write(tmp.path().join(CHUNKS_FILE), b"[]").unwrap();
        let err = VectorIndex::load(tmp.path(), 4).unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[test]
    fn test_mismatched_pair_is_persistence_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = VectorIndex::new(2);
        index
            .append(vec![vec![1.0, 2.0]], vec![chunk("a", 0)])
            .unwrap();
        index.save(tmp.path()).unwrap();
        // Overwrite the chunk sidecar with an empty list.
        std::fs::write(tmp.path().join(CHUNKS_FILE), b"[]").unwrap();
        let err = VectorIndex::load(tmp.path(), 2).unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }
}
