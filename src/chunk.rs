//! Recursive separator-cascade text chunker.
//!
//! Splits document body text into [`Chunk`]s targeting a configured
//! `chunk_size`, with `chunk_overlap` characters of best-effort shared
//! context between adjacent chunks.
//!
//! # Algorithm
//!
//! 1. Split on the coarsest separator that keeps pieces within `chunk_size`:
//!    paragraph (`\n\n`) → line (`\n`) → sentence (`. `) → word (` `),
//!    falling back to a per-character split for unbreakable runs.
//! 2. Separators stay attached to the preceding piece, so no content is
//!    dropped when pieces are reassembled.
//! 3. Merge pieces into chunks up to `chunk_size`; when a chunk is flushed,
//!    trailing pieces totalling at most `chunk_overlap` characters are
//!    carried into the next chunk.
//!
//! Overlap is best-effort at the nearest separator boundary, not an exact
//! character count. Sizes are measured in characters, not bytes.
//!
//! # Guarantees
//!
//! - Empty input yields no chunks; input within `chunk_size` yields one.
//! - Every character of the input appears in at least one chunk, in order.
//! - Chunk indices are contiguous: `0, 1, 2, …, N-1`.

use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Separator cascade, coarsest first. Character-level splitting is the
/// implicit final fallback.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split text into overlapping segments.
///
/// Requires `chunk_size > chunk_overlap`; the configured values are
/// validated at load time and re-asserted here.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    assert!(
        chunk_size > chunk_overlap,
        "chunk_size must exceed chunk_overlap"
    );

    if text.is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    collect_pieces(text, 0, chunk_size, &mut pieces);
    merge_pieces(&pieces, chunk_size, chunk_overlap)
}

/// Split `text` and wrap the segments into [`Chunk`]s for one source document.
pub fn chunk_document(source: &str, text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let segments = split_text(text, config.chunk_size, config.chunk_overlap);
    let total = segments.len();

    segments
        .into_iter()
        .enumerate()
        .map(|(i, segment)| Chunk {
            id: Uuid::new_v4().to_string(),
            text: segment,
            source: source.to_string(),
            chunk_index: i,
            total_chunks: total,
        })
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Recursively break `text` into pieces no longer than `chunk_size` chars,
/// descending the separator cascade only for oversized fragments.
fn collect_pieces<'a>(
    text: &'a str,
    sep_index: usize,
    chunk_size: usize,
    out: &mut Vec<&'a str>,
) {
    if char_len(text) <= chunk_size {
        if !text.is_empty() {
            out.push(text);
        }
        return;
    }

    if sep_index >= SEPARATORS.len() {
        // Unbreakable run: hard split at char boundaries.
        let mut remaining = text;
        while char_len(remaining) > chunk_size {
            let split_at = remaining
                .char_indices()
                .nth(chunk_size)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
            out.push(&remaining[..split_at]);
            remaining = &remaining[split_at..];
        }
        if !remaining.is_empty() {
            out.push(remaining);
        }
        return;
    }

    let sep = SEPARATORS[sep_index];
    if !text.contains(sep) {
        collect_pieces(text, sep_index + 1, chunk_size, out);
        return;
    }

    // split_inclusive keeps the separator at the end of each part, so the
    // original text is exactly the concatenation of the parts.
    for part in text.split_inclusive(sep) {
        if char_len(part) <= chunk_size {
            out.push(part);
        } else {
            collect_pieces(part, sep_index + 1, chunk_size, out);
        }
    }
}

/// Merge ordered pieces into chunks, retaining a tail of up to
/// `chunk_overlap` characters when a chunk is flushed.
fn merge_pieces(pieces: &[&str], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: Vec<&str> = Vec::new();
    let mut window_len = 0usize;

    for &piece in pieces {
        let piece_len = char_len(piece);

        if window_len + piece_len > chunk_size && !window.is_empty() {
            chunks.push(window.concat());

            // Keep a suffix of the window as overlap, dropping from the
            // front until the retained tail fits the overlap budget and
            // leaves room for the incoming piece.
            while window_len > chunk_overlap
                || (window_len + piece_len > chunk_size && window_len > 0)
            {
                window_len -= char_len(window.remove(0));
            }
        }

        window.push(piece);
        window_len += piece_len;
    }

    if !window.is_empty() {
        chunks.push(window.concat());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(split_text("", 100, 20).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_text("Hello, world!", 100, 20);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_paragraphs_split_before_lines() {
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird paragraph here.";
        let chunks = split_text(text, 30, 0);
        assert!(chunks.len() >= 3);
        assert!(chunks[0].contains("First paragraph"));
        assert!(chunks.last().unwrap().contains("Third paragraph"));
    }

    #[test]
    fn test_full_coverage_no_gaps() {
        // Distinct words so each chunk occurs at exactly one position.
        let text = (0..120)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = split_text(&text, 50, 10);
        assert!(chunks.len() > 1);

        let mut prev_end = 0usize;
        for (i, chunk) in chunks.iter().enumerate() {
            let start = text.find(chunk.as_str()).unwrap();
            if i == 0 {
                assert_eq!(start, 0);
            } else {
                assert!(start <= prev_end, "gap before chunk {i}");
            }
            let end = start + chunk.len();
            assert!(end > prev_end || i == chunks.len() - 1);
            prev_end = end;
        }
        assert_eq!(prev_end, text.len(), "tail of input not covered");
    }

    #[test]
    fn test_overlap_carries_shared_context() {
        let text = (0..40)
            .map(|i| format!("tok{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = split_text(&text, 40, 15);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let tail_word = pair[0].split_whitespace().last().unwrap();
            assert!(
                pair[1].contains(tail_word),
                "chunk did not carry overlap: {:?} -> {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_unbreakable_run_hard_split() {
        let text = "x".repeat(95);
        let chunks = split_text(&text, 30, 5);
        assert!(chunks.len() >= 3);
        let joined: String = chunks.concat();
        // No separators to overlap on, so the hard split is exact.
        assert_eq!(joined, text);
    }

    #[test]
    fn test_multibyte_chars_respected() {
        let text = "héllo wörld ".repeat(20);
        let chunks = split_text(&text, 25, 5);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.chars().count() <= 25);
        }
    }

    #[test]
    fn test_chunk_document_metadata() {
        let config = ChunkingConfig {
            chunk_size: 30,
            chunk_overlap: 5,
        };
        let text = "Alpha section.\n\nBeta section.\n\nGamma section.";
        let chunks = chunk_document("notes.txt", text, &config);
        assert!(!chunks.is_empty());
        let total = chunks.len();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.total_chunks, total);
            assert_eq!(c.source, "notes.txt");
            assert!(!c.id.is_empty());
        }
    }

    #[test]
    #[should_panic(expected = "chunk_size must exceed chunk_overlap")]
    fn test_invalid_overlap_panics() {
        split_text("some text", 10, 10);
    }
}
