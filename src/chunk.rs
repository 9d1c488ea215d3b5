//! Sentence-packing text chunker with overlap.
//!
//! Splits a [`RawDocument`] into [`Chunk`]s of at most `chunk_size`
//! characters, measured in `char`s. Splitting happens on sentence and
//! line boundaries so that no sentence is ever cut in half.
//!
//! # Algorithm
//!
//! 1. Partition the text into sentence segments. A segment ends after
//!    `.`, `!`, `?`, `؟` (when followed by whitespace or end of text) or a
//!    newline, and absorbs the whitespace that follows. Segments tile the
//!    text exactly.
//! 2. Greedily pack segments into a chunk until the next one would exceed
//!    `chunk_size`. A chunk always holds at least one segment, so a single
//!    sentence longer than `chunk_size` becomes its own oversized chunk.
//! 3. Start the next chunk at the earliest segment boundary that lies
//!    within `overlap` characters of the previous chunk's end and still
//!    leaves room for the next segment. Later boundaries give shorter
//!    overlaps; if none fits, the overlap is dropped for that step.
//!
//! Every chunk's `text` is an exact substring of the document, and its
//! first `overlap_with_prev` characters repeat the previous chunk's tail.
//!
//! # Example
//!
//! ```rust
//! use civic_rag::chunk::chunk_document;
//! use civic_rag::models::{ChunkConfig, DocumentFormat, RawDocument};
//!
//! let doc = RawDocument {
//!     source_path: "residency.md".into(),
//!     format: DocumentFormat::Markdown,
//!     content: "Bring a lease contract. Bring a utility bill.".into(),
//! };
//! let cfg = ChunkConfig { chunk_size: 1024, overlap: 200 };
//! let chunks = chunk_document(&doc, cfg).unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].overlap_with_prev, 0);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::{Chunk, ChunkConfig, RawDocument};

/// Split a document into overlapping chunks.
///
/// Returns an empty vector for documents with no non-whitespace content.
pub fn chunk_document(doc: &RawDocument, config: ChunkConfig) -> Result<Vec<Chunk>> {
    validate_config(config)?;

    let text = doc.content.as_str();
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let spans = split_sentences(text);
    let n = spans.len();

    // prefix[i] = chars in segments [0, i)
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0usize);
    for &(a, b) in &spans {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + text[a..b].chars().count());
    }
    let chars_between = |from: usize, to: usize| prefix[to] - prefix[from];

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut overlap_chars = 0usize;

    loop {
        let mut end = start + 1;
        while end < n && chars_between(start, end + 1) <= config.chunk_size {
            end += 1;
        }

        let body = &text[spans[start].0..spans[end - 1].1];
        chunks.push(make_chunk(
            &doc.source_path,
            chunks.len() as i64,
            body,
            overlap_chars,
        ));

        if end == n {
            break;
        }

        // Longest tail within `overlap` that still leaves room for the
        // next segment; none means no overlap for this step.
        let mut next = end;
        for j in (start + 1)..end {
            if chars_between(j, end) <= config.overlap
                && chars_between(j, end + 1) <= config.chunk_size
            {
                next = j;
                break;
            }
        }

        overlap_chars = chars_between(next, end);
        start = next;
    }

    Ok(chunks)
}

/// Reject size/overlap combinations the chunker cannot make progress with.
pub fn validate_config(config: ChunkConfig) -> Result<()> {
    if config.chunk_size == 0 {
        return Err(RagError::InvalidChunkConfig(
            "chunk_size must be > 0".to_string(),
        ));
    }
    if config.overlap >= config.chunk_size {
        return Err(RagError::InvalidChunkConfig(format!(
            "overlap ({}) must be smaller than chunk_size ({})",
            config.overlap, config.chunk_size
        )));
    }
    Ok(())
}

/// Partition `text` into byte spans, one per sentence or line, including
/// trailing whitespace. The spans are contiguous and cover the whole text.
fn split_sentences(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let terminator = matches!(c, '.' | '!' | '?' | '؟' | '\n');
        if !terminator {
            continue;
        }
        if c != '\n' {
            match chars.peek() {
                None => {}
                Some((_, next)) if next.is_whitespace() => {}
                Some(_) => continue,
            }
        }

        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if !next.is_whitespace() {
                break;
            }
            end = j + next.len_utf8();
            chars.next();
        }

        spans.push((start, end));
        start = end;
    }

    if start < text.len() {
        spans.push((start, text.len()));
    }

    spans
}

/// Stable chunk id: the same path and index always map to the same UUID.
pub fn chunk_id(source_path: &str, index: i64) -> String {
    let name = format!("{}#{}", source_path, index);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

fn make_chunk(source_path: &str, index: i64, text: &str, overlap_with_prev: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        chunk_id: chunk_id(source_path, index),
        source_path: source_path.to_string(),
        index,
        text: text.to_string(),
        overlap_with_prev,
        hash,
    }
}
