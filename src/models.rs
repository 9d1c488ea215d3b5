//! Core data models used throughout the pipeline.
//!
//! These types flow between the stages: the loader produces
//! [`RawDocument`]s, the chunker turns them into [`Chunk`]s, the vector
//! index returns [`SearchHit`]s, and the query engine assembles a
//! [`QueryResult`].

use serde::Serialize;

/// Format of a corpus file, inferred from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Structured records (`.json`).
    Structured,
    /// Free-form notes (`.md`, `.txt`, anything else readable as text).
    Markdown,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Self {
        if ext.eq_ignore_ascii_case("json") {
            DocumentFormat::Structured
        } else {
            DocumentFormat::Markdown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Structured => "structured",
            DocumentFormat::Markdown => "markdown",
        }
    }
}

/// A file read from the corpus, before chunking.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Path relative to the corpus root, `/`-separated.
    pub source_path: String,
    pub format: DocumentFormat,
    pub content: String,
}

/// Chunk sizing in characters. Recorded per collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

/// A contiguous slice of a document's text.
///
/// `text` is an exact substring of the document content. The first
/// `overlap_with_prev` characters of `text` repeat the tail of the
/// previous chunk, so dropping them and concatenating reconstructs the
/// document.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Deterministic id derived from `source_path` and `index`.
    pub chunk_id: String,
    pub source_path: String,
    pub index: i64,
    pub text: String,
    pub overlap_with_prev: usize,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// A ranked entry returned from vector search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub source_path: String,
    pub chunk_index: i64,
    pub text: String,
    pub metadata: serde_json::Value,
    pub score: f32,
}

/// Outcome of a full query: the ranked context and the generated answer.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub question: String,
    /// Most similar first.
    pub retrieved_chunks: Vec<SearchHit>,
    pub answer: String,
}

impl QueryResult {
    /// Distinct source paths in rank order.
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for hit in &self.retrieved_chunks {
            if !sources.contains(&hit.source_path) {
                sources.push(hit.source_path.clone());
            }
        }
        sources
    }
}

/// Caller-facing answer shape.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<String>,
}

impl From<QueryResult> for Answer {
    fn from(result: QueryResult) -> Self {
        let sources = result.sources();
        Answer {
            answer: result.answer,
            sources,
        }
    }
}

/// Summary of an index build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub documents_loaded: usize,
    pub chunks_indexed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(path: &str, score: f32) -> SearchHit {
        SearchHit {
            chunk_id: format!("{}#0", path),
            source_path: path.to_string(),
            chunk_index: 0,
            text: String::new(),
            metadata: serde_json::json!({}),
            score,
        }
    }

    #[test]
    fn test_sources_are_deduplicated_in_rank_order() {
        let result = QueryResult {
            question: "q".into(),
            retrieved_chunks: vec![hit("b.md", 0.9), hit("a.json", 0.8), hit("b.md", 0.7)],
            answer: "a".into(),
        };
        assert_eq!(result.sources(), vec!["b.md", "a.json"]);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            DocumentFormat::from_extension("JSON"),
            DocumentFormat::Structured
        );
        assert_eq!(
            DocumentFormat::from_extension("md"),
            DocumentFormat::Markdown
        );
    }
}
