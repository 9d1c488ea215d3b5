//! Error taxonomy for the retrieval pipeline.
//!
//! Library entry points (loader, chunker, embedding adapter, vector index,
//! builder, query engine) return [`RagError`] so callers can distinguish a
//! misconfigured corpus from an unreachable model endpoint or a collection
//! that was never built. The CLI layer wraps these in `anyhow`.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error for pipeline operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// The corpus root directory does not exist.
    #[error("corpus directory not found: {}", path.display())]
    CorpusNotFound { path: PathBuf },

    /// The embedding backend could not produce vectors (unreachable,
    /// non-2xx, malformed response, wrong dimensionality, or disabled).
    #[error("embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The collection has never been built (or the name is misconfigured).
    #[error("collection not found: '{0}' (run `civic build` first)")]
    CollectionNotFound(String),

    /// The generation call exceeded the caller-side timeout.
    #[error("generation timed out after {secs}s")]
    GenerationTimeout { secs: u64 },

    /// Any other generation failure (transport, HTTP status, decode).
    #[error("generation failed: {0}")]
    Generation(String),

    /// The collection was built in a different embedding space than the
    /// one currently configured.
    #[error(
        "embedding space mismatch for collection '{collection}': \
         collection has {found}, current config has {expected} (rebuild with --reset)"
    )]
    EmbeddingSpaceMismatch {
        collection: String,
        expected: String,
        found: String,
    },

    /// Chunk size / overlap combination that cannot make progress.
    #[error("invalid chunk config: {0}")]
    InvalidChunkConfig(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RagError {
    /// Whether a caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::GenerationTimeout { .. } | RagError::EmbeddingUnavailable(_)
        )
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RagError::GenerationTimeout { secs: 180 }.is_retryable());
        assert!(RagError::EmbeddingUnavailable("down".into()).is_retryable());
        assert!(!RagError::CollectionNotFound("kb".into()).is_retryable());
        assert!(!RagError::CorpusNotFound {
            path: PathBuf::from("/nope")
        }
        .is_retryable());
    }

    #[test]
    fn test_messages_name_the_subject() {
        let e = RagError::CollectionNotFound("public_services_kb".into());
        assert!(e.to_string().contains("public_services_kb"));

        let e = RagError::CorpusNotFound {
            path: PathBuf::from("/srv/kb"),
        };
        assert!(e.to_string().contains("/srv/kb"));
    }
}
