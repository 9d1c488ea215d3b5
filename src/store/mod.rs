//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the only way the builder and the query
//! engine touch persisted vectors. Entries live in named collections; each
//! collection records the [`Fingerprint`] of the embedding space and chunk
//! regime it was built with.
//!
//! | Implementation | Backing |
//! |----------------|---------|
//! | [`SqliteIndex`] | SQLite file at `[db].path` (durable) |
//! | [`InMemoryIndex`] | `HashMap` behind a `RwLock` (tests) |
//!
//! # Ranking
//!
//! Search is an exhaustive scan scored with the collection's similarity
//! metric. Results are ordered by score descending; equal scores keep
//! insertion order. Re-upserting a chunk id keeps its original position.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryIndex;
pub use sqlite::SqliteIndex;

use async_trait::async_trait;

use crate::config::Similarity;
use crate::embedding::similarity;
use crate::error::{RagError, Result};
use crate::models::SearchHit;

/// What a collection's vectors are comparable with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub model: String,
    pub dims: usize,
    pub similarity: Similarity,
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Fingerprint {
    pub fn describe(&self) -> String {
        format!(
            "model={} dims={} similarity={} chunk_size={} overlap={}",
            self.model,
            self.dims,
            self.similarity.as_str(),
            self.chunk_size,
            self.overlap
        )
    }
}

/// Collection metadata plus its current size.
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub name: String,
    pub fingerprint: Fingerprint,
    pub created_at: i64,
    pub count: i64,
}

/// One persisted chunk.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub source_path: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
    pub vector: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// Persistent store of chunk vectors, keyed by collection.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_collection`](VectorIndex::create_collection) | Get-or-create a collection |
/// | [`collection`](VectorIndex::collection) | Look up metadata |
/// | [`list_collections`](VectorIndex::list_collections) | All collections |
/// | [`drop_collection`](VectorIndex::drop_collection) | Delete a collection and its entries |
/// | [`upsert`](VectorIndex::upsert) | Insert or replace an entry by chunk id |
/// | [`search`](VectorIndex::search) | Top-k nearest entries |
/// | [`count`](VectorIndex::count) | Number of entries |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if absent. An existing collection is returned
    /// unchanged, including its original fingerprint.
    async fn create_collection(&self, name: &str, fingerprint: &Fingerprint)
        -> Result<CollectionInfo>;

    async fn collection(&self, name: &str) -> Result<Option<CollectionInfo>>;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    /// Returns `true` if the collection existed.
    async fn drop_collection(&self, name: &str) -> Result<bool>;

    /// Insert or replace the entry with `entry.chunk_id`.
    ///
    /// Fails with [`RagError::CollectionNotFound`] if the collection does
    /// not exist.
    async fn upsert(&self, collection: &str, entry: &IndexEntry) -> Result<()>;

    /// Up to `k` entries most similar to `query`, best first.
    ///
    /// Fails with [`RagError::CollectionNotFound`] if the collection does
    /// not exist, and [`RagError::EmbeddingSpaceMismatch`] if `query` has
    /// a different dimensionality than the collection.
    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    async fn count(&self, collection: &str) -> Result<i64>;
}

/// Reject query vectors that cannot live in the collection's space.
pub(crate) fn check_query_dims(info: &CollectionInfo, query: &[f32]) -> Result<()> {
    if query.len() != info.fingerprint.dims {
        return Err(RagError::EmbeddingSpaceMismatch {
            collection: info.name.clone(),
            expected: format!("dims={}", query.len()),
            found: format!("dims={}", info.fingerprint.dims),
        });
    }
    Ok(())
}

/// A scored candidate carrying its insertion sequence for tie-breaking.
pub(crate) struct Scored {
    pub seq: i64,
    pub hit: SearchHit,
}

/// Score candidates against `query` and keep the best `k`.
pub(crate) fn rank<I>(metric: Similarity, query: &[f32], candidates: I, k: usize) -> Vec<SearchHit>
where
    I: IntoIterator<Item = (i64, Vec<f32>, SearchHit)>,
{
    let mut scored: Vec<Scored> = candidates
        .into_iter()
        .map(|(seq, vector, mut hit)| {
            hit.score = similarity(metric, query, &vector);
            Scored { seq, hit }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.hit
            .score
            .total_cmp(&a.hit.score)
            .then(a.seq.cmp(&b.seq))
    });
    scored.truncate(k);

    scored.into_iter().map(|s| s.hit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(seq: i64, id: &str, vector: Vec<f32>) -> (i64, Vec<f32>, SearchHit) {
        (
            seq,
            vector,
            SearchHit {
                chunk_id: id.to_string(),
                source_path: format!("{}.md", id),
                chunk_index: 0,
                text: String::new(),
                metadata: serde_json::json!({}),
                score: 0.0,
            },
        )
    }

    #[test]
    fn test_rank_orders_by_score_then_insertion() {
        let q = vec![1.0, 0.0];
        let hits = rank(
            Similarity::Cosine,
            &q,
            vec![
                candidate(3, "late-tie", vec![1.0, 0.0]),
                candidate(1, "low", vec![0.0, 1.0]),
                candidate(2, "early-tie", vec![2.0, 0.0]),
            ],
            10,
        );
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["early-tie", "late-tie", "low"]);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_rank_truncates_to_k() {
        let q = vec![1.0];
        let hits = rank(
            Similarity::Dot,
            &q,
            (0..10).map(|i| candidate(i, &format!("c{}", i), vec![i as f32])),
            3,
        );
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].chunk_id, "c9");
        assert_eq!(hits[0].score, 9.0);
    }

    #[test]
    fn test_rank_tolerates_nan_scores() {
        let q = vec![1.0];
        let hits = rank(
            Similarity::Dot,
            &q,
            vec![
                candidate(1, "low", vec![1.0]),
                candidate(2, "nan", vec![f32::NAN]),
                candidate(3, "high", vec![5.0]),
            ],
            10,
        );
        assert_eq!(hits.len(), 3);
        let finite: Vec<&str> = hits
            .iter()
            .filter(|h| !h.score.is_nan())
            .map(|h| h.chunk_id.as_str())
            .collect();
        assert_eq!(finite, vec!["high", "low"]);
    }
}
