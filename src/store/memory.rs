//! In-memory [`VectorIndex`] for tests.
//!
//! Uses a `HashMap` of collections behind `std::sync::RwLock`. Nothing
//! survives the process; use [`SqliteIndex`](super::SqliteIndex) for
//! anything real.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{check_query_dims, rank, CollectionInfo, Fingerprint, IndexEntry, VectorIndex};
use crate::error::{RagError, Result};
use crate::models::SearchHit;

struct MemCollection {
    fingerprint: Fingerprint,
    created_at: i64,
    // (seq, entry), kept in insertion order
    entries: Vec<(i64, IndexEntry)>,
    next_seq: i64,
}

impl MemCollection {
    fn info(&self, name: &str) -> CollectionInfo {
        CollectionInfo {
            name: name.to_string(),
            fingerprint: self.fingerprint.clone(),
            created_at: self.created_at,
            count: self.entries.len() as i64,
        }
    }
}

#[derive(Default)]
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, MemCollection>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, MemCollection>>> {
        self.collections
            .read()
            .map_err(|_| RagError::Internal(anyhow::anyhow!("in-memory index lock poisoned")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, MemCollection>>> {
        self.collections
            .write()
            .map_err(|_| RagError::Internal(anyhow::anyhow!("in-memory index lock poisoned")))
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn create_collection(
        &self,
        name: &str,
        fingerprint: &Fingerprint,
    ) -> Result<CollectionInfo> {
        let mut collections = self.write()?;
        let coll = collections
            .entry(name.to_string())
            .or_insert_with(|| MemCollection {
                fingerprint: fingerprint.clone(),
                created_at: chrono::Utc::now().timestamp(),
                entries: Vec::new(),
                next_seq: 1,
            });
        Ok(coll.info(name))
    }

    async fn collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        Ok(self.read()?.get(name).map(|c| c.info(name)))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let collections = self.read()?;
        let mut infos: Vec<CollectionInfo> =
            collections.iter().map(|(name, c)| c.info(name)).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        Ok(self.write()?.remove(name).is_some())
    }

    async fn upsert(&self, collection: &str, entry: &IndexEntry) -> Result<()> {
        let mut collections = self.write()?;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

        if let Some(slot) = coll
            .entries
            .iter_mut()
            .find(|(_, e)| e.chunk_id == entry.chunk_id)
        {
            slot.1 = entry.clone();
        } else {
            let seq = coll.next_seq;
            coll.next_seq += 1;
            coll.entries.push((seq, entry.clone()));
        }
        Ok(())
    }

    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let collections = self.read()?;
        let coll = collections
            .get(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;
        check_query_dims(&coll.info(collection), query)?;

        let candidates = coll.entries.iter().map(|(seq, e)| {
            (
                *seq,
                e.vector.clone(),
                SearchHit {
                    chunk_id: e.chunk_id.clone(),
                    source_path: e.source_path.clone(),
                    chunk_index: e.chunk_index,
                    text: e.text.clone(),
                    metadata: e.metadata.clone(),
                    score: 0.0,
                },
            )
        });

        Ok(rank(coll.fingerprint.similarity, query, candidates, k))
    }

    async fn count(&self, collection: &str) -> Result<i64> {
        self.read()?
            .get(collection)
            .map(|c| c.entries.len() as i64)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Similarity;

    fn fingerprint(dims: usize) -> Fingerprint {
        Fingerprint {
            model: "test".into(),
            dims,
            similarity: Similarity::Cosine,
            chunk_size: 100,
            overlap: 10,
        }
    }

    fn entry(id: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk_id: id.to_string(),
            source_path: "doc.md".to_string(),
            chunk_index: 0,
            text: format!("text of {}", id),
            hash: String::new(),
            vector,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_chunk_id() {
        let index = InMemoryIndex::new();
        index.create_collection("kb", &fingerprint(2)).await.unwrap();
        index.upsert("kb", &entry("a", vec![1.0, 0.0])).await.unwrap();
        index.upsert("kb", &entry("b", vec![0.0, 1.0])).await.unwrap();
        index.upsert("kb", &entry("a", vec![0.0, 1.0])).await.unwrap();
        assert_eq!(index.count("kb").await.unwrap(), 2);

        // "a" now ties with "b" but was inserted first
        let hits = index.search("kb", &[0.0, 1.0], 5).await.unwrap();
        assert_eq!(hits[0].chunk_id, "a");
        assert_eq!(hits[1].chunk_id, "b");
    }

    #[tokio::test]
    async fn test_missing_collection_errors() {
        let index = InMemoryIndex::new();
        assert!(matches!(
            index.search("never", &[1.0], 3).await,
            Err(RagError::CollectionNotFound(_))
        ));
        assert!(matches!(
            index.count("never").await,
            Err(RagError::CollectionNotFound(_))
        ));
        assert!(matches!(
            index.upsert("never", &entry("a", vec![1.0])).await,
            Err(RagError::CollectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_is_get_or_create() {
        let index = InMemoryIndex::new();
        index.create_collection("kb", &fingerprint(2)).await.unwrap();
        let again = index.create_collection("kb", &fingerprint(8)).await.unwrap();
        assert_eq!(again.fingerprint.dims, 2);
        assert!(index.drop_collection("kb").await.unwrap());
        assert!(!index.drop_collection("kb").await.unwrap());
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let index = InMemoryIndex::new();
        index.create_collection("kb", &fingerprint(3)).await.unwrap();
        let err = index.search("kb", &[1.0, 0.0], 1).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingSpaceMismatch { .. }));
        assert!(err
            .to_string()
            .contains("collection has dims=3, current config has dims=2"));
    }
}
