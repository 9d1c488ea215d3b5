//! SQLite-backed [`VectorIndex`].
//!
//! Vectors are stored as little-endian `f32` BLOBs and scored in Rust with a
//! brute-force scan over the collection, which is plenty for a corpus of a
//! few thousand chunks.

use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::path::Path;
use tracing::debug;

use super::{check_query_dims, rank, CollectionInfo, Fingerprint, IndexEntry, VectorIndex};
use crate::config::Similarity;
use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{RagError, Result};
use crate::migrate;
use crate::models::SearchHit;

#[derive(Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Open (creating if needed) the index database and apply the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// ============ Row mapping ============

const COLLECTION_COLUMNS: &str = r#"
    c.name, c.model, c.dims, c.similarity, c.chunk_size, c.chunk_overlap, c.created_at,
    (SELECT COUNT(*) FROM entries e WHERE e.collection = c.name) AS entry_count
"#;

fn row_to_info(row: &SqliteRow) -> Result<CollectionInfo> {
    let name: String = row.get("name");
    let similarity_raw: String = row.get("similarity");
    let similarity = Similarity::parse(&similarity_raw).ok_or_else(|| {
        RagError::Internal(anyhow::anyhow!(
            "collection '{}' has unknown similarity '{}'",
            name,
            similarity_raw
        ))
    })?;

    Ok(CollectionInfo {
        fingerprint: Fingerprint {
            model: row.get("model"),
            dims: row.get::<i64, _>("dims") as usize,
            similarity,
            chunk_size: row.get::<i64, _>("chunk_size") as usize,
            overlap: row.get::<i64, _>("chunk_overlap") as usize,
        },
        created_at: row.get("created_at"),
        count: row.get("entry_count"),
        name,
    })
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn create_collection(
        &self,
        name: &str,
        fingerprint: &Fingerprint,
    ) -> Result<CollectionInfo> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO collections (name, model, dims, similarity, chunk_size, chunk_overlap, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(&fingerprint.model)
        .bind(fingerprint.dims as i64)
        .bind(fingerprint.similarity.as_str())
        .bind(fingerprint.chunk_size as i64)
        .bind(fingerprint.overlap as i64)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.collection(name)
            .await?
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))
    }

    async fn collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM collections c WHERE c.name = ?",
            COLLECTION_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_info).transpose()
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM collections c ORDER BY c.name",
            COLLECTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_info).collect()
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM entries WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        debug!(collection = name, existed = deleted > 0, "collection dropped");
        Ok(deleted > 0)
    }

    async fn upsert(&self, collection: &str, entry: &IndexEntry) -> Result<()> {
        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM collections WHERE name = ?")
                .bind(collection)
                .fetch_one(&self.pool)
                .await?;
        if !exists {
            return Err(RagError::CollectionNotFound(collection.to_string()));
        }

        let now = chrono::Utc::now().timestamp();
        let metadata_json = entry.metadata.to_string();

        // DO UPDATE keeps the row's seq, so re-upserts hold their position
        sqlx::query(
            r#"
            INSERT INTO entries (collection, chunk_id, source_path, chunk_index, text, hash,
                                 embedding, metadata_json, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection, chunk_id) DO UPDATE SET
                source_path = excluded.source_path,
                chunk_index = excluded.chunk_index,
                text = excluded.text,
                hash = excluded.hash,
                embedding = excluded.embedding,
                metadata_json = excluded.metadata_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(collection)
        .bind(&entry.chunk_id)
        .bind(&entry.source_path)
        .bind(entry.chunk_index)
        .bind(&entry.text)
        .bind(&entry.hash)
        .bind(vec_to_blob(&entry.vector))
        .bind(metadata_json)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let info = self
            .collection(collection)
            .await?
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;
        check_query_dims(&info, query)?;

        let rows = sqlx::query(
            r#"
            SELECT seq, chunk_id, source_path, chunk_index, text, embedding, metadata_json
            FROM entries
            WHERE collection = ?
            ORDER BY seq
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let candidates = rows.iter().map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let metadata_raw: String = row.get("metadata_json");
            let metadata = serde_json::from_str(&metadata_raw)
                .unwrap_or_else(|_| serde_json::Value::Object(Default::default()));
            (
                row.get::<i64, _>("seq"),
                blob_to_vec(&blob),
                SearchHit {
                    chunk_id: row.get("chunk_id"),
                    source_path: row.get("source_path"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    metadata,
                    score: 0.0,
                },
            )
        });

        let hits = rank(info.fingerprint.similarity, query, candidates, k);
        debug!(collection, scanned = rows.len(), returned = hits.len(), "vector search");
        Ok(hits)
    }

    async fn count(&self, collection: &str) -> Result<i64> {
        let info = self
            .collection(collection)
            .await?
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;
        Ok(info.count)
    }
}
