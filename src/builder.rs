//! Index builder.
//!
//! Runs the offline pipeline: loader → chunker → embedding adapter →
//! vector index. A build is idempotent per collection: chunk ids are
//! derived from path and position, so rerunning on an unchanged corpus
//! overwrites every entry in place.
//!
//! # Failure semantics
//!
//! The corpus is loaded, the chunk config validated and the first batch
//! embedded before the index is touched, so a disabled or unreachable
//! embedding backend never creates, drops or re-fingerprints a collection.
//! After that the build upserts batch by batch and stops at the first
//! error; entries written before the failure stay in the collection.
//! Build into a fresh collection name and switch `[collection] name` if you
//! need an all-or-nothing swap.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::chunk::{chunk_document, validate_config};
use crate::config::{Config, CorpusConfig, Similarity};
use crate::embedding::EmbeddingAdapter;
use crate::error::{RagError, Result};
use crate::loader::load_documents;
use crate::models::{BuildReport, Chunk, ChunkConfig, RawDocument};
use crate::store::{Fingerprint, IndexEntry, SqliteIndex, VectorIndex};

/// Run the build command against the on-disk index and print a summary.
///
/// `corpus` and `collection` override `[corpus] root` and
/// `[collection] name` for this run only.
pub async fn run_build(
    config: &Config,
    reset: bool,
    corpus: Option<PathBuf>,
    collection: Option<String>,
) -> anyhow::Result<()> {
    let corpus_dir = corpus.unwrap_or_else(|| config.corpus.root.clone());
    let collection = collection.unwrap_or_else(|| config.collection.name.clone());

    let index = Arc::new(SqliteIndex::open(&config.db.path).await?);
    let builder = IndexBuilder::from_config(config, index.clone())?;
    let result = builder
        .build(
            &corpus_dir,
            &collection,
            config.chunking.to_chunk_config(),
            reset,
        )
        .await;
    index.close().await;
    let report = result?;

    println!("build {}", collection);
    println!("  documents loaded: {}", report.documents_loaded);
    println!("  chunks indexed: {}", report.chunks_indexed);
    println!("ok");
    Ok(())
}

pub struct IndexBuilder {
    adapter: EmbeddingAdapter,
    index: Arc<dyn VectorIndex>,
    corpus: CorpusConfig,
    similarity: Similarity,
}

impl IndexBuilder {
    pub fn new(
        adapter: EmbeddingAdapter,
        index: Arc<dyn VectorIndex>,
        corpus: CorpusConfig,
        similarity: Similarity,
    ) -> Self {
        Self {
            adapter,
            index,
            corpus,
            similarity,
        }
    }

    /// Wire a builder from the loaded configuration.
    pub fn from_config(config: &Config, index: Arc<dyn VectorIndex>) -> Result<Self> {
        let adapter = EmbeddingAdapter::from_config(&config.embedding)?;
        Ok(Self::new(
            adapter,
            index,
            config.corpus.clone(),
            config.embedding.similarity,
        ))
    }

    /// The fingerprint a collection built by this builder would carry.
    pub fn fingerprint(&self, chunk_config: ChunkConfig) -> Fingerprint {
        Fingerprint {
            model: self.adapter.model_name().to_string(),
            dims: self.adapter.dims(),
            similarity: self.similarity,
            chunk_size: chunk_config.chunk_size,
            overlap: chunk_config.overlap,
        }
    }

    /// Build (or rebuild) `collection` from the documents under `corpus_dir`.
    ///
    /// With `reset = true` the collection is dropped and recreated first.
    /// With `reset = false` an existing collection must carry the same
    /// fingerprint, otherwise the build fails with
    /// [`RagError::EmbeddingSpaceMismatch`] before anything is written.
    /// A backend without dimensions, or one that fails on the first batch,
    /// fails with [`RagError::EmbeddingUnavailable`] before the collection
    /// is created or dropped.
    pub async fn build(
        &self,
        corpus_dir: &Path,
        collection: &str,
        chunk_config: ChunkConfig,
        reset: bool,
    ) -> Result<BuildReport> {
        validate_config(chunk_config)?;
        let docs = load_documents(corpus_dir, &self.corpus)?;
        info!(
            corpus = %corpus_dir.display(),
            documents = docs.len(),
            "corpus loaded"
        );

        if self.adapter.dims() == 0 {
            return Err(RagError::EmbeddingUnavailable(format!(
                "embedding model '{}' reports no dimensions; set [embedding] provider and dims",
                self.adapter.model_name()
            )));
        }

        let mut chunked = Vec::with_capacity(docs.len());
        for doc in &docs {
            chunked.push((doc, chunk_document(doc, chunk_config)?));
        }

        // The first batch is embedded before the collection is prepared, so
        // an unreachable backend leaves the existing collection untouched.
        let mut pending = match chunked.iter().find(|(_, chunks)| !chunks.is_empty()) {
            Some((_, chunks)) => {
                let first = &chunks[..chunks.len().min(self.adapter.batch_size())];
                Some(self.embed_batch(first).await?)
            }
            None => None,
        };

        let fingerprint = self.fingerprint(chunk_config);
        self.prepare_collection(collection, &fingerprint, reset)
            .await?;

        let mut report = BuildReport {
            documents_loaded: docs.len(),
            chunks_indexed: 0,
        };

        for (doc, chunks) in &chunked {
            let written = self
                .index_chunks(collection, doc, chunks, &mut pending)
                .await?;
            debug!(path = %doc.source_path, chunks = written, "document indexed");
            report.chunks_indexed += written;
        }

        let count = self.index.count(collection).await?;
        info!(
            collection,
            documents = report.documents_loaded,
            chunks = report.chunks_indexed,
            count,
            "build complete"
        );

        Ok(report)
    }

    async fn prepare_collection(
        &self,
        collection: &str,
        fingerprint: &Fingerprint,
        reset: bool,
    ) -> Result<()> {
        if reset {
            if self.index.drop_collection(collection).await? {
                info!(collection, "dropped existing collection");
            }
        } else if let Some(existing) = self.index.collection(collection).await? {
            if existing.fingerprint != *fingerprint {
                return Err(RagError::EmbeddingSpaceMismatch {
                    collection: collection.to_string(),
                    expected: fingerprint.describe(),
                    found: existing.fingerprint.describe(),
                });
            }
        }

        self.index.create_collection(collection, fingerprint).await?;
        Ok(())
    }

    async fn embed_batch(&self, batch: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        self.adapter.embed_passages(&texts).await
    }

    /// Embed and upsert `chunks` batch by batch. `pending` holds vectors
    /// already computed for the first batch of the build.
    async fn index_chunks(
        &self,
        collection: &str,
        doc: &RawDocument,
        chunks: &[Chunk],
        pending: &mut Option<Vec<Vec<f32>>>,
    ) -> Result<usize> {
        let mut written = 0usize;

        for batch in chunks.chunks(self.adapter.batch_size()) {
            let vectors = match pending.take() {
                Some(vectors) => vectors,
                None => self.embed_batch(batch).await?,
            };

            for (chunk, vector) in batch.iter().zip(vectors) {
                let entry = IndexEntry {
                    chunk_id: chunk.chunk_id.clone(),
                    source_path: chunk.source_path.clone(),
                    chunk_index: chunk.index,
                    text: chunk.text.clone(),
                    hash: chunk.hash.clone(),
                    vector,
                    metadata: serde_json::json!({
                        "format": doc.format.as_str(),
                        "overlap_with_prev": chunk.overlap_with_prev,
                    }),
                };
                self.index.upsert(collection, &entry).await?;
                written += 1;
            }
        }

        Ok(written)
    }
}
