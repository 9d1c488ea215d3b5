//! Query engine.
//!
//! Embeds a question with the query-side prefix, retrieves the nearest
//! chunks from the configured collection, assembles them into a bounded
//! grounding context and asks the [`Generator`] for an answer.
//!
//! An empty retrieval still goes to generation with an empty context; the
//! caller gets a best-effort answer rather than an error. Embedding and
//! generation failures are surfaced as errors, never as a degraded answer.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::{Config, RetrievalConfig};
use crate::embedding::EmbeddingAdapter;
use crate::error::Result;
use crate::generation::{create_generator, Generator};
use crate::models::{Answer, QueryResult, SearchHit};
use crate::store::{SqliteIndex, VectorIndex};

pub struct QueryEngine {
    adapter: EmbeddingAdapter,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
    retrieval: RetrievalConfig,
    collection: String,
}

impl QueryEngine {
    pub fn new(
        adapter: EmbeddingAdapter,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
        retrieval: RetrievalConfig,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            adapter,
            index,
            generator,
            retrieval,
            collection: collection.into(),
        }
    }

    /// Wire an engine from the loaded configuration.
    pub fn from_config(config: &Config, index: Arc<dyn VectorIndex>) -> Result<Self> {
        let adapter = EmbeddingAdapter::from_config(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        Ok(Self::new(
            adapter,
            index,
            generator,
            config.retrieval.clone(),
            config.collection.name.clone(),
        ))
    }

    /// The collection `answer_question` reads from.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn default_k(&self) -> usize {
        self.retrieval.top_k
    }

    /// Embed `question` and return up to `k` ranked chunks. No generation.
    pub async fn retrieve(&self, question: &str, collection: &str, k: usize) -> Result<Vec<SearchHit>> {
        let query_vec = self.adapter.embed_query(question).await?;
        let mut hits = self.index.search(collection, &query_vec, k.max(1)).await?;

        if let Some(floor) = self.retrieval.min_score {
            let before = hits.len();
            hits.retain(|h| h.score >= floor);
            if hits.len() < before {
                warn!(
                    dropped = before - hits.len(),
                    min_score = floor,
                    "discarded hits below similarity floor"
                );
            }
        }

        Ok(hits)
    }

    /// Retrieve, assemble context and generate.
    #[instrument(skip_all, fields(collection = %collection, k))]
    pub async fn query(&self, question: &str, collection: &str, k: usize) -> Result<QueryResult> {
        let hits = self.retrieve(question, collection, k).await?;
        if hits.is_empty() {
            warn!("no chunks retrieved, generating without context");
        }

        let context = build_context(&hits, self.retrieval.max_context_chars);
        let prompt = build_prompt(question, &context);
        let answer = self.generator.generate(&prompt).await?;

        info!(retrieved = hits.len(), context_chars = context.chars().count(), "query answered");

        Ok(QueryResult {
            question: question.to_string(),
            retrieved_chunks: hits,
            answer: answer.trim().to_string(),
        })
    }

    /// Answer against the configured collection with the configured `top_k`.
    pub async fn answer_question(&self, question: &str) -> Result<Answer> {
        let result = self
            .query(question, &self.collection, self.retrieval.top_k)
            .await?;
        Ok(result.into())
    }
}

// ============ CLI commands ============

/// Retrieval only: print ranked hits for `question` without generating.
pub async fn run_search(config: &Config, question: &str, k: Option<usize>) -> anyhow::Result<()> {
    if question.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let index = Arc::new(SqliteIndex::open(&config.db.path).await?);
    let engine = QueryEngine::from_config(config, index.clone())?;
    let k = k.unwrap_or(config.retrieval.top_k);
    let result = engine.retrieve(question, engine.collection(), k).await;
    index.close().await;
    let hits = result?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} (chunk {})",
            i + 1,
            hit.score,
            hit.source_path,
            hit.chunk_index
        );
        println!("    {}", excerpt(&hit.text, 240));
    }
    Ok(())
}

/// Full question answering: print the answer and its sources.
pub async fn run_ask(config: &Config, question: &str, k: Option<usize>) -> anyhow::Result<()> {
    if question.trim().is_empty() {
        anyhow::bail!("question must not be empty");
    }

    let index = Arc::new(SqliteIndex::open(&config.db.path).await?);
    let engine = QueryEngine::from_config(config, index.clone())?;
    let k = k.unwrap_or(config.retrieval.top_k);
    let result = engine.query(question, engine.collection(), k).await;
    index.close().await;
    let answer: Answer = result?.into();

    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &answer.sources {
            println!("  - {}", source);
        }
    }
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let mut clipped: String = flat.chars().take(max_chars).collect();
        clipped.push_str("...");
        clipped
    }
}

/// Join ranked chunk texts with blank lines, keeping whole chunks while
/// they fit in `max_chars`. The top chunk is always kept, clipped to
/// `max_chars` characters if it alone is too long.
pub fn build_context(hits: &[SearchHit], max_chars: usize) -> String {
    let mut context = String::new();
    let mut used = 0usize;

    for (rank, hit) in hits.iter().enumerate() {
        let text = hit.text.trim();
        let len = text.chars().count();

        if rank == 0 {
            if len > max_chars {
                return text.chars().take(max_chars).collect();
            }
            context.push_str(text);
            used = len;
            continue;
        }

        // two chars for the blank-line separator
        if used + 2 + len > max_chars {
            break;
        }
        context.push_str("\n\n");
        context.push_str(text);
        used += 2 + len;
    }

    context
}

/// Fill the question-answering prompt with `context` and `question`.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "Context information is below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {question}\n\
         Answer:",
        context = context,
        question = question.trim()
    )
}
