//! Embedding backends and the instruction-prefixing adapter.
//!
//! Defines the [`EmbeddingBackend`] trait and concrete implementations:
//! - **[`DisabledBackend`]**: always fails; used when no provider is configured.
//! - **[`OllamaBackend`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`OpenAIBackend`]**: calls the OpenAI embeddings API.
//! - **[`HashingBackend`]**: deterministic offline feature hashing.
//! - **`LocalBackend`**: fastembed inference (feature `local-embeddings-fastembed`).
//!
//! The [`EmbeddingAdapter`] sits on top of a backend and applies the
//! asymmetric instruction prefixes: `passage: ` for content being indexed,
//! `query: ` for questions. Both sides go through the same backend, so
//! vectors stay in one embedding space.
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`] / [`dot_product`]: scoring
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian `f32` BLOB encoding
//!
//! # Failure policy
//!
//! Backends make exactly one attempt per call. Transport errors, non-2xx
//! responses and malformed payloads surface as
//! [`RagError::EmbeddingUnavailable`]; nothing is retried behind the
//! caller's back, so a dead endpoint aborts an index build promptly.

mod hashing;

pub use hashing::HashingBackend;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::{default_ollama_url, EmbeddingConfig, Similarity};
use crate::error::{RagError, Result};

/// An embedding model endpoint: text in, fixed-length vectors out.
///
/// Instruction prefixes are applied by the caller ([`EmbeddingAdapter`]),
/// never by the backend.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Returns the model identifier (e.g. `"multilingual-e5-base"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

// ============ Adapter ============

/// Applies role-specific instruction prefixes before embedding.
///
/// ```rust
/// use std::sync::Arc;
/// use civic_rag::config::EmbeddingConfig;
/// use civic_rag::embedding::{EmbeddingAdapter, HashingBackend};
///
/// # tokio_test_block(async {
/// let adapter = EmbeddingAdapter::new(Arc::new(HashingBackend::new(64)), &EmbeddingConfig::default());
/// let p = adapter.embed_passage("lease contract").await.unwrap();
/// let q = adapter.embed_query("lease contract").await.unwrap();
/// assert_ne!(p, q);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct EmbeddingAdapter {
    backend: Arc<dyn EmbeddingBackend>,
    passage_prefix: String,
    query_prefix: String,
    batch_size: usize,
}

impl EmbeddingAdapter {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, config: &EmbeddingConfig) -> Self {
        Self {
            backend,
            passage_prefix: config.passage_prefix.clone(),
            query_prefix: config.query_prefix.clone(),
            batch_size: config.batch_size.max(1),
        }
    }

    /// Build the adapter for the configured provider.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let backend = create_backend(config)?;
        Ok(Self::new(backend, config))
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub fn dims(&self) -> usize {
        self.backend.dims()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embed content destined for the index.
    pub async fn embed_passage(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_passages(&[text]).await?;
        out.pop()
            .ok_or_else(|| RagError::EmbeddingUnavailable("empty embedding response".into()))
    }

    /// Embed many passages, batching requests by `embedding.batch_size`.
    pub async fn embed_passages(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let prefixed: Vec<String> = batch
                .iter()
                .map(|t| format!("{}{}", self.passage_prefix, t.trim()))
                .collect();
            vectors.extend(self.embed_checked(&prefixed).await?);
        }
        Ok(vectors)
    }

    /// Embed a user question.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let prefixed = vec![format!("{}{}", self.query_prefix, text.trim())];
        let mut out = self.embed_checked(&prefixed).await?;
        out.pop()
            .ok_or_else(|| RagError::EmbeddingUnavailable("empty embedding response".into()))
    }

    async fn embed_checked(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.backend.embed(texts).await?;
        if vectors.len() != texts.len() {
            return Err(RagError::EmbeddingUnavailable(format!(
                "backend returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        let want = self.backend.dims();
        if let Some(bad) = vectors.iter().find(|v| v.len() != want) {
            return Err(RagError::EmbeddingUnavailable(format!(
                "vector size mismatch: got {}, want {}",
                bad.len(),
                want
            )));
        }
        Ok(vectors)
    }
}

// ============ Disabled Backend ============

/// A backend that always fails.
///
/// Used when `embedding.provider = "disabled"`.
pub struct DisabledBackend;

#[async_trait]
impl EmbeddingBackend for DisabledBackend {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(RagError::EmbeddingUnavailable(
            "embedding provider is disabled; set [embedding] provider in config".into(),
        ))
    }
}

// ============ Ollama Backend ============

/// Embedding backend using a local Ollama instance.
///
/// Calls `POST {url}/api/embed`. Requires Ollama to be running with the
/// embedding model pulled.
pub struct OllamaBackend {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
}

impl OllamaBackend {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(default_ollama_url)
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Internal(e.into()))?;

        Ok(Self {
            client,
            model,
            dims,
            url,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaBackend {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    #[instrument(skip_all, fields(model = %self.model, n = texts.len()))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let endpoint = format!("{}/api/embed", self.url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        debug!("POST {}", endpoint);
        let response = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                RagError::EmbeddingUnavailable(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingUnavailable(format!(
                "Ollama API error {}: {}",
                status,
                snippet(&body_text)
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::EmbeddingUnavailable(format!("invalid Ollama response: {}", e)))?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            RagError::EmbeddingUnavailable(
                "invalid Ollama response: missing embeddings array".into(),
            )
        })?;

    embeddings.iter().map(parse_float_array).collect()
}

// ============ OpenAI Backend ============

/// Embedding backend using the OpenAI API.
///
/// Calls `POST /v1/embeddings`. Requires `OPENAI_API_KEY` in the environment.
pub struct OpenAIBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAIBackend {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Internal(e.into()))?;

        Ok(Self {
            client,
            api_key,
            model,
            dims,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAIBackend {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    #[instrument(skip_all, fields(model = %self.model, n = texts.len()))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::EmbeddingUnavailable(format!("OpenAI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingUnavailable(format!(
                "OpenAI API error {}: {}",
                status,
                snippet(&body_text)
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::EmbeddingUnavailable(format!("invalid OpenAI response: {}", e)))?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
        RagError::EmbeddingUnavailable("invalid OpenAI response: missing data array".into())
    })?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item.get("embedding").ok_or_else(|| {
            RagError::EmbeddingUnavailable("invalid OpenAI response: missing embedding".into())
        })?;
        indexed.push((index, parse_float_array(embedding)?));
    }
    indexed.sort_by_key(|(i, _)| *i);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn parse_float_array(value: &serde_json::Value) -> Result<Vec<f32>> {
    let items = value.as_array().ok_or_else(|| {
        RagError::EmbeddingUnavailable("invalid response: embedding is not an array".into())
    })?;
    items
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                RagError::EmbeddingUnavailable("invalid response: non-numeric component".into())
            })
        })
        .collect()
}

pub(crate) fn snippet(body: &str) -> String {
    body.chars().take(240).collect()
}

// ============ Local Backend (fastembed) ============

/// Local inference via fastembed. Models are downloaded from Hugging Face
/// on first use and cached; afterwards no network calls are made.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalBackend {
    model_name: String,
    model: fastembed::EmbeddingModel,
    dims: usize,
    batch_size: usize,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalBackend {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "multilingual-e5-base".to_string());
        let (model, default_dims) = match model_name.as_str() {
            "multilingual-e5-small" => (fastembed::EmbeddingModel::MultilingualE5Small, 384),
            "multilingual-e5-base" => (fastembed::EmbeddingModel::MultilingualE5Base, 768),
            "multilingual-e5-large" => (fastembed::EmbeddingModel::MultilingualE5Large, 1024),
            other => {
                return Err(RagError::Internal(anyhow::anyhow!(
                    "Unknown local embedding model: '{}'. Supported models: \
                     multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
                    other
                )))
            }
        };
        Ok(Self {
            model_name,
            model,
            dims: config.dims.unwrap_or(default_dims),
            batch_size: config.batch_size,
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingBackend for LocalBackend {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(model).with_show_download_progress(false),
            )
            .map_err(|e| {
                RagError::EmbeddingUnavailable(format!(
                    "failed to initialize local embedding model: {}",
                    e
                ))
            })?;

            model
                .embed(texts, Some(batch_size))
                .map_err(|e| RagError::EmbeddingUnavailable(format!("local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| RagError::Internal(e.into()))?
    }
}

/// Create the backend named by `embedding.provider`.
///
/// | Config Value | Backend |
/// |-------------|---------|
/// | `"disabled"` | [`DisabledBackend`] |
/// | `"ollama"` | [`OllamaBackend`] |
/// | `"openai"` | [`OpenAIBackend`] |
/// | `"hashing"` | [`HashingBackend`] |
/// | `"local"` | `LocalBackend` (requires `local-embeddings-fastembed`) |
pub fn create_backend(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingBackend>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledBackend)),
        "ollama" => Ok(Arc::new(OllamaBackend::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIBackend::new(config)?)),
        "hashing" => {
            let dims = config
                .dims
                .ok_or_else(|| anyhow::anyhow!("embedding.dims required for hashing provider"))?;
            Ok(Arc::new(HashingBackend::new(dims)))
        }
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalBackend::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(RagError::Internal(anyhow::anyhow!(
            "Local embedding provider requires --features local-embeddings-fastembed"
        ))),
        other => Err(RagError::Internal(anyhow::anyhow!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use civic_rag::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-norm operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Raw inner product. Returns `0.0` for mismatched lengths.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Score `b` against `a` with the given metric.
pub fn similarity(metric: Similarity, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Similarity::Cosine => cosine_similarity(a, b),
        Similarity::Dot => dot_product(a, b),
    }
}
