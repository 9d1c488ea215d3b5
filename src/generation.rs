//! Answer generation.
//!
//! A [`Generator`] turns a fully assembled prompt into text. The only real
//! backend is a local Ollama instance ([`OllamaGenerator`]); the call is
//! wrapped in a caller-side deadline so a stuck model surfaces as
//! [`RagError::GenerationTimeout`] instead of hanging the request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::GenerationConfig;
use crate::embedding::snippet;
use crate::error::{RagError, Result};

/// A text generation endpoint.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String>;
}

// ============ Disabled Generator ============

/// Always fails. Used when `generation.provider = "disabled"`, which still
/// allows `civic search` to run retrieval on its own.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::Generation(
            "generation is disabled. Set [generation] provider in config.".into(),
        ))
    }
}

// ============ Ollama Generator ============

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Non-streaming generation via `POST {url}/api/generate`.
pub struct OllamaGenerator {
    client: reqwest::Client,
    model: String,
    url_generate: String,
    timeout: Duration,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let base = config.url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(RagError::Internal(anyhow::anyhow!(
                "invalid generation.url: {}",
                config.url
            )));
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RagError::Internal(e.into()))?;

        Ok(Self {
            client,
            model: config.model.clone(),
            url_generate: format!("{}/api/generate", base.trim_end_matches('/')),
            timeout: Duration::from_secs(config.timeout_secs),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn request<'a>(&'a self, prompt: &'a str) -> GenerateRequest<'a> {
        let options = if self.temperature.is_some() || self.max_tokens.is_some() {
            Some(GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            })
        } else {
            None
        };
        GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options,
        }
    }

    async fn call(&self, prompt: &str) -> Result<String> {
        let body = self.request(prompt);

        debug!("POST {}", self.url_generate);
        let resp = self
            .client
            .post(&self.url_generate)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "Ollama API error {} from {}: {}",
                status,
                self.url_generate,
                snippet(&text)
            )));
        }

        let out: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(out.response)
    }

    fn transport_error(&self, e: reqwest::Error) -> RagError {
        if e.is_timeout() {
            RagError::GenerationTimeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            RagError::Generation(e.to_string())
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(&self, prompt: &str) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.call(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(RagError::GenerationTimeout {
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

/// Create the generator for `[generation] provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => Err(RagError::Internal(anyhow::anyhow!(
            "Unknown generation provider: {}",
            other
        ))),
    }
}
