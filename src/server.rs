//! HTTP surface over the query engine.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/chat` | `{ "question", "k"? }` → `{ "answer", "sources" }` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_ready", "message": "collection not found: 'public_services_kb' ..." } }
//! ```
//!
//! | Condition | Status | Code |
//! |-----------|--------|------|
//! | empty question | 400 | `bad_request` |
//! | collection never built | 503 | `not_ready` |
//! | embedding endpoint down | 503 | `embedding_unavailable` |
//! | generation timed out | 504 | `timeout` |
//! | anything else | 500 | `internal` |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front-end
//! can call the API directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::error::RagError;
use crate::models::Answer;
use crate::query::QueryEngine;
use crate::store::SqliteIndex;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    engine: Arc<QueryEngine>,
}

/// Open the index, build the query engine and serve on `[server].bind`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let index = Arc::new(SqliteIndex::open(&config.db.path).await?);
    let engine = Arc::new(QueryEngine::from_config(config, index)?);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(
        bind = %config.server.bind,
        collection = engine.collection(),
        "server listening"
    );
    println!("Listening on http://{}", config.server.bind);

    axum::serve(listener, router(engine)).await?;
    Ok(())
}

/// The application router, without binding a socket.
pub fn router(engine: Arc<QueryEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .layer(cors)
        .with_state(AppState { engine })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::CollectionNotFound(_) => (StatusCode::SERVICE_UNAVAILABLE, "not_ready"),
            RagError::EmbeddingUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "embedding_unavailable")
            }
            RagError::GenerationTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "chat request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

#[derive(Debug, Deserialize)]
struct ChatRequest {
    question: String,
    #[serde(default)]
    k: Option<usize>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<Answer>, AppError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let engine = &state.engine;
    let k = req.k.unwrap_or_else(|| engine.default_k());
    let result = engine.query(question, engine.collection(), k).await?;

    Ok(Json(result.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingConfig, RetrievalConfig, Similarity};
    use crate::embedding::{DisabledBackend, EmbeddingAdapter, EmbeddingBackend, HashingBackend};
    use crate::generation::Generator;
    use crate::store::{Fingerprint, IndexEntry, InMemoryIndex, VectorIndex};
    use async_trait::async_trait;

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn generate(&self, prompt: &str) -> crate::error::Result<String> {
            Ok(format!("prompt had {} chars", prompt.chars().count()))
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl Generator for SlowGenerator {
        fn model_name(&self) -> &str {
            "slow"
        }
        async fn generate(&self, _prompt: &str) -> crate::error::Result<String> {
            Err(RagError::GenerationTimeout { secs: 180 })
        }
    }

    async fn spawn(collection: &str, generator: Arc<dyn Generator>) -> String {
        spawn_with(collection, Arc::new(HashingBackend::new(64)), generator).await
    }

    async fn spawn_with(
        collection: &str,
        query_backend: Arc<dyn EmbeddingBackend>,
        generator: Arc<dyn Generator>,
    ) -> String {
        let backend = HashingBackend::new(64);
        let index = Arc::new(InMemoryIndex::new());
        let fp = Fingerprint {
            model: "hashing".into(),
            dims: 64,
            similarity: Similarity::Cosine,
            chunk_size: 1024,
            overlap: 200,
        };
        index.create_collection("kb", &fp).await.unwrap();
        index
            .upsert(
                "kb",
                &IndexEntry {
                    chunk_id: "c0".into(),
                    source_path: "residency.md".into(),
                    chunk_index: 0,
                    text: "Submit a lease contract.".into(),
                    hash: String::new(),
                    vector: backend.embed_one("passage: Submit a lease contract."),
                    metadata: serde_json::json!({}),
                },
            )
            .await
            .unwrap();

        let adapter = EmbeddingAdapter::new(query_backend, &EmbeddingConfig::default());
        let engine = QueryEngine::new(
            adapter,
            index,
            generator,
            RetrievalConfig::default(),
            collection,
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(Arc::new(engine))).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn post_chat(base: &str, body: serde_json::Value) -> (u16, serde_json::Value) {
        let resp = reqwest::Client::new()
            .post(format!("{}/chat", base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let base = spawn("kb", Arc::new(EchoGenerator)).await;
        let body: serde_json::Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_chat_returns_answer_and_sources() {
        let base = spawn("kb", Arc::new(EchoGenerator)).await;
        let (status, body) =
            post_chat(&base, serde_json::json!({ "question": "lease contract?", "k": 2 })).await;
        assert_eq!(status, 200);
        assert!(body["answer"].as_str().unwrap().starts_with("prompt had"));
        assert_eq!(body["sources"], serde_json::json!(["residency.md"]));
    }

    #[tokio::test]
    async fn test_chat_error_mapping() {
        let base = spawn("kb", Arc::new(EchoGenerator)).await;
        let (status, body) = post_chat(&base, serde_json::json!({ "question": "  " })).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], "bad_request");

        let base = spawn("never_built", Arc::new(EchoGenerator)).await;
        let (status, body) = post_chat(&base, serde_json::json!({ "question": "q" })).await;
        assert_eq!(status, 503);
        assert_eq!(body["error"]["code"], "not_ready");

        let base = spawn("kb", Arc::new(SlowGenerator)).await;
        let (status, body) = post_chat(&base, serde_json::json!({ "question": "q" })).await;
        assert_eq!(status, 504);
        assert_eq!(body["error"]["code"], "timeout");

        let base = spawn_with("kb", Arc::new(DisabledBackend), Arc::new(EchoGenerator)).await;
        let (status, body) = post_chat(&base, serde_json::json!({ "question": "q" })).await;
        assert_eq!(status, 503);
        assert_eq!(body["error"]["code"], "embedding_unavailable");
    }
}
