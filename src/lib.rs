//! # Civic RAG
//!
//! Retrieval-augmented question answering over a corpus of
//! government-service documents.
//!
//! An offline build loads the corpus, splits each document into
//! overlapping sentence-aligned chunks, embeds them with the passage-side
//! instruction prefix and stores them in a named collection of a
//! persistent vector index. At query time the question is embedded with
//! the query-side prefix, the nearest chunks are retrieved and assembled
//! into a grounding context, and a local language model writes the answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────┐   ┌─────────┐   ┌───────────┐   ┌──────────────┐
//! │ Loader │──▶│ Chunker │──▶│ Embedding │──▶│ Vector index │
//! │ .json  │   │ overlap │   │  adapter  │   │ SQLite, per  │
//! │ .md    │   │         │   │ passage:  │   │ collection   │
//! └────────┘   └─────────┘   └───────────┘   └──────┬───────┘
//!                                                   │ search
//!                      ┌────────────────────────────┤
//!                      ▼                            ▼
//!                ┌──────────────┐   query:   ┌────────────┐
//!                │ Query engine │◀──────────▶│ Generator  │
//!                │ CLI / HTTP   │            │ (Ollama)   │
//!                └──────────────┘            └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! civic init
//! civic build --reset
//! civic search "residency certificate documents"
//! civic ask "what documents does a tenant need for a residency certificate?"
//! civic serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Pipeline error taxonomy |
//! | [`models`] | Core data types |
//! | [`loader`] | Corpus scanning and JSON flattening |
//! | [`chunk`] | Sentence-packing chunker with overlap |
//! | [`embedding`] | Embedding backends and the prefixing adapter |
//! | [`store`] | Vector index trait, SQLite and in-memory backends |
//! | [`builder`] | Index builder |
//! | [`generation`] | Answer generation backends |
//! | [`query`] | Query engine |
//! | [`server`] | HTTP server |
//! | [`stats`] | Collection listing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod builder;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod query;
pub mod server;
pub mod stats;
pub mod store;
