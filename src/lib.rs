//! slipstack - a hybrid retrieval engine for receipt documents.
//!
//! slipstack keeps an append-only corpus of ingested receipts in two
//! indexes: a persistent dense vector store (cosine similarity over
//! embeddings computed at write time) and an in-memory BM25 keyword index
//! rebuilt from a full store snapshot after every ingestion. A query pulls
//! candidates from both paths, merges them dense-first, scores every
//! (query, candidate) pair with a reranker, applies a relevance floor, and
//! renders the survivors into a single context block for a language model.
//!
//! The engine exposes exactly two operations: [`RetrievalEngine::ingest`]
//! and [`RetrievalEngine::retrieve`]. It is built once per process and
//! shared by reference; there is no hidden global state.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use slipstack::{
//!     HashEmbedder, MetadataPatch, OverlapReranker, RetrievalEngine,
//! };
//!
//! let engine = RetrievalEngine::open(
//!     "./slipstack-data".as_ref(),
//!     Arc::new(HashEmbedder),
//!     Arc::new(OverlapReranker),
//! )
//! .unwrap();
//!
//! let patch = MetadataPatch {
//!     title: Some("Starbucks".to_string()),
//!     total: Some(4.50),
//!     ..Default::default()
//! };
//! let id = engine
//!     .ingest("Starbucks coffee purchase, total $4.50", patch)
//!     .unwrap();
//! println!("stored {id}");
//!
//! let ctx = engine.retrieve("coffee", 5).unwrap();
//! if ctx.is_empty() {
//!     println!("no relevant context");
//! } else {
//!     println!("{ctx}");
//! }
//! ```
//!
//! With the `models` feature enabled,
//! [`RetrievalEngine::open_with_models`] wires in MiniLM sentence
//! embeddings and a cross-encoder reranker instead of the offline
//! implementations above.

pub mod context;
pub mod data_dir;
pub mod document;
pub mod engine;
pub mod error;
pub mod lexical;
pub mod model;
pub mod receipt_id;
pub mod store;

pub use data_dir::DataDir;
pub use document::{MetadataPatch, ReceiptDocument, ReceiptMetadata};
pub use engine::{
    DEFAULT_TOP_K, RELEVANCE_FLOOR, RankedCandidate, RetrievalEngine,
};
pub use error::{Error, Result};
pub use model::{Embedder, HashEmbedder, OverlapReranker, Reranker};
pub use store::DocumentStore;
