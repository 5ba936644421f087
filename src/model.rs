//! Model seam for the retrieval engine.
//!
//! Two traits split the engine from its models: [`Embedder`] maps text into
//! a dense vector space, [`Reranker`] scores (query, document) pairs
//! jointly. The default build ships deterministic offline implementations;
//! the `models` feature adds ONNX-backed implementations via
//! [fastembed](https://docs.rs/fastembed).

use std::{
    collections::HashSet,
    hash::{DefaultHasher, Hash, Hasher},
};

use crate::{error::Result, lexical::tokenize};

/// Embeds text into a fixed-dimension dense vector space.
///
/// A store and the queries against it must share one embedder; mixing
/// vector spaces silently breaks cosine ranking.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Scores (query, document) pairs with a pairwise relevance model.
///
/// Returns one score per document, in input order, higher = more relevant.
/// Scores are compared against [`crate::engine::RELEVANCE_FLOOR`], so an
/// implementation should produce values roughly on the cross-encoder logit
/// scale (symmetric around zero).
pub trait Reranker: Send + Sync {
    fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>>;
}

/// Dimension of [`HashEmbedder`] vectors.
pub const HASH_EMBED_DIM: usize = 256;

/// Deterministic hashed bag-of-words embedder.
///
/// Each token is hashed into one of [`HASH_EMBED_DIM`] signed buckets and
/// the result is L2-normalized, so texts sharing tokens land close in
/// cosine space. No model download, no state; useful offline and as the
/// test-time stand-in for the ONNX embedder.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashEmbedder;

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; HASH_EMBED_DIM];
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let h = hasher.finish();
            let bucket = (h % HASH_EMBED_DIM as u64) as usize;
            let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

/// Term-overlap reranker.
///
/// Scores each document by the fraction of query tokens it contains, mapped
/// onto `[-6, +6]` so the engine's relevance floor behaves the same as with
/// a cross-encoder: a document sharing no terms with the query falls below
/// the floor and is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct OverlapReranker;

impl Reranker for OverlapReranker {
    fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
        if query_terms.is_empty() {
            return Ok(vec![0.0; documents.len()]);
        }

        Ok(documents
            .iter()
            .map(|doc| {
                let doc_terms: HashSet<String> =
                    tokenize(doc).into_iter().collect();
                let matched = query_terms
                    .iter()
                    .filter(|t| doc_terms.contains(*t))
                    .count();
                let fraction = matched as f32 / query_terms.len() as f32;
                12.0 * fraction - 6.0
            })
            .collect())
    }
}

#[cfg(feature = "models")]
pub use self::onnx::{CrossEncoderReranker, MiniLmEmbedder};

#[cfg(feature = "models")]
mod onnx {
    use std::sync::Mutex;

    use super::{Embedder, Reranker};
    use crate::error::{Error, Result};

    /// Dense sentence embedder backed by `all-MiniLM-L6-v2` (384-dim ONNX).
    ///
    /// `TextEmbedding::embed` needs `&mut self`, so the model sits behind a
    /// mutex to keep the embedder shareable.
    pub struct MiniLmEmbedder {
        inner: Mutex<fastembed::TextEmbedding>,
    }

    impl MiniLmEmbedder {
        /// Load the model, downloading it on first use.
        ///
        /// A load failure is a construction-time error; the engine refuses
        /// to come up without its embedder.
        pub fn load() -> Result<Self> {
            let model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(
                    fastembed::EmbeddingModel::AllMiniLML6V2,
                )
                .with_show_download_progress(false),
            )
            .map_err(|e| {
                Error::Embedding(format!("failed to load embedding model: {e}"))
            })?;
            Ok(Self {
                inner: Mutex::new(model),
            })
        }
    }

    impl Embedder for MiniLmEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut model = self.inner.lock().map_err(|_| {
                Error::Embedding("embedding model lock poisoned".to_string())
            })?;
            let mut batch = model
                .embed(vec![text], None)
                .map_err(|e| Error::Embedding(e.to_string()))?;
            batch.pop().ok_or_else(|| {
                Error::Embedding("model returned no embedding".to_string())
            })
        }
    }

    /// Cross-encoder reranker backed by fastembed's `TextRerank`.
    ///
    /// Emits raw relevance logits, the scale the engine's relevance floor
    /// is tuned against.
    pub struct CrossEncoderReranker {
        inner: Mutex<fastembed::TextRerank>,
    }

    impl CrossEncoderReranker {
        pub fn load() -> Result<Self> {
            let model = fastembed::TextRerank::try_new(
                fastembed::RerankInitOptions::new(
                    fastembed::RerankerModel::JINARerankerV1TurboEn,
                )
                .with_show_download_progress(false),
            )
            .map_err(|e| {
                Error::Rerank(format!("failed to load reranker model: {e}"))
            })?;
            Ok(Self {
                inner: Mutex::new(model),
            })
        }
    }

    impl Reranker for CrossEncoderReranker {
        fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
            if documents.is_empty() {
                return Ok(Vec::new());
            }
            let mut model = self.inner.lock().map_err(|_| {
                Error::Rerank("reranker model lock poisoned".to_string())
            })?;
            let results = model
                .rerank(query, documents.to_vec(), false, None)
                .map_err(|e| Error::Rerank(e.to_string()))?;

            // Results come back ranked; restore input order by index.
            let mut scores = vec![0.0f32; documents.len()];
            for result in results {
                if let Some(slot) = scores.get_mut(result.index) {
                    *slot = result.score;
                }
            }
            Ok(scores)
        }
    }
}
