//! The hybrid retrieval engine: ingestion pipeline plus retrieval
//! orchestrator.
//!
//! Construction is the single startup phase: models and store must be ready
//! or [`RetrievalEngine::open`] fails and the host should refuse traffic.
//! The engine is meant to be built once per process and shared by reference
//! (e.g. inside an `Arc`) by every request handler.

use std::{
    collections::HashSet,
    path::Path,
    sync::{Arc, RwLock},
};

use tracing::info;

use crate::{
    context,
    data_dir::DataDir,
    document::{MetadataPatch, ReceiptDocument},
    error::Result,
    lexical::{self, LexicalIndex},
    model::{Embedder, Reranker},
    receipt_id,
    store::DocumentStore,
};

/// Candidates scoring below this are dropped after reranking.
///
/// Tuned to cross-encoder logits that typically land in roughly
/// `[-11, +11]`; re-tune when swapping the scoring model.
pub const RELEVANCE_FLOOR: f32 = -5.0;

/// Default number of context blocks returned by [`RetrievalEngine::retrieve`].
pub const DEFAULT_TOP_K: usize = 5;

/// Candidates fetched from each retrieval path, as a multiple of `top_k`.
const FETCH_MULTIPLIER: usize = 2;

/// A candidate that survived reranking, with its relevance score.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub document: ReceiptDocument,
    pub score: f32,
}

/// The sparse side of the engine: a BM25 index plus the document snapshot
/// it was built from, in matching order. Replaced wholesale on rebuild so
/// readers never observe a torn state.
struct LexicalSnapshot {
    index: LexicalIndex,
    documents: Vec<ReceiptDocument>,
}

/// Hybrid retrieval engine over an append-only receipt corpus.
pub struct RetrievalEngine {
    store: DocumentStore,
    lexical: RwLock<Option<LexicalSnapshot>>,
    reranker: Arc<dyn Reranker>,
}

impl RetrievalEngine {
    /// Open the engine against a data directory, restoring the persisted
    /// corpus and rebuilding the lexical index from it.
    ///
    /// Any failure here (store open, model handles already failed upstream,
    /// initial rebuild) is fatal to the engine.
    pub fn open(
        dir: &Path,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
    ) -> Result<Self> {
        Self::open_data_dir(&DataDir::resolve(Some(dir))?, embedder, reranker)
    }

    /// Open against the resolved default data directory: an explicit path
    /// if given, otherwise `SLIPSTACK_DATA_DIR`, otherwise the XDG data
    /// home (see [`DataDir::resolve`]).
    pub fn open_default(
        data_dir: Option<&Path>,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
    ) -> Result<Self> {
        Self::open_data_dir(&DataDir::resolve(data_dir)?, embedder, reranker)
    }

    fn open_data_dir(
        data_dir: &DataDir,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
    ) -> Result<Self> {
        let store = DocumentStore::open(&data_dir.store_path(), embedder)?;

        let engine = Self {
            store,
            lexical: RwLock::new(None),
            reranker,
        };
        engine.rebuild_lexical()?;
        info!(
            documents = engine.count()?,
            "hybrid retrieval engine ready"
        );
        Ok(engine)
    }

    /// Open with the ONNX model stack: MiniLM embeddings + cross-encoder
    /// reranking.
    #[cfg(feature = "models")]
    pub fn open_with_models(dir: &Path) -> Result<Self> {
        let embedder = Arc::new(crate::model::MiniLmEmbedder::load()?);
        let reranker = Arc::new(crate::model::CrossEncoderReranker::load()?);
        Self::open(dir, embedder, reranker)
    }

    /// Ingest one receipt: assign an id, normalize metadata, write to the
    /// store (which embeds the text), then rebuild the lexical index.
    ///
    /// The document is densely retrievable as soon as the store write
    /// lands; sparsely retrievable once the rebuild completes. Returns the
    /// generated id.
    pub fn ingest(&self, text: &str, metadata: MetadataPatch) -> Result<String> {
        let id = receipt_id::generate();
        let metadata = metadata.normalize();

        self.store.add(&id, text, &metadata)?;
        info!(id = %id, title = %metadata.title, "stored receipt");

        self.rebuild_lexical()?;
        Ok(id)
    }

    /// Total documents in the corpus.
    pub fn count(&self) -> Result<u64> {
        self.store.count()
    }

    /// Documents currently visible to sparse retrieval. Equal to
    /// [`Self::count`] after every successful ingest.
    pub fn lexical_count(&self) -> usize {
        self.read_lexical()
            .as_ref()
            .map(|s| s.index.len())
            .unwrap_or(0)
    }

    /// Retrieve context for a query, formatted for the prompt builder.
    ///
    /// Empty string means "no relevant context": corpus empty, nothing
    /// merged, or everything filtered by the relevance floor. Failures of
    /// the embedding or rerank stage surface as errors, never as silent
    /// partial results.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<String> {
        Ok(context::render(&self.retrieve_candidates(query, top_k)?))
    }

    /// [`Self::retrieve`] with [`DEFAULT_TOP_K`] context blocks.
    pub fn retrieve_default(&self, query: &str) -> Result<String> {
        self.retrieve(query, DEFAULT_TOP_K)
    }

    /// The retrieval pipeline behind [`Self::retrieve`], returning scored
    /// candidates instead of formatted text.
    ///
    /// 1. Dense top `fetch_k` by cosine similarity
    /// 2. Sparse top `fetch_k` by BM25 (if any documents are indexed)
    /// 3. Dense-wins merge, deduplicated by id
    /// 4. Cross-encoder scoring of every (query, text) pair
    /// 5. Stable sort descending, relevance floor, truncate to `top_k`
    pub fn retrieve_candidates(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RankedCandidate>> {
        let corpus_size = self.store.count()? as usize;
        if corpus_size == 0 {
            return Ok(Vec::new());
        }
        let fetch_k = (FETCH_MULTIPLIER * top_k).min(corpus_size);

        let dense = self.store.query(query, fetch_k)?;

        let sparse = {
            let guard = self.read_lexical();
            match guard.as_ref() {
                Some(snapshot) => {
                    let query_tokens = lexical::tokenize(query);
                    snapshot
                        .index
                        .top_n(&query_tokens, fetch_k)
                        .into_iter()
                        .map(|i| snapshot.documents[i].clone())
                        .collect()
                }
                None => Vec::new(),
            }
        };

        let merged = merge_candidates(dense, sparse);
        if merged.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = merged.iter().map(|d| d.text.as_str()).collect();
        let scores = self.reranker.score(query, &texts)?;

        let mut ranked: Vec<RankedCandidate> = merged
            .into_iter()
            .zip(scores)
            .map(|(document, score)| RankedCandidate { document, score })
            .collect();
        // Stable sort: ties keep merge order.
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.retain(|c| c.score >= RELEVANCE_FLOOR);
        ranked.truncate(top_k);
        Ok(ranked)
    }

    /// Rebuild the sparse index from a full store snapshot and swap it in.
    ///
    /// Retrievals running during a rebuild see either the previous or the
    /// new snapshot, never a partial one.
    fn rebuild_lexical(&self) -> Result<()> {
        let documents = self.store.snapshot()?;
        let next = if documents.is_empty() {
            None
        } else {
            let corpus: Vec<Vec<String>> = documents
                .iter()
                .map(|d| lexical::tokenize(&d.text))
                .collect();
            Some(LexicalSnapshot {
                index: LexicalIndex::build(&corpus),
                documents,
            })
        };

        let count = next.as_ref().map(|s| s.index.len()).unwrap_or(0);
        *self
            .lexical
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
        info!(documents = count, "lexical index rebuilt");
        Ok(())
    }

    fn read_lexical(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, Option<LexicalSnapshot>> {
        // A poisoned lock only means a writer panicked before the swap; the
        // previous snapshot is still intact.
        self.lexical
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine").finish_non_exhaustive()
    }
}

/// Union of dense and sparse hits, deduplicated by id.
///
/// Dense candidates are inserted first and win on collision; sparse only
/// contributes ids dense missed. Insertion order is preserved, which makes
/// the downstream stable sort deterministic.
fn merge_candidates(
    dense: Vec<ReceiptDocument>,
    sparse: Vec<ReceiptDocument>,
) -> Vec<ReceiptDocument> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::with_capacity(dense.len() + sparse.len());
    for doc in dense.into_iter().chain(sparse) {
        if seen.insert(doc.id.clone()) {
            merged.push(doc);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, text: &str) -> ReceiptDocument {
        ReceiptDocument {
            id: id.to_string(),
            text: text.to_string(),
            metadata: MetadataPatch::default().normalize(),
        }
    }

    #[test]
    fn merge_dense_wins_on_collision() {
        let dense = vec![doc("a", "dense text"), doc("b", "dense only")];
        let sparse = vec![doc("a", "sparse text"), doc("c", "sparse only")];

        let merged = merge_candidates(dense, sparse);
        let ids: Vec<&str> = merged.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(merged[0].text, "dense text");
    }

    #[test]
    fn merge_of_empty_inputs_is_empty() {
        assert!(merge_candidates(Vec::new(), Vec::new()).is_empty());
    }

    #[test]
    fn merge_keeps_sparse_only_ids() {
        let merged =
            merge_candidates(Vec::new(), vec![doc("x", "sparse hit")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "x");
    }
}
