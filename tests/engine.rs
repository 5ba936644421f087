//! End-to-end tests for the hybrid retrieval engine, using the offline
//! embedder and reranker so no model downloads are involved.

use std::sync::Arc;

use slipstack::{
    Error, HashEmbedder, MetadataPatch, OverlapReranker, RELEVANCE_FLOOR,
    Reranker, Result, RetrievalEngine,
};

fn open_engine(dir: &std::path::Path) -> RetrievalEngine {
    RetrievalEngine::open(dir, Arc::new(HashEmbedder), Arc::new(OverlapReranker))
        .unwrap()
}

fn patch(title: &str, total: f64) -> MetadataPatch {
    MetadataPatch {
        title: Some(title.to_string()),
        total: Some(total),
        ..Default::default()
    }
}

#[test]
fn sequential_ingests_return_distinct_ids() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());

    let ids: Vec<String> = (0..20)
        .map(|i| {
            engine
                .ingest(&format!("receipt number {i}"), MetadataPatch::default())
                .unwrap()
        })
        .collect();

    let unique: std::collections::HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
}

#[test]
fn lexical_count_matches_store_count_after_every_ingest() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());

    for i in 0..5 {
        engine
            .ingest(&format!("groceries batch {i}"), MetadataPatch::default())
            .unwrap();
        assert_eq!(engine.lexical_count() as u64, engine.count().unwrap());
    }
}

#[test]
fn empty_corpus_returns_empty_context() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());

    assert_eq!(engine.retrieve("coffee", 5).unwrap(), "");
    assert_eq!(engine.retrieve("", 1).unwrap(), "");
    assert!(engine.retrieve_candidates("anything", 10).unwrap().is_empty());
}

#[test]
fn ingested_receipt_is_retrievable_by_keyword() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());

    engine
        .ingest(
            "Starbucks coffee purchase, total $4.50",
            patch("Starbucks", 4.50),
        )
        .unwrap();

    let ctx = engine.retrieve("coffee", 5).unwrap();
    assert!(!ctx.is_empty());
    assert!(ctx.contains("Starbucks"));
}

#[test]
fn result_blocks_are_bounded_by_top_k() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());

    // Every document contains the query term, so all candidates score at
    // the top of the overlap range, well above the relevance floor.
    for i in 0..6 {
        engine
            .ingest(
                &format!("coffee receipt number {i}"),
                patch(&format!("Cafe {i}"), 3.0),
            )
            .unwrap();
    }

    let ctx = engine.retrieve("coffee", 3).unwrap();
    let blocks: Vec<&str> = ctx.split("\n\n---\n\n").collect();
    assert!(blocks.len() <= 3);
    assert!(!blocks.is_empty());
}

/// Scores any document containing "plywood" far below the relevance floor,
/// everything else comfortably above it.
struct PlywoodHater;

impl Reranker for PlywoodHater {
    fn score(&self, _query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        Ok(documents
            .iter()
            .map(|d| if d.contains("plywood") { -10.0 } else { 5.0 })
            .collect())
    }
}

#[test]
fn candidates_below_relevance_floor_are_excluded() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = RetrievalEngine::open(
        tmp.path(),
        Arc::new(HashEmbedder),
        Arc::new(PlywoodHater),
    )
    .unwrap();

    engine
        .ingest("coffee and pastry receipt", patch("Cafe", 7.25))
        .unwrap();
    engine
        .ingest("plywood sheets receipt", patch("Hardware", 42.00))
        .unwrap();

    // Both documents are candidates (corpus of two, fetch_k covers all),
    // but the sub-floor one must not reach the output.
    let candidates = engine.retrieve_candidates("receipt", 5).unwrap();
    assert_eq!(candidates.len(), 1);
    assert!(candidates[0].score >= RELEVANCE_FLOOR);

    let ctx = engine.retrieve("receipt", 5).unwrap();
    assert!(ctx.contains("Cafe"));
    assert!(!ctx.contains("plywood"));
}

#[test]
fn all_candidates_filtered_is_a_valid_empty_result() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());

    engine
        .ingest("plywood sheets receipt", patch("Hardware", 42.00))
        .unwrap();

    // No query-term overlap: the overlap reranker scores this at -6,
    // below the floor. Empty output, not an error.
    assert_eq!(engine.retrieve("coffee latte", 5).unwrap(), "");
}

#[test]
fn consecutive_retrievals_are_identical() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());

    for i in 0..8 {
        engine
            .ingest(
                &format!("coffee shop receipt number {i}"),
                patch(&format!("Cafe {i}"), 2.0 + i as f64),
            )
            .unwrap();
    }

    let first = engine.retrieve("coffee receipt", 4).unwrap();
    let second = engine.retrieve("coffee receipt", 4).unwrap();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn corpus_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();

    {
        let engine = open_engine(tmp.path());
        engine
            .ingest(
                "Starbucks coffee purchase, total $4.50",
                patch("Starbucks", 4.50),
            )
            .unwrap();
    }

    {
        let engine = open_engine(tmp.path());
        assert_eq!(engine.count().unwrap(), 1);
        // The lexical index is rebuilt from the persisted corpus at open.
        assert_eq!(engine.lexical_count(), 1);
        let ctx = engine.retrieve("coffee", 5).unwrap();
        assert!(ctx.contains("Starbucks"));
    }
}

/// Always fails, standing in for a broken scoring backend.
struct BrokenReranker;

impl Reranker for BrokenReranker {
    fn score(&self, _query: &str, _documents: &[&str]) -> Result<Vec<f32>> {
        Err(Error::Rerank("scoring backend unavailable".to_string()))
    }
}

#[test]
fn reranker_failure_surfaces_as_error() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = RetrievalEngine::open(
        tmp.path(),
        Arc::new(HashEmbedder),
        Arc::new(BrokenReranker),
    )
    .unwrap();

    engine
        .ingest("coffee receipt", patch("Cafe", 3.0))
        .unwrap();

    let err = engine.retrieve("coffee", 5).unwrap_err();
    assert!(matches!(err, Error::Rerank(_)));

    // A per-call failure does not break the engine for later calls with
    // an empty corpus path.
    assert_eq!(engine.count().unwrap(), 1);
}

#[test]
fn open_default_resolves_explicit_data_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let data_dir = tmp.path().join("engine-home");

    let engine = RetrievalEngine::open_default(
        Some(&data_dir),
        Arc::new(HashEmbedder),
        Arc::new(OverlapReranker),
    )
    .unwrap();

    engine
        .ingest("coffee receipt", patch("Cafe", 3.0))
        .unwrap();

    // The corpus landed under the resolved directory and is readable.
    assert!(data_dir.join("receipts.redb").exists());
    assert!(engine.retrieve("coffee", 5).unwrap().contains("Cafe"));
}

#[test]
fn retrieve_default_caps_at_five_blocks() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());

    for i in 0..7 {
        engine
            .ingest(
                &format!("coffee receipt number {i}"),
                patch(&format!("Cafe {i}"), 3.0),
            )
            .unwrap();
    }

    let ctx = engine.retrieve_default("coffee").unwrap();
    let blocks: Vec<&str> = ctx.split("\n\n---\n\n").collect();
    assert_eq!(blocks.len(), 5);
    assert_eq!(ctx, engine.retrieve("coffee", 5).unwrap());
}

#[test]
fn metadata_defaults_appear_in_context() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path());

    engine
        .ingest("coffee receipt with no metadata", MetadataPatch::default())
        .unwrap();

    let ctx = engine.retrieve("coffee", 5).unwrap();
    assert!(ctx.contains("Merchant: Unknown"));
    assert!(ctx.contains("Total: $0.00"));
    assert!(ctx.contains("Items: 0"));
}
