//! In-memory BM25 index over the tokenized corpus.
//!
//! Rebuilt from a full document-store snapshot after every ingestion; there
//! is no incremental maintenance. Tokenization is deliberately simple so
//! that documents and queries always agree: lowercase, strip punctuation,
//! split on whitespace. No stemming, no stop words.

use std::collections::HashMap;

const K1: f64 = 1.5;
const B: f64 = 0.75;
/// Floor factor for negative idf values (the Okapi epsilon trick).
const EPSILON: f64 = 0.25;

/// Tokenize text for sparse retrieval: lowercase, drop ASCII punctuation,
/// split on whitespace. Order-preserving.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// BM25-Okapi scorer over a fixed corpus snapshot.
///
/// Documents are addressed by their position in the snapshot. The index is
/// immutable once built; corpus changes require a full rebuild.
#[derive(Debug)]
pub struct LexicalIndex {
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<f64>,
    avg_doc_len: f64,
    idf: HashMap<String, f64>,
}

impl LexicalIndex {
    /// Build an index from the tokenized corpus, one token list per document.
    pub fn build(corpus: &[Vec<String>]) -> Self {
        let n = corpus.len();

        let mut term_freqs = Vec::with_capacity(n);
        let mut doc_lens = Vec::with_capacity(n);
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for tokens in corpus {
            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            doc_lens.push(tokens.len() as f64);
            term_freqs.push(freqs);
        }

        let avg_doc_len = if n > 0 {
            doc_lens.iter().sum::<f64>() / n as f64
        } else {
            0.0
        };

        // Okapi idf, with negative values floored to a fraction of the
        // average idf so very common terms still contribute a little.
        let mut idf: HashMap<String, f64> = HashMap::new();
        let mut idf_sum = 0.0;
        let mut negative: Vec<String> = Vec::new();
        for (term, df) in &doc_freq {
            let value =
                ((n as f64 - *df as f64 + 0.5) / (*df as f64 + 0.5)).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.clone());
            }
            idf.insert(term.clone(), value);
        }
        if !idf.is_empty() {
            let eps = EPSILON * (idf_sum / idf.len() as f64);
            for term in negative {
                idf.insert(term, eps);
            }
        }

        Self {
            term_freqs,
            doc_lens,
            avg_doc_len,
            idf,
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    /// BM25 score of one document against a tokenized query.
    ///
    /// Raw, unnormalized; only meaningful relative to other documents in
    /// the same snapshot.
    pub fn score(&self, query_tokens: &[String], doc_index: usize) -> f64 {
        let doc_len = self.doc_lens[doc_index];
        let freqs = &self.term_freqs[doc_index];

        query_tokens
            .iter()
            .map(|term| {
                let Some(idf) = self.idf.get(term) else {
                    return 0.0;
                };
                let tf = freqs.get(term).copied().unwrap_or(0) as f64;
                idf * (tf * (K1 + 1.0))
                    / (tf
                        + K1 * (1.0 - B + B * doc_len / self.avg_doc_len))
            })
            .sum()
    }

    /// Indices of the top `k` documents by score, descending.
    ///
    /// Every document is scored. Ties break by ascending corpus index
    /// (stable sort over an ascending candidate list).
    pub fn top_n(&self, query_tokens: &[String], k: usize) -> Vec<usize> {
        let scores: Vec<f64> = (0..self.len())
            .map(|i| self.score(query_tokens, i))
            .collect();

        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        indices.truncate(k);
        indices
    }
}
