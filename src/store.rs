use std::{path::Path, sync::Arc};

use rayon::prelude::*;
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition,
};
use serde::{Deserialize, Serialize};

use crate::{
    document::{ReceiptDocument, ReceiptMetadata},
    error::{Error, Result},
    model::Embedder,
};

const DOCUMENTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("documents");
const EMBEDDINGS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("embeddings");

/// Persisted value in the `documents` table.
#[derive(Serialize, Deserialize)]
struct StoredDocument {
    text: String,
    metadata: ReceiptMetadata,
}

/// Persistent, append-only corpus of receipts with dense embeddings.
///
/// Backed by a single redb database with two tables: `documents` holds the
/// JSON document record, `embeddings` the raw f32 vector computed from the
/// text at write time. Both are written in one transaction, so a document
/// and its embedding are never observed apart. Documents and embeddings
/// survive process restarts.
pub struct DocumentStore {
    db: Database,
    embedder: Arc<dyn Embedder>,
}

impl DocumentStore {
    /// Open or create a store at the given path.
    ///
    /// Open failure is fatal: callers are expected to refuse startup.
    pub fn open(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(DOCUMENTS)?;
        txn.open_table(EMBEDDINGS)?;
        txn.commit()?;

        Ok(Self { db, embedder })
    }

    /// Append one document, computing its embedding from `text`.
    ///
    /// Never overwrites: an already-stored `id` is an error, since the
    /// corpus is immutable once written.
    pub fn add(
        &self,
        id: &str,
        text: &str,
        metadata: &ReceiptMetadata,
    ) -> Result<()> {
        let embedding = self.embedder.embed(text)?;
        let record = serde_json::to_vec(&StoredDocument {
            text: text.to_string(),
            metadata: metadata.clone(),
        })?;

        let txn = self.db.begin_write()?;
        {
            let mut documents = txn.open_table(DOCUMENTS)?;
            if documents.get(id)?.is_some() {
                return Err(Error::DuplicateId(id.to_string()));
            }
            documents.insert(id, record.as_slice())?;

            let mut embeddings = txn.open_table(EMBEDDINGS)?;
            embeddings
                .insert(id, bytemuck::cast_slice::<f32, u8>(&embedding))?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Total number of stored documents.
    pub fn count(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        Ok(table.len()?)
    }

    /// Up to `k` documents ranked by descending cosine similarity between
    /// the query's embedding and each stored embedding.
    ///
    /// Brute-force scan; fine at the corpus scale this store targets. Ties
    /// keep key order (stable for a given store revision).
    pub fn query(&self, text: &str, k: usize) -> Result<Vec<ReceiptDocument>> {
        let query_embedding = self.embedder.embed(text)?;

        let txn = self.db.begin_read()?;
        let embeddings = txn.open_table(EMBEDDINGS)?;

        let mut vectors: Vec<(String, Vec<f32>)> = Vec::new();
        for entry in embeddings.iter()? {
            let (key, value) = entry?;
            vectors.push((
                key.value().to_string(),
                bytemuck::pod_collect_to_vec(value.value()),
            ));
        }

        let mut scored: Vec<(String, f32)> = vectors
            .into_par_iter()
            .map(|(id, vector)| {
                let score = cosine_similarity(&query_embedding, &vector);
                (id, score)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        let documents = txn.open_table(DOCUMENTS)?;
        let mut results = Vec::with_capacity(scored.len());
        for (id, _) in scored {
            if let Some(guard) = documents.get(id.as_str())? {
                let stored: StoredDocument =
                    serde_json::from_slice(guard.value())?;
                results.push(ReceiptDocument {
                    id,
                    text: stored.text,
                    metadata: stored.metadata,
                });
            }
        }
        Ok(results)
    }

    /// Full snapshot of the corpus in key order, for lexical rebuilds.
    pub fn snapshot(&self) -> Result<Vec<ReceiptDocument>> {
        let txn = self.db.begin_read()?;
        let documents = txn.open_table(DOCUMENTS)?;

        let mut results = Vec::new();
        for entry in documents.iter()? {
            let (key, value) = entry?;
            let stored: StoredDocument = serde_json::from_slice(value.value())?;
            results.push(ReceiptDocument {
                id: key.value().to_string(),
                text: stored.text,
                metadata: stored.metadata,
            });
        }
        Ok(results)
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore").finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
