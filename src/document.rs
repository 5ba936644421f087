use serde::{Deserialize, Serialize};

/// Fixed scalar metadata attached to every stored receipt.
///
/// All fields are primitive scalars; the persistent store rejects nested
/// structures, so the schema is flattened at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptMetadata {
    /// Origin of the document (e.g. which upstream extractor produced it).
    pub source: String,
    /// Merchant or business name.
    pub title: String,
    /// Purchase date as printed on the receipt.
    pub date: String,
    /// Receipt total, never negative.
    pub total: f64,
    /// Tax amount, never negative.
    pub tax: f64,
    /// Number of line items.
    pub item_count: u32,
    /// ISO-8601 ingestion timestamp.
    pub timestamp: String,
}

/// Caller-supplied metadata with every field optional.
///
/// Missing fields are not an error: [`MetadataPatch::normalize`] substitutes
/// the documented default for each absent value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataPatch {
    pub source: Option<String>,
    pub title: Option<String>,
    pub date: Option<String>,
    pub total: Option<f64>,
    pub tax: Option<f64>,
    pub item_count: Option<u32>,
    pub timestamp: Option<String>,
}

impl MetadataPatch {
    /// Normalize into the fixed schema, filling defaults for absent fields.
    ///
    /// Monetary amounts are clamped to zero from below; `timestamp` defaults
    /// to the current time in RFC 3339 format.
    pub fn normalize(self) -> ReceiptMetadata {
        ReceiptMetadata {
            source: self.source.unwrap_or_else(|| "receipt_ocr".to_string()),
            title: self.title.unwrap_or_else(|| "Unknown".to_string()),
            date: self.date.unwrap_or_else(|| "Unknown".to_string()),
            total: self.total.unwrap_or(0.0).max(0.0),
            tax: self.tax.unwrap_or(0.0).max(0.0),
            item_count: self.item_count.unwrap_or(0),
            timestamp: self
                .timestamp
                .unwrap_or_else(|| chrono::Local::now().to_rfc3339()),
        }
    }
}

/// A stored receipt: the unit of retrieval.
///
/// Immutable once written; the corpus is append-only. The dense embedding is
/// owned by the document store and never appears here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptDocument {
    pub id: String,
    pub text: String,
    pub metadata: ReceiptMetadata,
}
