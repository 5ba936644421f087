//! Renders reranked candidates into the text block handed to the prompt
//! builder. An empty string is the documented "no relevant context"
//! sentinel.

use crate::engine::RankedCandidate;

/// Separator between rendered receipt blocks.
pub const SEPARATOR: &str = "\n\n---\n\n";

/// Render retained candidates as one context block per receipt.
pub fn render(candidates: &[RankedCandidate]) -> String {
    let blocks: Vec<String> = candidates.iter().map(render_block).collect();
    blocks.join(SEPARATOR)
}

fn render_block(candidate: &RankedCandidate) -> String {
    let doc = &candidate.document;
    let meta = &doc.metadata;
    format!(
        "[Receipt ID: {}]\n\
         Merchant: {} | Date: {} | Total: ${:.2} | Tax: ${:.2} | \
         Items: {} | Relevance: {:.2}\n\
         Content:\n{}",
        doc.id,
        meta.title,
        meta.date,
        meta.total,
        meta.tax,
        meta.item_count,
        candidate.score,
        doc.text,
    )
}
