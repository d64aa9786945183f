//! Turning chunk matches into ranked documents

use crate::config::SearchConfig;
use crate::document::{DocType, Document};
use crate::storage::ChunkMatch;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Presentation category of a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Code,
    Pattern,
    Architecture,
    Api,
    Guide,
    Decision,
    Runbook,
    Reference,
    Document,
}

impl ResultType {
    pub fn for_document(doc: &Document) -> Self {
        if doc.is_code() {
            return ResultType::Code;
        }
        match doc.doc_type {
            DocType::Pattern => ResultType::Pattern,
            DocType::Architecture => ResultType::Architecture,
            DocType::Api => ResultType::Api,
            DocType::Guide => ResultType::Guide,
            DocType::Decision => ResultType::Decision,
            DocType::Runbook => ResultType::Runbook,
            DocType::Reference => ResultType::Reference,
            DocType::Uncategorized => ResultType::Document,
        }
    }
}

/// A document's best evidence before enrichment
#[derive(Debug, Clone)]
pub struct Candidate {
    pub document_id: String,
    pub relevance: f64,
    /// Text of the best matching chunk
    pub best_chunk: String,
    pub hits: usize,
}

/// Group chunk matches by document.
///
/// Relevance is the best similarity plus `multi_hit_bonus` for every further
/// matching chunk, clamped to 1. Matches under `min_similarity` are ignored.
pub fn aggregate(matches: &[ChunkMatch], config: &SearchConfig) -> Vec<Candidate> {
    let mut by_document: HashMap<&str, Candidate> = HashMap::new();

    for m in matches.iter().filter(|m| m.similarity >= config.min_similarity) {
        by_document
            .entry(m.document_id.as_str())
            .and_modify(|c| {
                c.hits += 1;
                if m.similarity > c.relevance {
                    c.relevance = m.similarity;
                    c.best_chunk = m.content_chunk.clone();
                }
            })
            .or_insert_with(|| Candidate {
                document_id: m.document_id.clone(),
                relevance: m.similarity,
                best_chunk: m.content_chunk.clone(),
                hits: 1,
            });
    }

    let mut candidates: Vec<Candidate> = by_document
        .into_values()
        .map(|mut c| {
            let bonus = config.multi_hit_bonus * c.hits.saturating_sub(1) as f64;
            c.relevance = (c.relevance + bonus).clamp(0.0, 1.0);
            c
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.relevance
            .total_cmp(&a.relevance)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    candidates
}

/// The first `limit` candidates plus any tied with the last one, so that
/// the final tie-break can see every contender
pub fn shortlist(mut candidates: Vec<Candidate>, limit: usize) -> Vec<Candidate> {
    if limit == 0 {
        return Vec::new();
    }
    if candidates.len() > limit {
        let cutoff = candidates[limit - 1].relevance;
        let keep = candidates
            .iter()
            .position(|c| c.relevance < cutoff)
            .unwrap_or(candidates.len());
        candidates.truncate(keep);
    }
    candidates
}

/// Relevance desc, then most recently updated, then id
pub fn compare_hits(
    a_relevance: f64,
    a_doc: &Document,
    b_relevance: f64,
    b_doc: &Document,
) -> Ordering {
    b_relevance
        .total_cmp(&a_relevance)
        .then_with(|| b_doc.last_updated.cmp(&a_doc.last_updated))
        .then_with(|| a_doc.id.cmp(&b_doc.id))
}

/// At most `max_chars` characters of `text`, whitespace collapsed
pub fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((byte, _)) => format!("{}...", flat[..byte].trim_end()),
        None => flat,
    }
}
