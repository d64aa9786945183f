//! Hash-diff between a new chunk set and the stored embeddings

use crate::extract::Chunk;
use std::collections::HashSet;

/// What a reindex has to do to bring stored embeddings in line with content
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    /// Chunks whose hash is not stored yet; these need embedding
    pub insert: Vec<Chunk>,
    /// Number of chunks already stored under the same hash
    pub keep: usize,
    /// Stored hashes no longer present, sorted
    pub delete: Vec<String>,
}

impl ReconcilePlan {
    pub fn compute(chunks: Vec<Chunk>, stored: &HashSet<String>) -> Self {
        let chunks = dedupe_chunks(chunks);
        let current: HashSet<&str> = chunks.iter().map(|c| c.hash.as_str()).collect();

        let mut delete: Vec<String> = stored
            .iter()
            .filter(|hash| !current.contains(hash.as_str()))
            .cloned()
            .collect();
        delete.sort();

        let (kept, insert): (Vec<Chunk>, Vec<Chunk>) =
            chunks.into_iter().partition(|c| stored.contains(&c.hash));

        Self {
            insert,
            keep: kept.len(),
            delete,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.insert.is_empty() && self.delete.is_empty()
    }
}

/// Keep the first chunk of each hash and drop blank chunks
pub fn dedupe_chunks(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut seen = HashSet::new();
    chunks
        .into_iter()
        .filter(|c| !c.content.trim().is_empty())
        .filter(|c| seen.insert(c.hash.clone()))
        .collect()
}
