//! Storage layer
//!
//! Engines talk to storage only through the repository traits below, so the
//! SQLite [`Database`] and the [`InMemoryStore`] are interchangeable.
//!
//! Write operations that must not be observed half-applied are single trait
//! calls: a document revision (history row + new version) and an embedding
//! reconciliation (inserts + deletes) each commit atomically.

mod memory;
mod schema;
mod sqlite;

pub use memory::InMemoryStore;
pub use schema::SCHEMA;
pub use sqlite::Database;

use crate::coverage::CoverageSnapshot;
use crate::document::{Document, DocumentHistory, EmbeddingRecord};
use crate::drift::DriftEvent;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// A content change to apply on top of a known version
#[derive(Debug, Clone)]
pub struct Revision {
    pub project_id: String,
    pub document_id: String,
    /// Version the caller read; the commit fails if it moved
    pub expected_version: i64,
    pub title: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

/// Result of an optimistic write
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Written; carries the stored document
    Committed(Document),
    /// Someone else got there first
    Conflict { current_version: Option<i64> },
}

/// Inserts and deletes for one document's embedding set
#[derive(Debug, Clone, Default)]
pub struct ReconcileBatch {
    /// Document version the batch was planned against
    pub document_version: i64,
    pub inserts: Vec<EmbeddingRecord>,
    /// Chunk hashes to remove
    pub deletes: Vec<String>,
}

impl ReconcileBatch {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.deletes.is_empty()
    }
}

/// A stored chunk close to a query vector
#[derive(Debug, Clone)]
pub struct ChunkMatch {
    pub document_id: String,
    pub chunk_hash: String,
    pub content_chunk: String,
    pub similarity: f64,
}

/// Documents and their version history
pub trait DocumentRepository: Send + Sync {
    /// Look up a document by id within a project
    fn find_document(&self, project_id: &str, document_id: &str) -> Result<Option<Document>>;

    /// Look up a document by path within a project
    fn find_document_by_path(&self, project_id: &str, file_path: &str)
        -> Result<Option<Document>>;

    /// All documents of a project, ordered by path
    fn list_documents(&self, project_id: &str) -> Result<Vec<Document>>;

    /// Insert a new document; conflicts if the path is taken
    fn insert_document(&self, doc: &Document) -> Result<CommitOutcome>;

    /// Archive the current state and apply the revision, atomically, if the
    /// stored version still equals `expected_version`
    fn commit_revision(&self, revision: &Revision) -> Result<CommitOutcome>;

    /// Remove a document and its embeddings; history rows are kept
    fn delete_document(&self, project_id: &str, document_id: &str) -> Result<bool>;

    /// Count a read or search hit
    fn record_access(&self, project_id: &str, document_id: &str) -> Result<()>;

    /// History rows of a document, newest version first
    fn list_history(&self, document_id: &str) -> Result<Vec<DocumentHistory>>;

    /// The history row holding `version`
    fn find_history(&self, document_id: &str, version: i64) -> Result<Option<DocumentHistory>>;
}

/// Chunk vectors
pub trait EmbeddingRepository: Send + Sync {
    /// Hashes currently stored for a document
    fn chunk_hashes(&self, document_id: &str) -> Result<HashSet<String>>;

    /// Apply inserts and deletes in one transaction. Nothing is written and
    /// false is returned when the document is gone or no longer at
    /// `batch.document_version`.
    fn reconcile(&self, document_id: &str, batch: &ReconcileBatch) -> Result<bool>;

    /// Nearest chunks among the project's documents only
    fn nearest_chunks(&self, project_id: &str, query: &[f32], limit: usize)
        -> Result<Vec<ChunkMatch>>;

    /// Stored chunk count per document of a project
    fn chunk_counts(&self, project_id: &str) -> Result<HashMap<String, usize>>;
}

/// Drift events
pub trait DriftRepository: Send + Sync {
    fn insert_drift_event(&self, event: &DriftEvent) -> Result<()>;

    fn find_drift_event(&self, project_id: &str, id: &str) -> Result<Option<DriftEvent>>;

    /// Mark an unresolved event resolved. Returns false when the event was
    /// already resolved or does not exist.
    fn mark_resolved(
        &self,
        project_id: &str,
        id: &str,
        resolved_by: &str,
        note: Option<&str>,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Events of a project, newest first
    fn list_drift_events(&self, project_id: &str, include_resolved: bool)
        -> Result<Vec<DriftEvent>>;
}

/// Coverage snapshots
pub trait CoverageRepository: Send + Sync {
    fn insert_snapshot(&self, snapshot: &CoverageSnapshot) -> Result<()>;

    /// Snapshots of a project, newest first
    fn list_snapshots(&self, project_id: &str, limit: usize) -> Result<Vec<CoverageSnapshot>>;
}

/// Everything the engines need from one backing store
pub trait Store: DocumentRepository + EmbeddingRepository + DriftRepository + CoverageRepository {}

impl<T> Store for T where T: DocumentRepository + EmbeddingRepository + DriftRepository + CoverageRepository {}
