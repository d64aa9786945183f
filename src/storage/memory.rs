//! In-memory repositories for tests and embedded use
//!
//! Everything lives in `HashMap`s behind `std::sync::RwLock`. Vector search
//! is brute-force cosine similarity over the project's vectors only.

use super::sqlite::sort_matches;
use super::{
    ChunkMatch, CommitOutcome, CoverageRepository, DocumentRepository, DriftRepository,
    EmbeddingRepository, ReconcileBatch, Revision,
};
use crate::coverage::CoverageSnapshot;
use crate::document::{Document, DocumentHistory, EmbeddingRecord};
use crate::drift::DriftEvent;
use crate::embedding::cosine_similarity;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    documents: HashMap<String, Document>,
    /// document_id -> version -> row
    history: HashMap<String, BTreeMap<i64, DocumentHistory>>,
    /// document_id -> chunk_hash -> record
    embeddings: HashMap<String, HashMap<String, EmbeddingRecord>>,
    drift_events: HashMap<String, DriftEvent>,
    snapshots: Vec<CoverageSnapshot>,
}

/// In-memory store implementing every repository trait
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Tables {
    fn document(&self, project_id: &str, document_id: &str) -> Option<&Document> {
        self.documents
            .get(document_id)
            .filter(|doc| doc.project_id == project_id)
    }
}

impl DocumentRepository for InMemoryStore {
    fn find_document(&self, project_id: &str, document_id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.document(project_id, document_id).cloned())
    }

    fn find_document_by_path(
        &self,
        project_id: &str,
        file_path: &str,
    ) -> Result<Option<Document>> {
        Ok(self
            .read()?
            .documents
            .values()
            .find(|doc| doc.project_id == project_id && doc.file_path == file_path)
            .cloned())
    }

    fn list_documents(&self, project_id: &str) -> Result<Vec<Document>> {
        let mut documents: Vec<Document> = self
            .read()?
            .documents
            .values()
            .filter(|doc| doc.project_id == project_id)
            .cloned()
            .collect();
        documents.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        Ok(documents)
    }

    fn insert_document(&self, doc: &Document) -> Result<CommitOutcome> {
        let mut tables = self.write()?;

        if let Some(existing) = tables
            .documents
            .values()
            .find(|d| d.project_id == doc.project_id && d.file_path == doc.file_path)
        {
            return Ok(CommitOutcome::Conflict {
                current_version: Some(existing.version),
            });
        }

        tables.documents.insert(doc.id.clone(), doc.clone());
        Ok(CommitOutcome::Committed(doc.clone()))
    }

    fn commit_revision(&self, revision: &Revision) -> Result<CommitOutcome> {
        let mut tables = self.write()?;

        let current = match tables.document(&revision.project_id, &revision.document_id) {
            Some(doc) if doc.version == revision.expected_version => doc.clone(),
            other => {
                return Ok(CommitOutcome::Conflict {
                    current_version: other.map(|d| d.version),
                })
            }
        };

        let mut history = DocumentHistory::snapshot(&current);
        history.archived_at = revision.updated_at;
        tables
            .history
            .entry(current.id.clone())
            .or_default()
            .insert(history.version, history);

        let updated = Document {
            title: revision.title.clone(),
            content: revision.content.clone(),
            version: current.version + 1,
            last_updated: revision.updated_at,
            ..current
        };
        tables.documents.insert(updated.id.clone(), updated.clone());

        Ok(CommitOutcome::Committed(updated))
    }

    fn delete_document(&self, project_id: &str, document_id: &str) -> Result<bool> {
        let mut tables = self.write()?;
        if tables.document(project_id, document_id).is_none() {
            return Ok(false);
        }

        tables.documents.remove(document_id);
        tables.embeddings.remove(document_id);
        Ok(true)
    }

    fn record_access(&self, project_id: &str, document_id: &str) -> Result<()> {
        let mut tables = self.write()?;
        if let Some(doc) = tables
            .documents
            .get_mut(document_id)
            .filter(|doc| doc.project_id == project_id)
        {
            doc.access_count += 1;
        }
        Ok(())
    }

    fn list_history(&self, document_id: &str) -> Result<Vec<DocumentHistory>> {
        Ok(self
            .read()?
            .history
            .get(document_id)
            .map(|rows| rows.values().rev().cloned().collect())
            .unwrap_or_default())
    }

    fn find_history(&self, document_id: &str, version: i64) -> Result<Option<DocumentHistory>> {
        Ok(self
            .read()?
            .history
            .get(document_id)
            .and_then(|rows| rows.get(&version))
            .cloned())
    }
}

impl EmbeddingRepository for InMemoryStore {
    fn chunk_hashes(&self, document_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .read()?
            .embeddings
            .get(document_id)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn reconcile(&self, document_id: &str, batch: &ReconcileBatch) -> Result<bool> {
        let mut tables = self.write()?;
        let current = tables.documents.get(document_id).map(|doc| doc.version);
        if current != Some(batch.document_version) {
            return Ok(false);
        }

        let records = tables
            .embeddings
            .entry(document_id.to_string())
            .or_default();

        for hash in &batch.deletes {
            records.remove(hash);
        }
        for record in &batch.inserts {
            records.insert(record.chunk_hash.clone(), record.clone());
        }

        if records.is_empty() {
            tables.embeddings.remove(document_id);
        }
        Ok(true)
    }

    fn nearest_chunks(
        &self,
        project_id: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkMatch>> {
        let tables = self.read()?;

        let mut matches: Vec<ChunkMatch> = tables
            .embeddings
            .iter()
            .filter(|(document_id, _)| tables.document(project_id, document_id).is_some())
            .flat_map(|(_, records)| records.values())
            .map(|record| ChunkMatch {
                document_id: record.document_id.clone(),
                chunk_hash: record.chunk_hash.clone(),
                content_chunk: record.content_chunk.clone(),
                similarity: cosine_similarity(query, &record.embedding),
            })
            .collect();

        sort_matches(&mut matches);
        matches.truncate(limit);
        Ok(matches)
    }

    fn chunk_counts(&self, project_id: &str) -> Result<HashMap<String, usize>> {
        let tables = self.read()?;
        Ok(tables
            .embeddings
            .iter()
            .filter(|(document_id, _)| tables.document(project_id, document_id).is_some())
            .map(|(document_id, records)| (document_id.clone(), records.len()))
            .collect())
    }
}

impl DriftRepository for InMemoryStore {
    fn insert_drift_event(&self, event: &DriftEvent) -> Result<()> {
        self.write()?
            .drift_events
            .insert(event.id.clone(), event.clone());
        Ok(())
    }

    fn find_drift_event(&self, project_id: &str, id: &str) -> Result<Option<DriftEvent>> {
        Ok(self
            .read()?
            .drift_events
            .get(id)
            .filter(|event| event.project_id == project_id)
            .cloned())
    }

    fn mark_resolved(
        &self,
        project_id: &str,
        id: &str,
        resolved_by: &str,
        note: Option<&str>,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.write()?;
        let Some(event) = tables
            .drift_events
            .get_mut(id)
            .filter(|event| event.project_id == project_id && !event.resolved)
        else {
            return Ok(false);
        };

        event.resolved = true;
        event.resolved_at = Some(resolved_at);
        event.resolved_by = Some(resolved_by.to_string());
        event.resolution_note = note.map(str::to_string);
        Ok(true)
    }

    fn list_drift_events(
        &self,
        project_id: &str,
        include_resolved: bool,
    ) -> Result<Vec<DriftEvent>> {
        let mut events: Vec<DriftEvent> = self
            .read()?
            .drift_events
            .values()
            .filter(|event| event.project_id == project_id)
            .filter(|event| include_resolved || !event.resolved)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            b.detected_at
                .cmp(&a.detected_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(events)
    }
}

impl CoverageRepository for InMemoryStore {
    fn insert_snapshot(&self, snapshot: &CoverageSnapshot) -> Result<()> {
        self.write()?.snapshots.push(snapshot.clone());
        Ok(())
    }

    fn list_snapshots(&self, project_id: &str, limit: usize) -> Result<Vec<CoverageSnapshot>> {
        let mut snapshots: Vec<CoverageSnapshot> = self
            .read()?
            .snapshots
            .iter()
            .filter(|snapshot| snapshot.project_id == project_id)
            .cloned()
            .collect();
        snapshots.sort_by(|a, b| {
            b.snapshot_at
                .cmp(&a.snapshot_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        snapshots.truncate(limit);
        Ok(snapshots)
    }
}
