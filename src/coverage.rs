//! Coverage: how much of a project's corpus is actually searchable
//!
//! A document counts as covered once it holds at least one stored
//! embedding. The breakdown always lists every category, including the
//! explicit uncategorized bucket.

use crate::document::DocType;
use crate::error::CoreResult;
use crate::storage::{CoverageRepository, DocumentRepository, EmbeddingRepository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What caused a snapshot to be taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotTrigger {
    Manual,
    Scheduled,
}

impl SnapshotTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotTrigger::Manual => "manual",
            SnapshotTrigger::Scheduled => "scheduled",
        }
    }

    /// Parse a stored label; anything unrecognized is treated as manual
    pub fn parse(value: &str) -> Self {
        match value {
            "scheduled" => SnapshotTrigger::Scheduled,
            _ => SnapshotTrigger::Manual,
        }
    }
}

/// Coverage of one document category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCoverage {
    pub doc_type: DocType,
    pub total_documents: usize,
    pub docs_with_embeddings: usize,
    pub total_chunks: usize,
    pub coverage_percentage: u32,
}

/// Coverage of a whole project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub project_id: String,
    pub coverage_percentage: u32,
    pub total_documents: usize,
    pub docs_with_embeddings: usize,
    pub total_chunks: usize,
    pub breakdown: Vec<CategoryCoverage>,
}

/// A persisted point-in-time coverage report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSnapshot {
    pub id: String,
    pub project_id: String,
    pub coverage_percentage: u32,
    pub total_documents: usize,
    pub docs_with_embeddings: usize,
    pub total_chunks: usize,
    pub breakdown: Vec<CategoryCoverage>,
    pub trigger: SnapshotTrigger,
    pub snapshot_at: DateTime<Utc>,
}

impl CoverageSnapshot {
    pub fn from_report(report: CoverageReport, trigger: SnapshotTrigger) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: report.project_id,
            coverage_percentage: report.coverage_percentage,
            total_documents: report.total_documents,
            docs_with_embeddings: report.docs_with_embeddings,
            total_chunks: report.total_chunks,
            breakdown: report.breakdown,
            trigger,
            snapshot_at: Utc::now(),
        }
    }
}

/// `round(covered / total * 100)`, 0 when there is nothing to cover
pub fn coverage_percentage(covered: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((covered as f64 / total as f64) * 100.0).round() as u32
}

#[derive(Default)]
struct Tally {
    total_documents: usize,
    docs_with_embeddings: usize,
    total_chunks: usize,
}

impl Tally {
    fn add(&mut self, chunks: usize) {
        self.total_documents += 1;
        self.total_chunks += chunks;
        if chunks > 0 {
            self.docs_with_embeddings += 1;
        }
    }
}

/// Computes and records coverage
pub struct CoverageCalculator {
    documents: Arc<dyn DocumentRepository>,
    embeddings: Arc<dyn EmbeddingRepository>,
    snapshots: Arc<dyn CoverageRepository>,
}

impl CoverageCalculator {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        embeddings: Arc<dyn EmbeddingRepository>,
        snapshots: Arc<dyn CoverageRepository>,
    ) -> Self {
        Self {
            documents,
            embeddings,
            snapshots,
        }
    }

    /// Coverage of `project_id` as currently stored
    pub fn calculate_coverage(&self, project_id: &str) -> CoreResult<CoverageReport> {
        let documents = self.documents.list_documents(project_id)?;
        let counts = self.embeddings.chunk_counts(project_id)?;

        let mut overall = Tally::default();
        let mut by_type: BTreeMap<DocType, Tally> = BTreeMap::new();

        for doc in &documents {
            let chunks = counts.get(&doc.id).copied().unwrap_or(0);
            overall.add(chunks);
            by_type.entry(doc.doc_type).or_default().add(chunks);
        }

        let breakdown = DocType::ALL
            .iter()
            .map(|doc_type| {
                let tally = by_type.remove(doc_type).unwrap_or_default();
                CategoryCoverage {
                    doc_type: *doc_type,
                    coverage_percentage: coverage_percentage(
                        tally.docs_with_embeddings,
                        tally.total_documents,
                    ),
                    total_documents: tally.total_documents,
                    docs_with_embeddings: tally.docs_with_embeddings,
                    total_chunks: tally.total_chunks,
                }
            })
            .collect();

        let report = CoverageReport {
            project_id: project_id.to_string(),
            coverage_percentage: coverage_percentage(
                overall.docs_with_embeddings,
                overall.total_documents,
            ),
            total_documents: overall.total_documents,
            docs_with_embeddings: overall.docs_with_embeddings,
            total_chunks: overall.total_chunks,
            breakdown,
        };

        tracing::debug!(
            project = project_id,
            coverage = report.coverage_percentage,
            documents = report.total_documents,
            "coverage calculated"
        );

        Ok(report)
    }

    /// Calculate and persist a snapshot
    pub fn save_coverage_snapshot(
        &self,
        project_id: &str,
        trigger: SnapshotTrigger,
    ) -> CoreResult<CoverageSnapshot> {
        let report = self.calculate_coverage(project_id)?;
        let snapshot = CoverageSnapshot::from_report(report, trigger);
        self.snapshots.insert_snapshot(&snapshot)?;

        tracing::info!(
            project = project_id,
            trigger = trigger.as_str(),
            coverage = snapshot.coverage_percentage,
            "coverage snapshot saved"
        );

        Ok(snapshot)
    }

    /// Saved snapshots, newest first
    pub fn list_coverage_snapshots(
        &self,
        project_id: &str,
        limit: usize,
    ) -> CoreResult<Vec<CoverageSnapshot>> {
        Ok(self.snapshots.list_snapshots(project_id, limit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, EmbeddingRecord};
    use crate::extract::{ChunkMetadata, ChunkOrigin};
    use crate::storage::{InMemoryStore, ReconcileBatch};

    fn calculator(store: &Arc<InMemoryStore>) -> CoverageCalculator {
        CoverageCalculator::new(store.clone(), store.clone(), store.clone())
    }

    fn embed(store: &InMemoryStore, doc: &Document, hashes: &[&str]) {
        let inserts = hashes
            .iter()
            .map(|hash| EmbeddingRecord {
                id: uuid::Uuid::new_v4().to_string(),
                document_id: doc.id.clone(),
                content_chunk: hash.to_string(),
                chunk_hash: hash.to_string(),
                embedding: vec![1.0, 0.0],
                metadata: ChunkMetadata {
                    index: 0,
                    start_line: 1,
                    end_line: 1,
                    byte_start: 0,
                    byte_end: 1,
                    origin: ChunkOrigin::Section {
                        heading_path: vec![],
                    },
                },
            })
            .collect();
        store
            .reconcile(
                &doc.id,
                &ReconcileBatch {
                    document_version: doc.version,
                    inserts,
                    deletes: vec![],
                },
            )
            .unwrap();
    }

    #[test]
    fn test_coverage_percentage() {
        assert_eq!(coverage_percentage(0, 0), 0);
        assert_eq!(coverage_percentage(1, 3), 33);
        assert_eq!(coverage_percentage(2, 3), 67);
        assert_eq!(coverage_percentage(4, 4), 100);
    }

    #[test]
    fn test_empty_project() {
        let store = Arc::new(InMemoryStore::new());
        let report = calculator(&store).calculate_coverage("p1").unwrap();

        assert_eq!(report.coverage_percentage, 0);
        assert_eq!(report.total_documents, 0);
        assert_eq!(report.breakdown.len(), DocType::ALL.len());
    }

    #[test]
    fn test_breakdown_by_category() {
        let store = Arc::new(InMemoryStore::new());
        let auth = Document::new("p1", "patterns/auth.md", "Auth", "Use JWT.");
        let errors = Document::new("p1", "patterns/errors.md", "Errors", "Wrap errors.");
        let notes = Document::new("p1", "notes.md", "Notes", "misc");
        for doc in [&auth, &errors, &notes] {
            store.insert_document(doc).unwrap();
        }
        embed(&store, &auth, &["a", "b"]);
        embed(&store, &notes, &["c"]);

        let report = calculator(&store).calculate_coverage("p1").unwrap();
        assert_eq!(report.total_documents, 3);
        assert_eq!(report.docs_with_embeddings, 2);
        assert_eq!(report.total_chunks, 3);
        assert_eq!(report.coverage_percentage, 67);

        let patterns = report
            .breakdown
            .iter()
            .find(|c| c.doc_type == DocType::Pattern)
            .unwrap();
        assert_eq!(patterns.total_documents, 2);
        assert_eq!(patterns.coverage_percentage, 50);

        let uncategorized = report
            .breakdown
            .iter()
            .find(|c| c.doc_type == DocType::Uncategorized)
            .unwrap();
        assert_eq!(uncategorized.docs_with_embeddings, 1);
    }

    #[test]
    fn test_snapshots_are_saved_and_listed() {
        let store = Arc::new(InMemoryStore::new());
        let calculator = calculator(&store);

        let first = calculator
            .save_coverage_snapshot("p1", SnapshotTrigger::Manual)
            .unwrap();
        let second = calculator
            .save_coverage_snapshot("p1", SnapshotTrigger::Scheduled)
            .unwrap();

        let listed = calculator.list_coverage_snapshots("p1", 10).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].snapshot_at >= listed[1].snapshot_at);
        assert!(listed.iter().any(|s| s.id == first.id));
        assert!(listed.iter().any(|s| s.id == second.id));
        assert!(calculator.list_coverage_snapshots("p2", 10).unwrap().is_empty());
    }
}
