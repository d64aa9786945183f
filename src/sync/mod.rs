//! Incremental sync engine
//!
//! Every content change goes through [`SyncEngine::apply_content`]:
//! - The document row is upserted with an optimistic version check, and the
//!   previous state is archived in the same commit
//! - The new content is chunked and its hashes diffed against the stored
//!   embeddings, so only new chunks reach the embedding provider
//! - Inserts and deletes are applied in one reconcile call
//!
//! Direct edits, approved proposals and rollbacks are just different
//! [`ContentSource`]s for that one path.

mod lock;
mod plan;

pub use plan::{dedupe_chunks, ReconcilePlan};

use lock::DocumentLocks;

use crate::access::ProjectScope;
use crate::document::{Document, EmbeddingRecord};
use crate::embedding::EmbeddingGateway;
use crate::error::{CoreError, CoreResult};
use crate::extract::Chunker;
use crate::storage::{
    CommitOutcome, DocumentRepository, EmbeddingRepository, ReconcileBatch, Revision,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where a content change came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ContentSource {
    DirectEdit,
    ProposalApproval { proposal_id: String },
    Rollback { from_version: i64 },
}

impl ContentSource {
    fn action(&self) -> &'static str {
        match self {
            ContentSource::DirectEdit => "sync document",
            ContentSource::ProposalApproval { .. } => "approve proposal",
            ContentSource::Rollback { .. } => "rollback document",
        }
    }
}

/// A suggested edit waiting for review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentProposal {
    pub id: String,
    pub file_path: String,
    pub title: String,
    pub content: String,
    pub proposed_by: Option<String>,
}

/// Outcome of one sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub document_id: String,
    pub version: i64,
    /// Chunks embedded and stored by this sync
    pub chunks_indexed: usize,
    /// Chunks whose stored embedding was kept as is
    pub chunks_reused: usize,
    /// Stored embeddings removed because their chunk is gone
    pub chunks_deleted: usize,
    /// Chunks that could not be embedded; the next sync retries them
    pub chunks_failed: usize,
    /// Whether a new version was written
    pub version_changed: bool,
    /// A newer version landed before indexing finished, so this sync wrote
    /// no chunks
    pub superseded: bool,
}

impl SyncReport {
    /// Whether every chunk ended up with an embedding
    pub fn is_complete(&self) -> bool {
        self.chunks_failed == 0
    }
}

enum CommitAttempt {
    Applied { document: Document, changed: bool },
    Conflict { expected: i64, actual: i64 },
}

pub struct SyncEngine {
    documents: Arc<dyn DocumentRepository>,
    embeddings: Arc<dyn EmbeddingRepository>,
    gateway: EmbeddingGateway,
    chunker: Chunker,
    locks: DocumentLocks,
}

impl SyncEngine {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        embeddings: Arc<dyn EmbeddingRepository>,
        gateway: EmbeddingGateway,
        chunker: Chunker,
    ) -> Self {
        Self {
            documents,
            embeddings,
            gateway,
            chunker,
            locks: DocumentLocks::new(),
        }
    }

    /// Create or update the document at `file_path`
    pub async fn sync_document(
        &self,
        scope: &ProjectScope,
        file_path: &str,
        title: &str,
        content: &str,
    ) -> CoreResult<SyncReport> {
        self.apply_content(scope, file_path, title, content, ContentSource::DirectEdit)
            .await
    }

    /// Apply a reviewed proposal
    pub async fn approve_proposal(
        &self,
        scope: &ProjectScope,
        proposal: &ContentProposal,
    ) -> CoreResult<SyncReport> {
        tracing::info!(
            project = %scope.project_id,
            proposal = %proposal.id,
            proposed_by = proposal.proposed_by.as_deref().unwrap_or("unknown"),
            "approving proposal"
        );
        self.apply_content(
            scope,
            &proposal.file_path,
            &proposal.title,
            &proposal.content,
            ContentSource::ProposalApproval {
                proposal_id: proposal.id.clone(),
            },
        )
        .await
    }

    /// Re-apply an archived version as a new version
    pub async fn rollback_document(
        &self,
        scope: &ProjectScope,
        document_id: &str,
        version: i64,
    ) -> CoreResult<SyncReport> {
        scope.require_write("rollback document")?;

        let document = self
            .documents
            .find_document(&scope.project_id, document_id)?
            .ok_or_else(|| CoreError::NotFound {
                entity: "document",
                id: document_id.to_string(),
            })?;
        let snapshot = self
            .documents
            .find_history(document_id, version)?
            .ok_or_else(|| CoreError::NotFound {
                entity: "document version",
                id: format!("{}@{}", document_id, version),
            })?;

        self.apply_content(
            scope,
            &document.file_path,
            &snapshot.title,
            &snapshot.content,
            ContentSource::Rollback {
                from_version: version,
            },
        )
        .await
    }

    /// Remove a document and its embeddings. History is kept.
    pub async fn delete_document(&self, scope: &ProjectScope, document_id: &str) -> CoreResult<()> {
        scope.require_write("delete document")?;

        let not_found = || CoreError::NotFound {
            entity: "document",
            id: document_id.to_string(),
        };
        let document = self
            .documents
            .find_document(&scope.project_id, document_id)?
            .ok_or_else(not_found)?;

        let _guard = self
            .locks
            .acquire(&scope.project_id, &document.file_path)
            .await;
        if !self
            .documents
            .delete_document(&scope.project_id, document_id)?
        {
            return Err(not_found());
        }

        tracing::info!(
            project = %scope.project_id,
            path = %document.file_path,
            "document deleted"
        );
        Ok(())
    }

    /// The single write path for document content
    pub async fn apply_content(
        &self,
        scope: &ProjectScope,
        file_path: &str,
        title: &str,
        content: &str,
        source: ContentSource,
    ) -> CoreResult<SyncReport> {
        scope.require_write(source.action())?;
        if file_path.trim().is_empty() {
            return Err(CoreError::InvalidInput("file path is empty".to_string()));
        }

        let _guard = self.locks.acquire(&scope.project_id, file_path).await;
        tracing::debug!(path = file_path, tracked = self.locks.len(), "document lock held");

        let (document, changed) = self
            .commit_content(&scope.project_id, file_path, title, content)
            .await?;
        let mut report = self.reindex(&document).await?;
        report.version_changed = changed;

        tracing::info!(
            project = %scope.project_id,
            path = file_path,
            version = report.version,
            indexed = report.chunks_indexed,
            reused = report.chunks_reused,
            deleted = report.chunks_deleted,
            failed = report.chunks_failed,
            source = ?source,
            "document synced"
        );

        Ok(report)
    }

    /// Write the document row, retrying once if another writer got in first
    async fn commit_content(
        &self,
        project_id: &str,
        file_path: &str,
        title: &str,
        content: &str,
    ) -> CoreResult<(Document, bool)> {
        let mut attempt = self.try_commit(project_id, file_path, title, content)?;

        if let CommitAttempt::Conflict { expected, actual } = attempt {
            tracing::warn!(
                project = project_id,
                path = file_path,
                expected,
                actual,
                "version conflict, retrying against fresh state"
            );
            tokio::task::yield_now().await;
            attempt = self.try_commit(project_id, file_path, title, content)?;
        }

        match attempt {
            CommitAttempt::Applied { document, changed } => Ok((document, changed)),
            CommitAttempt::Conflict { expected, actual } => Err(CoreError::ConsistencyConflict {
                file_path: file_path.to_string(),
                expected,
                actual,
            }),
        }
    }

    fn try_commit(
        &self,
        project_id: &str,
        file_path: &str,
        title: &str,
        content: &str,
    ) -> CoreResult<CommitAttempt> {
        let attempt = match self.documents.find_document_by_path(project_id, file_path)? {
            None => {
                let document = Document::new(project_id, file_path, title, content);
                match self.documents.insert_document(&document)? {
                    CommitOutcome::Committed(document) => CommitAttempt::Applied {
                        document,
                        changed: true,
                    },
                    CommitOutcome::Conflict { current_version } => CommitAttempt::Conflict {
                        expected: 0,
                        actual: current_version.unwrap_or(0),
                    },
                }
            }
            Some(current) if !current.differs_from(title, content) => CommitAttempt::Applied {
                document: current,
                changed: false,
            },
            Some(current) => {
                let revision = Revision {
                    project_id: project_id.to_string(),
                    document_id: current.id.clone(),
                    expected_version: current.version,
                    title: title.to_string(),
                    content: content.to_string(),
                    updated_at: Utc::now(),
                };
                match self.documents.commit_revision(&revision)? {
                    CommitOutcome::Committed(document) => CommitAttempt::Applied {
                        document,
                        changed: true,
                    },
                    CommitOutcome::Conflict { current_version } => CommitAttempt::Conflict {
                        expected: current.version,
                        actual: current_version.unwrap_or(0),
                    },
                }
            }
        };

        Ok(attempt)
    }

    /// Bring stored embeddings in line with the document's content
    async fn reindex(&self, document: &Document) -> CoreResult<SyncReport> {
        let chunks = self.chunker.chunk(&document.file_path, &document.content);
        let stored = self.embeddings.chunk_hashes(&document.id)?;
        let plan = ReconcilePlan::compute(chunks, &stored);

        if plan.is_noop() {
            tracing::debug!(path = %document.file_path, kept = plan.keep, "index already current");
            return Ok(SyncReport {
                document_id: document.id.clone(),
                version: document.version,
                chunks_indexed: 0,
                chunks_reused: plan.keep,
                chunks_deleted: 0,
                chunks_failed: 0,
                version_changed: false,
                superseded: false,
            });
        }

        let texts = plan.insert.iter().map(|c| c.content.clone()).collect();
        let outcome = self.gateway.embed_many(texts).await;
        let failed = outcome.failed();

        let mut batch = ReconcileBatch {
            document_version: document.version,
            inserts: Vec::with_capacity(plan.insert.len()),
            deletes: plan.delete.clone(),
        };

        for (chunk, result) in plan.insert.iter().zip(outcome.results) {
            match result {
                Ok(embedding) => batch.inserts.push(EmbeddingRecord {
                    id: uuid::Uuid::new_v4().to_string(),
                    document_id: document.id.clone(),
                    content_chunk: chunk.content.clone(),
                    chunk_hash: chunk.hash.clone(),
                    embedding,
                    metadata: chunk.metadata.clone(),
                }),
                Err(e) => {
                    tracing::warn!(
                        path = %document.file_path,
                        chunk = chunk.metadata.index,
                        error = %e,
                        "chunk embedding failed"
                    );
                }
            }
        }

        if !batch.is_empty() && !self.embeddings.reconcile(&document.id, &batch)? {
            // A newer version was committed while this one was embedding;
            // its own reindex owns the chunk set now
            tracing::info!(
                path = %document.file_path,
                version = document.version,
                "superseded before reconcile, index left to newer version"
            );
            return Ok(SyncReport {
                document_id: document.id.clone(),
                version: document.version,
                chunks_indexed: 0,
                chunks_reused: 0,
                chunks_deleted: 0,
                chunks_failed: 0,
                version_changed: false,
                superseded: true,
            });
        }

        Ok(SyncReport {
            document_id: document.id.clone(),
            version: document.version,
            chunks_indexed: batch.inserts.len(),
            chunks_reused: plan.keep,
            chunks_deleted: batch.deletes.len(),
            chunks_failed: failed,
            version_changed: false,
            superseded: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::config::{ChunkingConfig, EmbeddingConfig};
    use crate::document::DocumentHistory;
    use crate::embedding::{EmbedError, EmbeddingProvider, MockEmbedding};
    use crate::storage::InMemoryStore;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    const DIM: usize = 32;

    fn embedding_config() -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "mock".to_string(),
            dimension: DIM,
            max_retries: 0,
            base_backoff_ms: 1,
            ..EmbeddingConfig::default()
        }
    }

    fn engine_with(store: &Arc<InMemoryStore>, provider: Arc<dyn EmbeddingProvider>) -> SyncEngine {
        SyncEngine::new(
            store.clone(),
            store.clone(),
            EmbeddingGateway::new(provider, &embedding_config()),
            Chunker::new(ChunkingConfig::default()),
        )
    }

    fn engine(store: &Arc<InMemoryStore>) -> SyncEngine {
        engine_with(store, Arc::new(MockEmbedding::new(DIM)))
    }

    fn editor() -> ProjectScope {
        ProjectScope::new("p1", Role::Editor)
    }

    /// Refuses any text containing "PKCE" while `down` is set
    struct Outage {
        down: AtomicBool,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for Outage {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            if self.down.load(Ordering::SeqCst) && text.contains("PKCE") {
                return Err(EmbedError::Transient("503 Service Unavailable".to_string()));
            }
            Ok(MockEmbedding::vector_for(text, DIM))
        }

        fn dimension(&self) -> usize {
            DIM
        }

        fn model_name(&self) -> &str {
            "outage"
        }
    }

    /// Answers after a fixed delay
    struct Slow {
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for Slow {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            tokio::time::sleep(self.delay).await;
            Ok(MockEmbedding::vector_for(text, DIM))
        }

        fn dimension(&self) -> usize {
            DIM
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    /// Reports a concurrent writer for the next `conflicts` revisions
    struct Contended {
        inner: Arc<InMemoryStore>,
        conflicts: AtomicUsize,
    }

    impl DocumentRepository for Contended {
        fn find_document(
            &self,
            project_id: &str,
            document_id: &str,
        ) -> anyhow::Result<Option<Document>> {
            self.inner.find_document(project_id, document_id)
        }

        fn find_document_by_path(
            &self,
            project_id: &str,
            file_path: &str,
        ) -> anyhow::Result<Option<Document>> {
            self.inner.find_document_by_path(project_id, file_path)
        }

        fn list_documents(&self, project_id: &str) -> anyhow::Result<Vec<Document>> {
            self.inner.list_documents(project_id)
        }

        fn insert_document(&self, doc: &Document) -> anyhow::Result<CommitOutcome> {
            self.inner.insert_document(doc)
        }

        fn commit_revision(&self, revision: &Revision) -> anyhow::Result<CommitOutcome> {
            let pending = self.conflicts.load(Ordering::SeqCst);
            if pending > 0 {
                self.conflicts.store(pending - 1, Ordering::SeqCst);
                return Ok(CommitOutcome::Conflict {
                    current_version: Some(revision.expected_version + 1),
                });
            }
            self.inner.commit_revision(revision)
        }

        fn delete_document(&self, project_id: &str, document_id: &str) -> anyhow::Result<bool> {
            self.inner.delete_document(project_id, document_id)
        }

        fn record_access(&self, project_id: &str, document_id: &str) -> anyhow::Result<()> {
            self.inner.record_access(project_id, document_id)
        }

        fn list_history(&self, document_id: &str) -> anyhow::Result<Vec<DocumentHistory>> {
            self.inner.list_history(document_id)
        }

        fn find_history(
            &self,
            document_id: &str,
            version: i64,
        ) -> anyhow::Result<Option<DocumentHistory>> {
            self.inner.find_history(document_id, version)
        }
    }

    fn contended_engine(store: &Arc<InMemoryStore>, conflicts: usize) -> SyncEngine {
        let documents = Arc::new(Contended {
            inner: store.clone(),
            conflicts: AtomicUsize::new(conflicts),
        });
        SyncEngine::new(
            documents,
            store.clone(),
            EmbeddingGateway::new(Arc::new(MockEmbedding::new(DIM)), &embedding_config()),
            Chunker::new(ChunkingConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_auth_document_lifecycle() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(&store);
        let scope = editor();

        let v1 = engine
            .sync_document(&scope, "patterns/auth.md", "Auth", "Use JWT.")
            .await
            .unwrap();
        assert_eq!(v1.version, 1);
        assert_eq!((v1.chunks_indexed, v1.chunks_reused), (1, 0));
        assert!(v1.version_changed);

        let v2 = engine
            .sync_document(&scope, "patterns/auth.md", "Auth", "Use JWT. Use PKCE.")
            .await
            .unwrap();
        assert_eq!(v2.version, 2);
        assert_eq!((v2.chunks_indexed, v2.chunks_reused), (1, 1));

        let history = store.list_history(&v1.document_id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, 1);
        assert_eq!(history[0].content, "Use JWT.");

        let v3 = engine
            .rollback_document(&scope, &v1.document_id, 1)
            .await
            .unwrap();
        assert_eq!(v3.version, 3);
        assert_eq!(v3.chunks_reused, 1);
        assert_eq!(v3.chunks_deleted, 1);

        let doc = store.find_document("p1", &v1.document_id).unwrap().unwrap();
        assert_eq!(doc.content, "Use JWT.");
        assert_eq!(store.list_history(&doc.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unchanged_resync_reuses_everything() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(&store);
        let content = "# Setup\n\nInstall the tool. Run the migrations.\n\n```sh\nmake db\n```\n";

        let first = engine
            .sync_document(&editor(), "guides/setup.md", "Setup", content)
            .await
            .unwrap();
        let again = engine
            .sync_document(&editor(), "guides/setup.md", "Setup", content)
            .await
            .unwrap();

        assert_eq!(again.version, first.version);
        assert!(!again.version_changed);
        assert_eq!(again.chunks_indexed, 0);
        assert_eq!(again.chunks_reused, first.chunks_indexed);
        assert!(store.list_history(&first.document_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_title_change_is_a_new_version() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(&store);

        engine
            .sync_document(&editor(), "a.md", "Old", "Same body.")
            .await
            .unwrap();
        let report = engine
            .sync_document(&editor(), "a.md", "New", "Same body.")
            .await
            .unwrap();

        assert_eq!(report.version, 2);
        assert_eq!(report.chunks_indexed, 0);
        assert_eq!(report.chunks_reused, 1);
    }

    #[tokio::test]
    async fn test_viewer_cannot_write() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(&store);
        let viewer = ProjectScope::new("p1", Role::Viewer);

        let err = engine
            .sync_document(&viewer, "a.md", "A", "text")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied { .. }));

        let err = engine.rollback_document(&viewer, "missing", 1).await.unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied { .. }));
        assert!(store.list_documents("p1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_to_missing_version() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(&store);

        let report = engine
            .sync_document(&editor(), "a.md", "A", "text")
            .await
            .unwrap();
        let err = engine
            .rollback_document(&editor(), &report.document_id, 7)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));

        // Another project cannot roll it back either
        let other = ProjectScope::new("p2", Role::Admin);
        let err = engine
            .rollback_document(&other, &report.document_id, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_failed_chunks_are_repaired_on_next_sync() {
        let store = Arc::new(InMemoryStore::new());
        let provider = Arc::new(Outage {
            down: AtomicBool::new(true),
        });
        let engine = engine_with(&store, provider.clone());

        let report = engine
            .sync_document(&editor(), "patterns/auth.md", "Auth", "Use JWT. Use PKCE.")
            .await
            .unwrap();
        assert_eq!(report.chunks_indexed, 1);
        assert_eq!(report.chunks_failed, 1);
        assert!(!report.is_complete());

        provider.down.store(false, Ordering::SeqCst);
        let repaired = engine
            .sync_document(&editor(), "patterns/auth.md", "Auth", "Use JWT. Use PKCE.")
            .await
            .unwrap();
        assert!(!repaired.version_changed);
        assert_eq!(repaired.chunks_indexed, 1);
        assert_eq!(repaired.chunks_reused, 1);
        assert!(repaired.is_complete());
    }

    #[tokio::test]
    async fn test_proposal_and_delete() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(&store);

        let proposal = ContentProposal {
            id: "prop-1".to_string(),
            file_path: "runbooks/deploy.md".to_string(),
            title: "Deploy".to_string(),
            content: "Tag the release. Run the pipeline.".to_string(),
            proposed_by: Some("sam".to_string()),
        };
        let report = engine.approve_proposal(&editor(), &proposal).await.unwrap();
        assert_eq!(report.chunks_indexed, 2);

        engine
            .delete_document(&editor(), &report.document_id)
            .await
            .unwrap();
        assert!(store.find_document("p1", &report.document_id).unwrap().is_none());
        assert!(store.chunk_hashes(&report.document_id).unwrap().is_empty());

        let err = engine
            .delete_document(&editor(), &report.document_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_syncs_are_serialized() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(&store);
        let scope = editor();

        engine
            .sync_document(&scope, "a.md", "A", "Start.")
            .await
            .unwrap();

        let (left, right) = tokio::join!(
            engine.sync_document(&scope, "a.md", "A", "Left edit."),
            engine.sync_document(&scope, "a.md", "A", "Right edit."),
        );
        let mut versions = vec![left.unwrap().version, right.unwrap().version];
        versions.sort();
        assert_eq!(versions, vec![2, 3]);

        let doc = store.find_document_by_path("p1", "a.md").unwrap().unwrap();
        let history = store.list_history(&doc.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(store.chunk_hashes(&doc.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_single_conflict_is_retried() {
        let store = Arc::new(InMemoryStore::new());
        engine(&store)
            .sync_document(&editor(), "a.md", "A", "First.")
            .await
            .unwrap();

        let report = contended_engine(&store, 1)
            .sync_document(&editor(), "a.md", "A", "Second.")
            .await
            .unwrap();
        assert_eq!(report.version, 2);
        assert!(report.version_changed);

        let doc = store.find_document_by_path("p1", "a.md").unwrap().unwrap();
        assert_eq!(doc.content, "Second.");
    }

    #[tokio::test]
    async fn test_repeated_conflict_is_surfaced() {
        let store = Arc::new(InMemoryStore::new());
        engine(&store)
            .sync_document(&editor(), "a.md", "A", "First.")
            .await
            .unwrap();

        let err = contended_engine(&store, 2)
            .sync_document(&editor(), "a.md", "A", "Second.")
            .await
            .unwrap_err();
        match err {
            CoreError::ConsistencyConflict {
                file_path,
                expected,
                actual,
            } => {
                assert_eq!(file_path, "a.md");
                assert_eq!((expected, actual), (1, 2));
            }
            other => panic!("expected a conflict, got {:?}", other),
        }

        // Nothing was written
        let doc = store.find_document_by_path("p1", "a.md").unwrap().unwrap();
        assert_eq!((doc.version, doc.content.as_str()), (1, "First."));
        assert!(store.list_history(&doc.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_superseded_reindex_leaves_newer_chunks() {
        let store = Arc::new(InMemoryStore::new());
        let slow = engine_with(
            &store,
            Arc::new(Slow {
                delay: Duration::from_millis(200),
            }),
        );
        let fast = engine(&store);

        fast.sync_document(&editor(), "a.md", "A", "Start.")
            .await
            .unwrap();

        let slow_editor = editor();
        let (stale, fresh) = tokio::join!(
            slow.sync_document(&slow_editor, "a.md", "A", "Alpha."),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                fast.sync_document(&editor(), "a.md", "A", "Beta.").await
            },
        );
        let stale = stale.unwrap();
        let fresh = fresh.unwrap();

        assert_eq!((stale.version, fresh.version), (2, 3));
        assert!(stale.superseded);
        assert_eq!(stale.chunks_indexed, 0);
        assert!(!fresh.superseded);

        let doc = store.find_document_by_path("p1", "a.md").unwrap().unwrap();
        assert_eq!(doc.content, "Beta.");
        let expected: std::collections::HashSet<String> =
            [crate::extract::content_hash("Beta.")].into_iter().collect();
        assert_eq!(store.chunk_hashes(&doc.id).unwrap(), expected);
    }
}
