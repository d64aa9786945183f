//! Tenant-scoped semantic search and document reads
//!
//! Search embeds the query, pulls the nearest chunks of one project, folds
//! them into per-document relevance and enriches the top documents in
//! parallel. Reads resolve an id or path and suggest near misses.

mod rank;

pub use rank::{aggregate, shortlist, snippet, Candidate, ResultType};

use crate::config::SearchConfig;
use crate::document::{Document, DocumentHistory};
use crate::embedding::EmbeddingGateway;
use crate::error::CoreResult;
use crate::storage::{DocumentRepository, EmbeddingRepository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;

/// A ranked search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub path: String,
    /// Best matching chunk, shortened
    pub snippet: String,
    pub relevance: f64,
    #[serde(rename = "type")]
    pub result_type: ResultType,
    pub version: i64,
    pub last_updated: DateTime<Utc>,
}

/// A document close to an identifier that matched nothing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    pub path: String,
    pub title: String,
    pub similarity: f64,
}

/// Result of [`SearchEngine::read_document`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReadOutcome {
    Found {
        document: Document,
        /// Archived versions, newest first
        history: Vec<DocumentHistory>,
    },
    NotFound { suggestions: Vec<Suggestion> },
}

/// Character-level similarity of two identifiers, case-insensitive
pub fn identifier_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    similar::TextDiff::from_chars(a.as_str(), b.as_str()).ratio() as f64
}

pub struct SearchEngine {
    documents: Arc<dyn DocumentRepository>,
    embeddings: Arc<dyn EmbeddingRepository>,
    gateway: EmbeddingGateway,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        embeddings: Arc<dyn EmbeddingRepository>,
        gateway: EmbeddingGateway,
        config: SearchConfig,
    ) -> Self {
        Self {
            documents,
            embeddings,
            gateway,
            config,
        }
    }

    /// Rank the project's documents against `query`
    pub async fn search_documents(
        &self,
        query: &str,
        project_id: &str,
    ) -> CoreResult<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.gateway.embed_one(query).await?;
        let matches =
            self.embeddings
                .nearest_chunks(project_id, &vector, self.config.candidate_chunks)?;
        let candidates = shortlist(
            aggregate(&matches, &self.config),
            self.config.result_limit,
        );

        let mut hits = self.enrich(project_id, candidates).await?;
        hits.sort_by(|(a_relevance, a_doc, _), (b_relevance, b_doc, _)| {
            rank::compare_hits(*a_relevance, a_doc, *b_relevance, b_doc)
        });
        hits.truncate(self.config.result_limit);

        let returned = hits.iter().map(|(_, doc, _)| doc.id.clone()).collect();
        self.record_accesses(project_id, returned).await?;

        let hits: Vec<SearchHit> = hits
            .into_iter()
            .map(|(relevance, doc, best_chunk)| SearchHit {
                result_type: ResultType::for_document(&doc),
                snippet: snippet(&best_chunk, self.config.snippet_chars),
                relevance,
                id: doc.id,
                title: doc.title,
                path: doc.file_path,
                version: doc.version,
                last_updated: doc.last_updated,
            })
            .collect();

        tracing::debug!(
            project = project_id,
            chunks = matches.len(),
            results = hits.len(),
            "search completed"
        );

        Ok(hits)
    }

    /// Fetch the full documents for the shortlisted candidates concurrently
    async fn enrich(
        &self,
        project_id: &str,
        candidates: Vec<Candidate>,
    ) -> CoreResult<Vec<(f64, Document, String)>> {
        let mut tasks = JoinSet::new();

        for candidate in candidates {
            let documents = Arc::clone(&self.documents);
            let project_id = project_id.to_string();

            tasks.spawn_blocking(move || {
                let found = documents.find_document(&project_id, &candidate.document_id)?;
                anyhow::Ok(found.map(|doc| (candidate.relevance, doc, candidate.best_chunk)))
            });
        }

        let mut enriched = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => enriched.extend(result?),
                Err(e) => tracing::error!("search enrichment task failed: {}", e),
            }
        }

        Ok(enriched)
    }

    /// Count a search access on every returned document
    async fn record_accesses(&self, project_id: &str, document_ids: Vec<String>) -> CoreResult<()> {
        let documents = Arc::clone(&self.documents);
        let project_id = project_id.to_string();

        let recorded = tokio::task::spawn_blocking(move || {
            document_ids
                .iter()
                .try_for_each(|id| documents.record_access(&project_id, id))
        })
        .await;

        match recorded {
            Ok(result) => Ok(result?),
            Err(e) => {
                tracing::error!("recording search access failed: {}", e);
                Ok(())
            }
        }
    }

    /// Read a document by id or path, with its history
    pub fn read_document(&self, identifier: &str, project_id: &str) -> CoreResult<ReadOutcome> {
        let identifier = identifier.trim();
        let found = match self.documents.find_document(project_id, identifier)? {
            Some(doc) => Some(doc),
            None => self
                .documents
                .find_document_by_path(project_id, identifier)?,
        };

        if let Some(document) = found {
            self.documents.record_access(project_id, &document.id)?;
            let history = self.documents.list_history(&document.id)?;
            return Ok(ReadOutcome::Found { document, history });
        }

        let suggestions = self.suggest(identifier, project_id)?;
        tracing::debug!(
            project = project_id,
            identifier,
            suggestions = suggestions.len(),
            "document not found"
        );
        Ok(ReadOutcome::NotFound { suggestions })
    }

    fn suggest(&self, identifier: &str, project_id: &str) -> CoreResult<Vec<Suggestion>> {
        let mut suggestions: Vec<Suggestion> = self
            .documents
            .list_documents(project_id)?
            .into_iter()
            .map(|doc| {
                let file_name = doc.file_path.rsplit('/').next().unwrap_or(&doc.file_path);
                let similarity = identifier_similarity(identifier, &doc.file_path)
                    .max(identifier_similarity(identifier, file_name))
                    .max(identifier_similarity(identifier, &doc.title));
                Suggestion {
                    id: doc.id,
                    path: doc.file_path,
                    title: doc.title,
                    similarity,
                }
            })
            .filter(|s| s.similarity >= self.config.suggestion_threshold)
            .collect();

        suggestions.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.path.cmp(&b.path))
        });
        suggestions.truncate(self.config.suggestion_limit);

        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{ProjectScope, Role};
    use crate::config::{ChunkingConfig, EmbeddingConfig};
    use crate::embedding::MockEmbedding;
    use crate::extract::Chunker;
    use crate::storage::InMemoryStore;
    use crate::sync::SyncEngine;

    const DIM: usize = 64;

    fn gateway() -> EmbeddingGateway {
        let config = EmbeddingConfig {
            provider: "mock".to_string(),
            dimension: DIM,
            ..EmbeddingConfig::default()
        };
        EmbeddingGateway::new(Arc::new(MockEmbedding::new(DIM)), &config)
    }

    fn engines(store: &Arc<InMemoryStore>) -> (SyncEngine, SearchEngine) {
        let sync = SyncEngine::new(
            store.clone(),
            store.clone(),
            gateway(),
            Chunker::new(ChunkingConfig::default()),
        );
        let search = SearchEngine::new(
            store.clone(),
            store.clone(),
            gateway(),
            SearchConfig::default(),
        );
        (sync, search)
    }

    #[tokio::test]
    async fn test_exact_chunk_ranks_first() {
        let store = Arc::new(InMemoryStore::new());
        let (sync, search) = engines(&store);
        let scope = ProjectScope::new("p1", Role::Editor);

        sync.sync_document(&scope, "patterns/auth.md", "Auth", "Use JWT. Use PKCE.")
            .await
            .unwrap();
        sync.sync_document(&scope, "guides/deploy.md", "Deploy", "Tag the release.")
            .await
            .unwrap();

        let hits = search.search_documents("Use PKCE.", "p1").await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].path, "patterns/auth.md");
        assert_eq!(hits[0].result_type, ResultType::Pattern);
        assert!(hits[0].relevance > 0.99);
        assert!(hits[0].snippet.contains("PKCE"));

        let doc = store
            .find_document_by_path("p1", "patterns/auth.md")
            .unwrap()
            .unwrap();
        assert_eq!(doc.access_count, 1);
    }

    #[tokio::test]
    async fn test_only_returned_hits_count_as_access() {
        let store = Arc::new(InMemoryStore::new());
        let (sync, _) = engines(&store);
        let search = SearchEngine::new(
            store.clone(),
            store.clone(),
            gateway(),
            SearchConfig {
                result_limit: 1,
                ..SearchConfig::default()
            },
        );
        let scope = ProjectScope::new("p1", Role::Editor);

        // Identical text ties both documents at the cutoff
        sync.sync_document(&scope, "guides/a.md", "A", "Rotate keys monthly.")
            .await
            .unwrap();
        sync.sync_document(&scope, "guides/b.md", "B", "Rotate keys monthly.")
            .await
            .unwrap();

        let hits = search
            .search_documents("Rotate keys monthly.", "p1")
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let counts: Vec<(String, u64)> = store
            .list_documents("p1")
            .unwrap()
            .into_iter()
            .map(|doc| (doc.id, doc.access_count))
            .collect();
        for (id, count) in counts {
            let expected = if id == hits[0].id { 1 } else { 0 };
            assert_eq!(count, expected, "access count of {}", id);
        }
    }

    #[tokio::test]
    async fn test_search_never_crosses_projects() {
        let store = Arc::new(InMemoryStore::new());
        let (sync, search) = engines(&store);

        sync.sync_document(
            &ProjectScope::new("tenant-a", Role::Admin),
            "secret.md",
            "Secret",
            "The launch code is 1234.",
        )
        .await
        .unwrap();

        let hits = search
            .search_documents("The launch code is 1234.", "tenant-b")
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_empty_query() {
        let store = Arc::new(InMemoryStore::new());
        let (_, search) = engines(&store);
        assert!(search.search_documents("   ", "p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_document_and_suggestions() {
        let store = Arc::new(InMemoryStore::new());
        let (sync, search) = engines(&store);
        let scope = ProjectScope::new("p1", Role::Editor);

        let report = sync
            .sync_document(&scope, "patterns/auth.md", "Auth", "Use JWT.")
            .await
            .unwrap();
        sync.sync_document(&scope, "patterns/auth.md", "Auth", "Use PKCE.")
            .await
            .unwrap();

        match search.read_document(&report.document_id, "p1").unwrap() {
            ReadOutcome::Found { document, history } => {
                assert_eq!(document.content, "Use PKCE.");
                assert_eq!(history.len(), 1);
            }
            other => panic!("expected a document, got {:?}", other),
        }
        assert!(matches!(
            search.read_document("patterns/auth.md", "p1").unwrap(),
            ReadOutcome::Found { .. }
        ));

        match search.read_document("patterns/auht.md", "p1").unwrap() {
            ReadOutcome::NotFound { suggestions } => {
                assert_eq!(suggestions.len(), 1);
                assert_eq!(suggestions[0].path, "patterns/auth.md");
            }
            other => panic!("expected suggestions, got {:?}", other),
        }

        // Nothing leaks from another project
        match search.read_document("patterns/auth.md", "p2").unwrap() {
            ReadOutcome::NotFound { suggestions } => assert!(suggestions.is_empty()),
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn test_identifier_similarity() {
        assert_eq!(identifier_similarity("Auth.md", "auth.md"), 1.0);
        assert_eq!(identifier_similarity("", "auth.md"), 0.0);
        assert!(identifier_similarity("auht", "auth") > 0.5);
    }
}
