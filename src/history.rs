//! Read access to archived document versions
//!
//! History rows are written only by the sync engine, inside the same commit
//! that bumps the document version. Nothing here mutates them.

use crate::document::DocumentHistory;
use crate::error::CoreResult;
use crate::storage::DocumentRepository;
use std::sync::Arc;

pub struct VersionStore {
    documents: Arc<dyn DocumentRepository>,
}

impl VersionStore {
    pub fn new(documents: Arc<dyn DocumentRepository>) -> Self {
        Self { documents }
    }

    /// All archived versions of a document, newest first
    ///
    /// Empty when the document is not part of the project.
    pub fn get_history(
        &self,
        project_id: &str,
        document_id: &str,
    ) -> CoreResult<Vec<DocumentHistory>> {
        if self.documents.find_document(project_id, document_id)?.is_none() {
            return Ok(Vec::new());
        }
        Ok(self.documents.list_history(document_id)?)
    }

    /// One archived version, if it exists
    pub fn get_version(
        &self,
        project_id: &str,
        document_id: &str,
        version: i64,
    ) -> CoreResult<Option<DocumentHistory>> {
        if self.documents.find_document(project_id, document_id)?.is_none() {
            return Ok(None);
        }
        Ok(self.documents.find_history(document_id, version)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::storage::{InMemoryStore, Revision};
    use chrono::Utc;

    #[test]
    fn test_history_is_project_scoped_and_descending() {
        let store = Arc::new(InMemoryStore::new());
        let doc = Document::new("p1", "a.md", "A", "one");
        store.insert_document(&doc).unwrap();

        for (expected, content) in [(1, "two"), (2, "three")] {
            store
                .commit_revision(&Revision {
                    project_id: "p1".to_string(),
                    document_id: doc.id.clone(),
                    expected_version: expected,
                    title: "A".to_string(),
                    content: content.to_string(),
                    updated_at: Utc::now(),
                })
                .unwrap();
        }

        let versions = VersionStore::new(store);
        let history = versions.get_history("p1", &doc.id).unwrap();
        assert_eq!(
            history.iter().map(|h| h.version).collect::<Vec<_>>(),
            vec![2, 1]
        );
        assert_eq!(history[1].content, "one");

        assert!(versions.get_history("p2", &doc.id).unwrap().is_empty());
        assert_eq!(
            versions.get_version("p1", &doc.id, 2).unwrap().unwrap().content,
            "two"
        );
        assert!(versions.get_version("p1", &doc.id, 3).unwrap().is_none());
    }
}
