//! Corpus records: documents, their history and their embeddings

use crate::extract::{ChunkMetadata, Language};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a document
///
/// Known categories carry meaning for ranking and coverage. Anything else
/// lands in `Uncategorized`, which coverage reports as its own bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Pattern,
    Architecture,
    Api,
    Guide,
    Decision,
    Runbook,
    Reference,
    Uncategorized,
}

impl DocType {
    pub const ALL: [DocType; 8] = [
        DocType::Pattern,
        DocType::Architecture,
        DocType::Api,
        DocType::Guide,
        DocType::Decision,
        DocType::Runbook,
        DocType::Reference,
        DocType::Uncategorized,
    ];

    /// Storage label
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Pattern => "pattern",
            DocType::Architecture => "architecture",
            DocType::Api => "api",
            DocType::Guide => "guide",
            DocType::Decision => "decision",
            DocType::Runbook => "runbook",
            DocType::Reference => "reference",
            DocType::Uncategorized => "uncategorized",
        }
    }

    /// Parse a stored or caller-supplied label; unknown labels are uncategorized
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "pattern" | "patterns" => DocType::Pattern,
            "architecture" => DocType::Architecture,
            "api" => DocType::Api,
            "guide" | "guides" | "tutorial" => DocType::Guide,
            "decision" | "adr" => DocType::Decision,
            "runbook" | "runbooks" => DocType::Runbook,
            "reference" => DocType::Reference,
            _ => DocType::Uncategorized,
        }
    }

    /// Infer the category from the directories of a document path
    pub fn infer_from_path(path: &str) -> Self {
        let lower = path.to_lowercase();
        let dirs: Vec<&str> = lower.split('/').collect();
        let dirs = &dirs[..dirs.len().saturating_sub(1)];

        for dir in dirs.iter().rev() {
            let doc_type = match *dir {
                "patterns" | "pattern" | "conventions" => DocType::Pattern,
                "architecture" | "design" => DocType::Architecture,
                "api" | "apis" | "endpoints" => DocType::Api,
                "guides" | "guide" | "tutorials" | "howto" => DocType::Guide,
                "decisions" | "adr" | "adrs" => DocType::Decision,
                "runbooks" | "runbook" | "ops" | "operations" => DocType::Runbook,
                "reference" | "references" => DocType::Reference,
                _ => continue,
            };
            return doc_type;
        }

        DocType::Uncategorized
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A versioned document owned by one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub project_id: String,
    /// Unique within the project
    pub file_path: String,
    pub title: String,
    pub content: String,
    /// Starts at 1, +1 per content change
    pub version: i64,
    pub doc_type: DocType,
    pub last_updated: DateTime<Utc>,
    /// Reads and search hits, used to weight staleness
    pub access_count: u64,
}

impl Document {
    /// A brand new document at version 1
    pub fn new(project_id: &str, file_path: &str, title: &str, content: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            file_path: file_path.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            version: 1,
            doc_type: DocType::infer_from_path(file_path),
            last_updated: Utc::now(),
            access_count: 0,
        }
    }

    /// Whether the path looks like source code rather than prose
    pub fn is_code(&self) -> bool {
        Language::from_path(&self.file_path).is_some()
    }

    /// Whether applying `(title, content)` would be a content change
    pub fn differs_from(&self, title: &str, content: &str) -> bool {
        self.title != title || self.content != content
    }
}

/// Immutable snapshot of a document as it was before a change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentHistory {
    pub id: String,
    pub document_id: String,
    /// The version this snapshot held
    pub version: i64,
    pub title: String,
    pub content: String,
    pub archived_at: DateTime<Utc>,
}

impl DocumentHistory {
    /// Snapshot the current state of `doc`
    pub fn snapshot(doc: &Document) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: doc.id.clone(),
            version: doc.version,
            title: doc.title.clone(),
            content: doc.content.clone(),
            archived_at: Utc::now(),
        }
    }
}

/// A stored chunk vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub document_id: String,
    pub content_chunk: String,
    /// Unique per document
    pub chunk_hash: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}
