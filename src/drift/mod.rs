//! Drift tracking
//!
//! Records divergence between documented patterns and observed code:
//! - Evidence is classified into a drift type and severity by rules
//! - Events are resolved once, idempotently
//! - Summaries and a timeline report the project's drift state

mod detector;
mod rules;

pub use detector::{DriftDetector, DriftObservation, DriftSummary};
pub use rules::{pattern_similarity, Classification, DriftRule, DriftRules};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity level of a drift event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftSeverity {
    /// Worth knowing, no action needed yet
    Info,
    /// Documentation is likely misleading
    Warning,
    /// Documentation contradicts the code
    Critical,
}

impl DriftSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftSeverity::Info => "info",
            DriftSeverity::Warning => "warning",
            DriftSeverity::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "info" => Some(DriftSeverity::Info),
            "warning" => Some(DriftSeverity::Warning),
            "critical" => Some(DriftSeverity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for DriftSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriftSeverity::Info => write!(f, "INFO"),
            DriftSeverity::Warning => write!(f, "WARNING"),
            DriftSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Kind of divergence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftType {
    CodeDiverged,
    MissingDoc,
    StaleDoc,
    PatternViolation,
    /// A stored type this build does not know about
    Unknown,
}

impl DriftType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftType::CodeDiverged => "code_diverged",
            DriftType::MissingDoc => "missing_doc",
            DriftType::StaleDoc => "stale_doc",
            DriftType::PatternViolation => "pattern_violation",
            DriftType::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "code_diverged" => DriftType::CodeDiverged,
            "missing_doc" => DriftType::MissingDoc,
            "stale_doc" => DriftType::StaleDoc,
            "pattern_violation" => DriftType::PatternViolation,
            _ => DriftType::Unknown,
        }
    }
}

impl std::fmt::Display for DriftType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller-supplied evidence, one typed payload per drift type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "drift_type", rename_all = "snake_case")]
pub enum DriftEvidence {
    /// Code no longer matches the documented pattern
    CodeDiverged {
        expected_pattern: String,
        actual_code: String,
    },
    /// Code exists with no documentation
    MissingDoc {
        symbol: Option<String>,
        is_public: bool,
    },
    /// Documentation has not been touched for a long time
    StaleDoc { days_since_update: i64 },
    /// Code breaks a documented rule
    PatternViolation {
        expected_pattern: String,
        actual_code: String,
    },
}

impl DriftEvidence {
    pub fn drift_type(&self) -> DriftType {
        match self {
            DriftEvidence::CodeDiverged { .. } => DriftType::CodeDiverged,
            DriftEvidence::MissingDoc { .. } => DriftType::MissingDoc,
            DriftEvidence::StaleDoc { .. } => DriftType::StaleDoc,
            DriftEvidence::PatternViolation { .. } => DriftType::PatternViolation,
        }
    }

    /// The `(expected_pattern, actual_code)` pair, when the evidence has one
    pub fn pattern_pair(&self) -> (Option<&str>, Option<&str>) {
        match self {
            DriftEvidence::CodeDiverged {
                expected_pattern,
                actual_code,
            }
            | DriftEvidence::PatternViolation {
                expected_pattern,
                actual_code,
            } => (Some(expected_pattern), Some(actual_code)),
            _ => (None, None),
        }
    }
}

/// A detected drift event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftEvent {
    /// Unique identifier
    pub id: String,
    pub project_id: String,
    /// Related document, when known
    pub document_id: Option<String>,
    /// Severity level
    pub severity: DriftSeverity,
    pub drift_type: DriftType,
    /// Code file the evidence came from
    pub file_path: String,
    /// Documentation the code diverged from
    pub doc_path: Option<String>,
    /// Human-readable description
    pub description: String,
    pub expected_pattern: Option<String>,
    pub actual_code: Option<String>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_note: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl DriftEvent {
    /// Create a new unresolved drift event
    pub fn new(
        project_id: &str,
        file_path: &str,
        severity: DriftSeverity,
        drift_type: DriftType,
        description: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            document_id: None,
            severity,
            drift_type,
            file_path: file_path.to_string(),
            doc_path: None,
            description: description.to_string(),
            expected_pattern: None,
            actual_code: None,
            resolved: false,
            resolved_at: None,
            resolved_by: None,
            resolution_note: None,
            detected_at: Utc::now(),
        }
    }

    /// Link the event to a document
    pub fn with_document(mut self, document_id: Option<&str>, doc_path: Option<&str>) -> Self {
        self.document_id = document_id.map(str::to_string);
        self.doc_path = doc_path.map(str::to_string);
        self
    }

    /// Attach the expected pattern and the observed code
    pub fn with_pattern(mut self, expected: Option<&str>, actual: Option<&str>) -> Self {
        self.expected_pattern = expected.map(str::to_string);
        self.actual_code = actual.map(str::to_string);
        self
    }
}
