//! Drift event lifecycle
//!
//! Turns observations into stored events, resolves them, and reports on a
//! project's drift state.

use super::{DriftEvent, DriftEvidence, DriftRules, DriftSeverity, DriftType};
use crate::access::ProjectScope;
use crate::error::{CoreError, CoreResult};
use crate::storage::{DocumentRepository, DriftRepository};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a caller observed, plus where it was observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftObservation {
    /// Code file the evidence came from
    pub file_path: String,
    /// Document the code is meant to follow, by id
    pub document_id: Option<String>,
    /// Document the code is meant to follow, by path
    pub doc_path: Option<String>,
    pub evidence: DriftEvidence,
}

impl DriftObservation {
    pub fn new(file_path: &str, evidence: DriftEvidence) -> Self {
        Self {
            file_path: file_path.to_string(),
            document_id: None,
            doc_path: None,
            evidence,
        }
    }

    pub fn for_document(mut self, doc_path: &str) -> Self {
        self.doc_path = Some(doc_path.to_string());
        self
    }
}

/// Counts over a project's drift events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftSummary {
    pub project_id: String,
    pub total: usize,
    pub unresolved: usize,
    pub resolved: usize,
    /// Unresolved events per severity
    pub by_severity: BTreeMap<DriftSeverity, usize>,
    /// Unresolved events per drift type
    pub by_type: BTreeMap<DriftType, usize>,
}

impl DriftSummary {
    /// Unresolved critical events
    pub fn critical(&self) -> usize {
        self.by_severity
            .get(&DriftSeverity::Critical)
            .copied()
            .unwrap_or(0)
    }
}

/// Main drift tracking engine
pub struct DriftDetector {
    events: Arc<dyn DriftRepository>,
    documents: Arc<dyn DocumentRepository>,
    rules: DriftRules,
}

impl DriftDetector {
    pub fn new(events: Arc<dyn DriftRepository>, documents: Arc<dyn DocumentRepository>) -> Self {
        Self {
            events,
            documents,
            rules: DriftRules::new(),
        }
    }

    /// Classify an observation and record it as a new event
    pub fn detect_drift(
        &self,
        scope: &ProjectScope,
        observation: DriftObservation,
    ) -> CoreResult<DriftEvent> {
        if observation.file_path.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "drift observation has no file path".to_string(),
            ));
        }

        let project_id = scope.project_id.as_str();
        let document = match (&observation.document_id, &observation.doc_path) {
            (Some(id), _) => Some(self.documents.find_document(project_id, id)?.ok_or_else(
                || CoreError::NotFound {
                    entity: "document",
                    id: id.clone(),
                },
            )?),
            (None, Some(path)) => self.documents.find_document_by_path(project_id, path)?,
            (None, None) => None,
        };

        let classification = self.rules.classify(&observation.evidence);
        let (expected, actual) = observation.evidence.pattern_pair();
        let doc_path = document
            .as_ref()
            .map(|d| d.file_path.as_str())
            .or(observation.doc_path.as_deref());

        let event = DriftEvent::new(
            project_id,
            &observation.file_path,
            classification.severity,
            observation.evidence.drift_type(),
            &classification.description,
        )
        .with_document(document.as_ref().map(|d| d.id.as_str()), doc_path)
        .with_pattern(expected, actual);

        self.events.insert_drift_event(&event)?;

        tracing::info!(
            project = project_id,
            file = %event.file_path,
            drift_type = %event.drift_type,
            severity = %event.severity,
            "drift detected"
        );

        Ok(event)
    }

    /// Mark an event resolved. Resolving twice returns the event as first
    /// resolved.
    pub fn resolve_drift(
        &self,
        scope: &ProjectScope,
        event_id: &str,
        resolved_by: &str,
        note: Option<&str>,
    ) -> CoreResult<DriftEvent> {
        scope.require_write("resolve drift")?;

        let not_found = || CoreError::NotFound {
            entity: "drift event",
            id: event_id.to_string(),
        };
        let event = self
            .events
            .find_drift_event(&scope.project_id, event_id)?
            .ok_or_else(not_found)?;

        if event.resolved {
            tracing::debug!(event = event_id, "drift event already resolved");
            return Ok(event);
        }

        if self
            .events
            .mark_resolved(&scope.project_id, event_id, resolved_by, note, Utc::now())?
        {
            tracing::info!(
                project = %scope.project_id,
                event = event_id,
                resolved_by,
                "drift resolved"
            );
        }

        self.events
            .find_drift_event(&scope.project_id, event_id)?
            .ok_or_else(not_found)
    }

    /// Totals plus unresolved counts per severity and type
    pub fn get_drift_summary(&self, project_id: &str) -> CoreResult<DriftSummary> {
        let events = self.events.list_drift_events(project_id, true)?;

        let mut summary = DriftSummary {
            project_id: project_id.to_string(),
            total: events.len(),
            unresolved: 0,
            resolved: 0,
            by_severity: BTreeMap::new(),
            by_type: BTreeMap::new(),
        };

        for event in &events {
            if event.resolved {
                summary.resolved += 1;
                continue;
            }
            summary.unresolved += 1;
            *summary.by_severity.entry(event.severity).or_insert(0) += 1;
            *summary.by_type.entry(event.drift_type).or_insert(0) += 1;
        }

        Ok(summary)
    }

    /// Events newest first
    pub fn get_drift_timeline(
        &self,
        project_id: &str,
        include_resolved: bool,
        limit: usize,
    ) -> CoreResult<Vec<DriftEvent>> {
        let mut events = self.events.list_drift_events(project_id, include_resolved)?;
        events.truncate(limit);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::document::Document;
    use crate::storage::InMemoryStore;

    fn detector() -> (Arc<InMemoryStore>, DriftDetector) {
        let store = Arc::new(InMemoryStore::new());
        let detector = DriftDetector::new(store.clone(), store.clone());
        (store, detector)
    }

    fn editor() -> ProjectScope {
        ProjectScope::new("p1", Role::Editor)
    }

    #[test]
    fn test_detect_links_document_by_path() {
        let (store, detector) = detector();
        let doc = Document::new("p1", "patterns/auth.md", "Auth", "Use JWT.");
        store.insert_document(&doc).unwrap();

        let event = detector
            .detect_drift(
                &editor(),
                DriftObservation::new(
                    "src/auth.rs",
                    DriftEvidence::CodeDiverged {
                        expected_pattern: "verify_jwt(token)".to_string(),
                        actual_code: "TODO: 42".to_string(),
                    },
                )
                .for_document("patterns/auth.md"),
            )
            .unwrap();

        assert_eq!(event.document_id.as_deref(), Some(doc.id.as_str()));
        assert_eq!(event.severity, DriftSeverity::Critical);
        assert_eq!(event.expected_pattern.as_deref(), Some("verify_jwt(token)"));
        assert_eq!(event.drift_type, DriftType::CodeDiverged);
    }

    #[test]
    fn test_unknown_document_id_is_rejected() {
        let (_, detector) = detector();
        let mut observation = DriftObservation::new(
            "src/lib.rs",
            DriftEvidence::StaleDoc {
                days_since_update: 10,
            },
        );
        observation.document_id = Some("nope".to_string());

        let err = detector.detect_drift(&editor(), observation).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let (_, detector) = detector();
        let event = detector
            .detect_drift(
                &editor(),
                DriftObservation::new(
                    "src/api.rs",
                    DriftEvidence::MissingDoc {
                        symbol: Some("list_users".to_string()),
                        is_public: true,
                    },
                ),
            )
            .unwrap();

        let first = detector
            .resolve_drift(&editor(), &event.id, "alice", Some("documented"))
            .unwrap();
        let second = detector
            .resolve_drift(&editor(), &event.id, "bob", None)
            .unwrap();

        assert!(first.resolved);
        assert_eq!(first, second);
        assert_eq!(second.resolved_by.as_deref(), Some("alice"));
        assert_eq!(second.resolution_note.as_deref(), Some("documented"));
    }

    #[test]
    fn test_resolve_requires_editor() {
        let (_, detector) = detector();
        let event = detector
            .detect_drift(
                &editor(),
                DriftObservation::new(
                    "src/api.rs",
                    DriftEvidence::StaleDoc {
                        days_since_update: 200,
                    },
                ),
            )
            .unwrap();

        let viewer = ProjectScope::new("p1", Role::Viewer);
        let err = detector
            .resolve_drift(&viewer, &event.id, "eve", None)
            .unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied { .. }));

        let other = ProjectScope::new("p2", Role::Admin);
        let err = detector
            .resolve_drift(&other, &event.id, "mallory", None)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn test_summary_and_timeline() {
        let (_, detector) = detector();
        let scope = editor();
        let observations = [
            DriftEvidence::StaleDoc {
                days_since_update: 200,
            },
            DriftEvidence::StaleDoc {
                days_since_update: 100,
            },
            DriftEvidence::MissingDoc {
                symbol: None,
                is_public: false,
            },
        ];

        let mut ids = Vec::new();
        for evidence in observations {
            let event = detector
                .detect_drift(&scope, DriftObservation::new("src/lib.rs", evidence))
                .unwrap();
            ids.push(event.id);
        }
        detector
            .resolve_drift(&scope, &ids[0], "alice", None)
            .unwrap();

        let summary = detector.get_drift_summary("p1").unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.unresolved, 2);
        assert_eq!(summary.resolved, 1);
        assert_eq!(summary.critical(), 0);
        assert_eq!(summary.by_severity.get(&DriftSeverity::Warning), Some(&2));
        assert_eq!(summary.by_type.get(&DriftType::StaleDoc), Some(&1));

        let open = detector.get_drift_timeline("p1", false, 10).unwrap();
        assert_eq!(open.len(), 2);
        assert!(open[0].detected_at >= open[1].detected_at);

        let all = detector.get_drift_timeline("p1", true, 2).unwrap();
        assert_eq!(all.len(), 2);
        assert!(detector.get_drift_timeline("p2", true, 10).unwrap().is_empty());
    }
}
