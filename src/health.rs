//! Document staleness and project health
//!
//! A document's age is the number of whole days since its last update.
//! Frequently read documents age faster: their age is scaled by up to
//! `1 + usage_weight` once `usage_cap` accesses are reached.

use crate::config::StalenessConfig;
use crate::document::{DocType, Document};
use crate::error::CoreResult;
use crate::storage::DocumentRepository;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How out of date a document is, in increasing severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalenessLevel {
    Fresh,
    Aging,
    Stale,
    Critical,
}

impl StalenessLevel {
    /// Contribution of one document to the health score
    pub fn weight(&self) -> u64 {
        match self {
            StalenessLevel::Fresh => 100,
            StalenessLevel::Aging => 70,
            StalenessLevel::Stale => 30,
            StalenessLevel::Critical => 0,
        }
    }
}

impl std::fmt::Display for StalenessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StalenessLevel::Fresh => write!(f, "fresh"),
            StalenessLevel::Aging => write!(f, "aging"),
            StalenessLevel::Stale => write!(f, "stale"),
            StalenessLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Staleness of one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStaleness {
    pub document_id: String,
    pub title: String,
    pub file_path: String,
    pub doc_type: DocType,
    pub level: StalenessLevel,
    /// Whole days since the last update
    pub age_days: i64,
    /// Age after usage weighting
    pub effective_age_days: f64,
    pub access_count: u64,
    pub last_updated: DateTime<Utc>,
}

/// Staleness counts and score for a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectHealth {
    pub project_id: String,
    pub total_documents: usize,
    pub fresh: usize,
    pub aging: usize,
    pub stale: usize,
    pub critical: usize,
    /// 0..=100, 100 for an empty project
    pub score: u32,
}

/// `round((fresh*100 + aging*70 + stale*30) / total)`, 100 when empty
pub fn health_score(fresh: usize, aging: usize, stale: usize, critical: usize) -> u32 {
    let total = fresh + aging + stale + critical;
    if total == 0 {
        return 100;
    }
    let weighted = fresh as u64 * StalenessLevel::Fresh.weight()
        + aging as u64 * StalenessLevel::Aging.weight()
        + stale as u64 * StalenessLevel::Stale.weight();
    (weighted as f64 / total as f64).round() as u32
}

/// Classifies documents by age
#[derive(Debug, Clone, Default)]
pub struct StalenessScorer {
    config: StalenessConfig,
}

impl StalenessScorer {
    pub fn new(config: StalenessConfig) -> Self {
        Self { config }
    }

    /// Age in days scaled by usage
    pub fn effective_age(&self, age_days: i64, access_count: u64) -> f64 {
        let days = age_days.max(0) as f64;
        if self.config.usage_cap == 0 {
            return days;
        }
        let usage = access_count.min(self.config.usage_cap) as f64 / self.config.usage_cap as f64;
        days * (1.0 + usage * self.config.usage_weight)
    }

    pub fn level_for(&self, effective_age: f64) -> StalenessLevel {
        if effective_age <= self.config.fresh_days as f64 {
            StalenessLevel::Fresh
        } else if effective_age <= self.config.aging_days as f64 {
            StalenessLevel::Aging
        } else if effective_age <= self.config.stale_days as f64 {
            StalenessLevel::Stale
        } else {
            StalenessLevel::Critical
        }
    }

    /// Assess one document as of `now`
    pub fn assess(&self, doc: &Document, now: DateTime<Utc>) -> DocumentStaleness {
        let age_days = (now - doc.last_updated).num_days().max(0);
        let effective_age_days = self.effective_age(age_days, doc.access_count);

        DocumentStaleness {
            document_id: doc.id.clone(),
            title: doc.title.clone(),
            file_path: doc.file_path.clone(),
            doc_type: doc.doc_type,
            level: self.level_for(effective_age_days),
            age_days,
            effective_age_days,
            access_count: doc.access_count,
            last_updated: doc.last_updated,
        }
    }
}

/// Project-level health queries
pub struct HealthService {
    documents: Arc<dyn DocumentRepository>,
    scorer: StalenessScorer,
}

impl HealthService {
    pub fn new(documents: Arc<dyn DocumentRepository>, scorer: StalenessScorer) -> Self {
        Self { documents, scorer }
    }

    pub fn get_project_health(&self, project_id: &str) -> CoreResult<ProjectHealth> {
        self.get_project_health_at(project_id, Utc::now())
    }

    /// Health as of `now`
    pub fn get_project_health_at(
        &self,
        project_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<ProjectHealth> {
        let documents = self.documents.list_documents(project_id)?;
        let mut counts = [0usize; 4];

        for doc in &documents {
            let level = self.scorer.assess(doc, now).level;
            counts[level as usize] += 1;
        }
        let [fresh, aging, stale, critical] = counts;

        Ok(ProjectHealth {
            project_id: project_id.to_string(),
            total_documents: documents.len(),
            fresh,
            aging,
            stale,
            critical,
            score: health_score(fresh, aging, stale, critical),
        })
    }

    pub fn get_documents_needing_attention(
        &self,
        project_id: &str,
        limit: usize,
    ) -> CoreResult<Vec<DocumentStaleness>> {
        self.get_documents_needing_attention_at(project_id, limit, Utc::now())
    }

    /// Aging or worse documents as of `now`: worst level first, then oldest
    /// by calendar age. Usage weighting only decides the level.
    pub fn get_documents_needing_attention_at(
        &self,
        project_id: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<DocumentStaleness>> {
        let mut flagged: Vec<DocumentStaleness> = self
            .documents
            .list_documents(project_id)?
            .iter()
            .map(|doc| self.scorer.assess(doc, now))
            .filter(|s| s.level >= StalenessLevel::Aging)
            .collect();

        flagged.sort_by(|a, b| {
            b.level
                .cmp(&a.level)
                .then_with(|| b.age_days.cmp(&a.age_days))
                .then_with(|| b.effective_age_days.total_cmp(&a.effective_age_days))
                .then_with(|| a.file_path.cmp(&b.file_path))
        });
        flagged.truncate(limit);

        Ok(flagged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use chrono::Duration;

    fn doc_aged(path: &str, days: i64, access_count: u64, now: DateTime<Utc>) -> Document {
        let mut doc = Document::new("p1", path, path, "content");
        doc.last_updated = now - Duration::days(days);
        doc.access_count = access_count;
        doc
    }

    #[test]
    fn test_levels_at_boundaries() {
        let scorer = StalenessScorer::default();
        assert_eq!(scorer.level_for(0.0), StalenessLevel::Fresh);
        assert_eq!(scorer.level_for(30.0), StalenessLevel::Fresh);
        assert_eq!(scorer.level_for(31.0), StalenessLevel::Aging);
        assert_eq!(scorer.level_for(90.0), StalenessLevel::Aging);
        assert_eq!(scorer.level_for(180.0), StalenessLevel::Stale);
        assert_eq!(scorer.level_for(181.0), StalenessLevel::Critical);
    }

    #[test]
    fn test_usage_weighting() {
        let scorer = StalenessScorer::default();
        assert_eq!(scorer.effective_age(20, 0), 20.0);
        assert_eq!(scorer.effective_age(20, 25), 25.0);
        // Saturates at the cap
        assert_eq!(scorer.effective_age(20, 50), 30.0);
        assert_eq!(scorer.effective_age(20, 5000), 30.0);

        let now = Utc::now();
        let busy = scorer.assess(&doc_aged("a.md", 28, 50, now), now);
        assert_eq!(busy.age_days, 28);
        assert_eq!(busy.level, StalenessLevel::Aging);
    }

    #[test]
    fn test_health_score() {
        assert_eq!(health_score(0, 0, 0, 0), 100);
        assert_eq!(health_score(1, 1, 1, 1), 50);
        assert_eq!(health_score(2, 1, 0, 0), 90);
        assert_eq!(health_score(0, 0, 0, 3), 0);
    }

    #[test]
    fn test_attention_orders_by_calendar_age_within_level() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        // Heavy use pushes the younger document's effective age past the
        // older one's, but both stay stale
        store
            .insert_document(&doc_aged("quiet.md", 100, 0, now))
            .unwrap();
        store
            .insert_document(&doc_aged("busy.md", 95, 50, now))
            .unwrap();

        let service = HealthService::new(store, StalenessScorer::default());
        let attention = service
            .get_documents_needing_attention_at("p1", 10, now)
            .unwrap();

        assert!(attention.iter().all(|s| s.level == StalenessLevel::Stale));
        assert!(attention[1].effective_age_days > attention[0].effective_age_days);
        let paths: Vec<&str> = attention.iter().map(|s| s.file_path.as_str()).collect();
        assert_eq!(paths, vec!["quiet.md", "busy.md"]);
    }

    #[test]
    fn test_project_health_and_attention() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        for doc in [
            doc_aged("fresh.md", 1, 0, now),
            doc_aged("aging.md", 60, 0, now),
            doc_aged("stale.md", 120, 0, now),
            doc_aged("critical.md", 400, 0, now),
            doc_aged("older-aging.md", 80, 0, now),
        ] {
            store.insert_document(&doc).unwrap();
        }
        let other = Document::new("p2", "x.md", "x", "x");
        store.insert_document(&other).unwrap();

        let service = HealthService::new(store, StalenessScorer::default());
        let health = service.get_project_health_at("p1", now).unwrap();
        assert_eq!(health.total_documents, 5);
        assert_eq!(
            (health.fresh, health.aging, health.stale, health.critical),
            (1, 2, 1, 1)
        );
        assert_eq!(health.score, 54);

        let attention = service
            .get_documents_needing_attention_at("p1", 10, now)
            .unwrap();
        let paths: Vec<&str> = attention.iter().map(|s| s.file_path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["critical.md", "stale.md", "older-aging.md", "aging.md"]
        );

        let top = service
            .get_documents_needing_attention_at("p1", 1, now)
            .unwrap();
        assert_eq!(top.len(), 1);

        let empty = service.get_project_health_at("p3", now).unwrap();
        assert_eq!(empty.score, 100);
    }
}
