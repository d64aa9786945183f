//! One handle wiring every engine to a shared store

use crate::config::EngineConfig;
use crate::coverage::CoverageCalculator;
use crate::drift::DriftDetector;
use crate::embedding::{create_provider, EmbeddingGateway, EmbeddingProvider};
use crate::extract::Chunker;
use crate::health::{HealthService, StalenessScorer};
use crate::history::VersionStore;
use crate::search::SearchEngine;
use crate::storage::{Database, Store};
use crate::sync::SyncEngine;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// All engines over one store and one embedding gateway
pub struct Docvault {
    pub sync: SyncEngine,
    pub search: SearchEngine,
    pub versions: VersionStore,
    pub health: HealthService,
    pub drift: DriftDetector,
    pub coverage: CoverageCalculator,
}

impl Docvault {
    /// Wire the engines to `store` with an explicit provider
    pub fn new<S: Store + 'static>(
        store: Arc<S>,
        provider: Arc<dyn EmbeddingProvider>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let gateway = EmbeddingGateway::new(provider, &config.embedding);

        Ok(Self {
            sync: SyncEngine::new(
                store.clone(),
                store.clone(),
                gateway.clone(),
                Chunker::new(config.chunking.clone()),
            ),
            search: SearchEngine::new(store.clone(), store.clone(), gateway, config.search),
            versions: VersionStore::new(store.clone()),
            health: HealthService::new(store.clone(), StalenessScorer::new(config.staleness)),
            drift: DriftDetector::new(store.clone(), store.clone()),
            coverage: CoverageCalculator::new(store.clone(), store.clone(), store),
        })
    }

    /// Wire the engines to `store` with the configured provider
    pub fn with_store<S: Store + 'static>(store: Arc<S>, config: EngineConfig) -> Result<Self> {
        let provider = create_provider(&config.embedding)?;
        Self::new(store, provider, config)
    }

    /// Open (or create) a SQLite corpus at `path`
    pub fn open_sqlite<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Self> {
        let db = Arc::new(Database::open(path)?);
        tracing::info!(provider = %config.embedding.provider, "corpus opened");
        Self::with_store(db, config)
    }
}
