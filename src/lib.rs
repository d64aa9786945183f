//! docvault - Versioned documentation corpus with incremental vector indexing
//!
//! This library keeps a project's documents, their version history and a
//! chunk-level vector index in sync, and reports on how healthy, covered and
//! code-aligned the corpus is.

pub mod access;
pub mod config;
pub mod coverage;
pub mod document;
pub mod drift;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod health;
pub mod history;
pub mod search;
pub mod storage;
pub mod sync;
pub mod telemetry;

/// Re-export commonly used types
pub use access::{ProjectScope, Role};
pub use config::EngineConfig;
pub use coverage::{CoverageCalculator, CoverageReport, CoverageSnapshot, SnapshotTrigger};
pub use document::{DocType, Document, DocumentHistory};
pub use drift::{DriftDetector, DriftEvent, DriftEvidence, DriftObservation, DriftSeverity};
pub use embedding::{EmbeddingGateway, EmbeddingProvider, MockEmbedding};
pub use engine::Docvault;
pub use error::{CoreError, CoreResult};
pub use extract::{Chunk, Chunker};
pub use health::{HealthService, ProjectHealth, StalenessLevel};
pub use history::VersionStore;
pub use search::{ReadOutcome, SearchEngine, SearchHit};
pub use storage::{Database, InMemoryStore};
pub use sync::{ContentProposal, ContentSource, SyncEngine, SyncReport};
pub use telemetry::init_tracing;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "docvault";
