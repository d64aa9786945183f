//! Database schema definition

/// SQL schema for the corpus database
pub const SCHEMA: &str = r#"
-- Current state of every document
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    file_path TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    version INTEGER NOT NULL,
    doc_type TEXT NOT NULL,
    last_updated TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    UNIQUE(project_id, file_path)
);

CREATE INDEX IF NOT EXISTS idx_documents_project ON documents(project_id);

-- Prior versions, append-only, kept after the document is deleted
CREATE TABLE IF NOT EXISTS document_history (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    archived_at TEXT NOT NULL,
    UNIQUE(document_id, version)
);

CREATE INDEX IF NOT EXISTS idx_history_document ON document_history(document_id);

-- Chunk vectors, one row per distinct chunk of a document
CREATE TABLE IF NOT EXISTS document_embeddings (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL,
    content_chunk TEXT NOT NULL,
    chunk_hash TEXT NOT NULL,
    embedding BLOB NOT NULL,
    metadata TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(document_id, chunk_hash)
);

CREATE INDEX IF NOT EXISTS idx_embeddings_document ON document_embeddings(document_id);

-- Drift events between documentation and code
CREATE TABLE IF NOT EXISTS drift_events (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    document_id TEXT,
    severity TEXT NOT NULL,
    drift_type TEXT NOT NULL,
    file_path TEXT NOT NULL,
    doc_path TEXT,
    description TEXT NOT NULL,
    expected_pattern TEXT,
    actual_code TEXT,
    resolved INTEGER NOT NULL DEFAULT 0,
    resolved_at TEXT,
    resolved_by TEXT,
    resolution_note TEXT,
    detected_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_drift_events_project ON drift_events(project_id, resolved);

-- Point-in-time coverage reports
CREATE TABLE IF NOT EXISTS coverage_snapshots (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    coverage_percentage INTEGER NOT NULL,
    total_documents INTEGER NOT NULL,
    docs_with_embeddings INTEGER NOT NULL,
    total_chunks INTEGER NOT NULL,
    breakdown TEXT NOT NULL,
    triggered_by TEXT NOT NULL,
    snapshot_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_coverage_project ON coverage_snapshots(project_id, snapshot_at);
"#;
