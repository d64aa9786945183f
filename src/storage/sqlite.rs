//! SQLite repositories

use super::{
    ChunkMatch, CommitOutcome, CoverageRepository, DocumentRepository, DriftRepository,
    EmbeddingRepository, ReconcileBatch, Revision, SCHEMA,
};
use crate::coverage::{CategoryCoverage, CoverageSnapshot, SnapshotTrigger};
use crate::document::{DocType, Document, DocumentHistory};
use crate::drift::{DriftEvent, DriftSeverity, DriftType};
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const DOCUMENT_COLUMNS: &str =
    "id, project_id, file_path, title, content, version, doc_type, last_updated, access_count";

const DRIFT_COLUMNS: &str = "id, project_id, document_id, severity, drift_type, file_path, doc_path, \
     description, expected_pattern, actual_code, resolved, resolved_at, resolved_by, \
     resolution_note, detected_at";

const SNAPSHOT_COLUMNS: &str = "id, project_id, coverage_percentage, total_documents, \
     docs_with_embeddings, total_chunks, breakdown, triggered_by, snapshot_at";

/// Database connection wrapper
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", path.as_ref()))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn initialize(&self) -> Result<()> {
        self.lock()?
            .execute_batch(SCHEMA)
            .context("Failed to initialize database schema")?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in database: {}", value))
}

fn query_document(
    conn: &Connection,
    condition: &str,
    args: impl rusqlite::Params,
) -> Result<Option<Document>> {
    let sql = format!("SELECT {} FROM documents WHERE {}", DOCUMENT_COLUMNS, condition);
    let row = conn
        .query_row(&sql, args, DocumentRow::from_row)
        .optional()
        .context("Failed to get document")?;

    row.map(DocumentRow::into_document).transpose()
}

// ==================== Documents ====================

impl DocumentRepository for Database {
    fn find_document(&self, project_id: &str, document_id: &str) -> Result<Option<Document>> {
        let conn = self.lock()?;
        query_document(
            &conn,
            "id = ?1 AND project_id = ?2",
            params![document_id, project_id],
        )
    }

    fn find_document_by_path(
        &self,
        project_id: &str,
        file_path: &str,
    ) -> Result<Option<Document>> {
        let conn = self.lock()?;
        query_document(
            &conn,
            "file_path = ?1 AND project_id = ?2",
            params![file_path, project_id],
        )
    }

    fn list_documents(&self, project_id: &str) -> Result<Vec<Document>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM documents WHERE project_id = ?1 ORDER BY file_path",
            DOCUMENT_COLUMNS
        ))?;

        let rows = stmt.query_map(params![project_id], DocumentRow::from_row)?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?.into_document()?);
        }

        Ok(documents)
    }

    fn insert_document(&self, doc: &Document) -> Result<CommitOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin insert")?;

        if let Some(existing) = query_document(
            &tx,
            "file_path = ?1 AND project_id = ?2",
            params![doc.file_path, doc.project_id],
        )? {
            return Ok(CommitOutcome::Conflict {
                current_version: Some(existing.version),
            });
        }

        tx.execute(
            &format!(
                "INSERT INTO documents ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                DOCUMENT_COLUMNS
            ),
            params![
                doc.id,
                doc.project_id,
                doc.file_path,
                doc.title,
                doc.content,
                doc.version,
                doc.doc_type.as_str(),
                format_timestamp(&doc.last_updated),
                doc.access_count as i64,
            ],
        )
        .context("Failed to insert document")?;
        tx.commit().context("Failed to commit document insert")?;

        Ok(CommitOutcome::Committed(doc.clone()))
    }

    fn commit_revision(&self, revision: &Revision) -> Result<CommitOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin revision")?;

        let current = query_document(
            &tx,
            "id = ?1 AND project_id = ?2",
            params![revision.document_id, revision.project_id],
        )?;
        let current = match current {
            Some(doc) if doc.version == revision.expected_version => doc,
            other => {
                return Ok(CommitOutcome::Conflict {
                    current_version: other.map(|d| d.version),
                })
            }
        };

        let mut history = DocumentHistory::snapshot(&current);
        history.archived_at = revision.updated_at;
        tx.execute(
            r#"
            INSERT INTO document_history (id, document_id, version, title, content, archived_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                history.id,
                history.document_id,
                history.version,
                history.title,
                history.content,
                format_timestamp(&history.archived_at),
            ],
        )
        .context("Failed to archive document version")?;

        let next_version = current.version + 1;
        let updated = tx
            .execute(
                r#"
                UPDATE documents
                SET title = ?1, content = ?2, version = ?3, last_updated = ?4
                WHERE id = ?5 AND version = ?6
                "#,
                params![
                    revision.title,
                    revision.content,
                    next_version,
                    format_timestamp(&revision.updated_at),
                    current.id,
                    current.version,
                ],
            )
            .context("Failed to update document")?;
        if updated != 1 {
            return Ok(CommitOutcome::Conflict {
                current_version: Some(current.version),
            });
        }

        tx.commit().context("Failed to commit revision")?;

        Ok(CommitOutcome::Committed(Document {
            title: revision.title.clone(),
            content: revision.content.clone(),
            version: next_version,
            last_updated: revision.updated_at,
            ..current
        }))
    }

    fn delete_document(&self, project_id: &str, document_id: &str) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin delete")?;

        let removed = tx
            .execute(
                "DELETE FROM documents WHERE id = ?1 AND project_id = ?2",
                params![document_id, project_id],
            )
            .context("Failed to delete document")?;
        if removed == 0 {
            return Ok(false);
        }

        tx.execute(
            "DELETE FROM document_embeddings WHERE document_id = ?1",
            params![document_id],
        )
        .context("Failed to delete document embeddings")?;
        tx.commit().context("Failed to commit delete")?;

        Ok(true)
    }

    fn record_access(&self, project_id: &str, document_id: &str) -> Result<()> {
        self.lock()?
            .execute(
                "UPDATE documents SET access_count = access_count + 1 WHERE id = ?1 AND project_id = ?2",
                params![document_id, project_id],
            )
            .context("Failed to record document access")?;
        Ok(())
    }

    fn list_history(&self, document_id: &str) -> Result<Vec<DocumentHistory>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, document_id, version, title, content, archived_at
            FROM document_history WHERE document_id = ?1
            ORDER BY version DESC
            "#,
        )?;

        let rows = stmt.query_map(params![document_id], HistoryRow::from_row)?;

        let mut history = Vec::new();
        for row in rows {
            history.push(row?.into_history()?);
        }

        Ok(history)
    }

    fn find_history(&self, document_id: &str, version: i64) -> Result<Option<DocumentHistory>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                r#"
                SELECT id, document_id, version, title, content, archived_at
                FROM document_history WHERE document_id = ?1 AND version = ?2
                "#,
                params![document_id, version],
                HistoryRow::from_row,
            )
            .optional()
            .context("Failed to get document version")?;

        row.map(HistoryRow::into_history).transpose()
    }
}

// ==================== Embeddings ====================

impl EmbeddingRepository for Database {
    fn chunk_hashes(&self, document_id: &str) -> Result<HashSet<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT chunk_hash FROM document_embeddings WHERE document_id = ?1")?;

        let hashes = stmt
            .query_map(params![document_id], |row| row.get(0))?
            .collect::<rusqlite::Result<HashSet<String>>>()
            .context("Failed to read chunk hashes")?;

        Ok(hashes)
    }

    fn reconcile(&self, document_id: &str, batch: &ReconcileBatch) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin reconcile")?;

        let current: Option<i64> = tx
            .query_row(
                "SELECT version FROM documents WHERE id = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read document version")?;
        if current != Some(batch.document_version) {
            return Ok(false);
        }

        let now = format_timestamp(&Utc::now());

        for hash in &batch.deletes {
            tx.execute(
                "DELETE FROM document_embeddings WHERE document_id = ?1 AND chunk_hash = ?2",
                params![document_id, hash],
            )
            .context("Failed to delete embedding")?;
        }

        for record in &batch.inserts {
            let metadata = serde_json::to_string(&record.metadata)?;
            tx.execute(
                r#"
                INSERT INTO document_embeddings (
                    id, document_id, content_chunk, chunk_hash, embedding, metadata, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(document_id, chunk_hash) DO UPDATE SET
                    content_chunk = excluded.content_chunk,
                    embedding = excluded.embedding,
                    metadata = excluded.metadata
                "#,
                params![
                    record.id,
                    document_id,
                    record.content_chunk,
                    record.chunk_hash,
                    vec_to_blob(&record.embedding),
                    metadata,
                    now,
                ],
            )
            .context("Failed to insert embedding")?;
        }

        tx.commit().context("Failed to commit reconcile")?;
        Ok(true)
    }

    fn nearest_chunks(
        &self,
        project_id: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkMatch>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT e.document_id, e.chunk_hash, e.content_chunk, e.embedding
            FROM document_embeddings e
            JOIN documents d ON d.id = e.document_id
            WHERE d.project_id = ?1
            "#,
        )?;

        let rows = stmt.query_map(params![project_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut matches = Vec::new();
        for row in rows {
            let (document_id, chunk_hash, content_chunk, blob) = row?;
            matches.push(ChunkMatch {
                similarity: cosine_similarity(query, &blob_to_vec(&blob)),
                document_id,
                chunk_hash,
                content_chunk,
            });
        }

        sort_matches(&mut matches);
        matches.truncate(limit);
        Ok(matches)
    }

    fn chunk_counts(&self, project_id: &str) -> Result<HashMap<String, usize>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT e.document_id, COUNT(*)
            FROM document_embeddings e
            JOIN documents d ON d.id = e.document_id
            WHERE d.project_id = ?1
            GROUP BY e.document_id
            "#,
        )?;

        let rows = stmt.query_map(params![project_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (document_id, count) = row?;
            counts.insert(document_id, count as usize);
        }

        Ok(counts)
    }
}

/// Order by similarity desc, then document and chunk for stable output
pub(super) fn sort_matches(matches: &mut [ChunkMatch]) {
    matches.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.document_id.cmp(&b.document_id))
            .then_with(|| a.chunk_hash.cmp(&b.chunk_hash))
    });
}

// ==================== Drift Events ====================

impl DriftRepository for Database {
    fn insert_drift_event(&self, event: &DriftEvent) -> Result<()> {
        self.lock()?
            .execute(
                &format!(
                    "INSERT INTO drift_events ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    DRIFT_COLUMNS
                ),
                params![
                    event.id,
                    event.project_id,
                    event.document_id,
                    event.severity.as_str(),
                    event.drift_type.as_str(),
                    event.file_path,
                    event.doc_path,
                    event.description,
                    event.expected_pattern,
                    event.actual_code,
                    event.resolved,
                    event.resolved_at.as_ref().map(format_timestamp),
                    event.resolved_by,
                    event.resolution_note,
                    format_timestamp(&event.detected_at),
                ],
            )
            .context("Failed to insert drift event")?;
        Ok(())
    }

    fn find_drift_event(&self, project_id: &str, id: &str) -> Result<Option<DriftEvent>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM drift_events WHERE id = ?1 AND project_id = ?2",
                    DRIFT_COLUMNS
                ),
                params![id, project_id],
                DriftEventRow::from_row,
            )
            .optional()
            .context("Failed to get drift event")?;

        row.map(DriftEventRow::into_event).transpose()
    }

    fn mark_resolved(
        &self,
        project_id: &str,
        id: &str,
        resolved_by: &str,
        note: Option<&str>,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self
            .lock()?
            .execute(
                r#"
                UPDATE drift_events
                SET resolved = 1, resolved_at = ?1, resolved_by = ?2, resolution_note = ?3
                WHERE id = ?4 AND project_id = ?5 AND resolved = 0
                "#,
                params![
                    format_timestamp(&resolved_at),
                    resolved_by,
                    note,
                    id,
                    project_id
                ],
            )
            .context("Failed to resolve drift event")?;

        Ok(changed > 0)
    }

    fn list_drift_events(
        &self,
        project_id: &str,
        include_resolved: bool,
    ) -> Result<Vec<DriftEvent>> {
        let conn = self.lock()?;
        let filter = if include_resolved {
            ""
        } else {
            " AND resolved = 0"
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM drift_events WHERE project_id = ?1{} ORDER BY detected_at DESC, id DESC",
            DRIFT_COLUMNS, filter
        ))?;

        let rows = stmt.query_map(params![project_id], DriftEventRow::from_row)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event()?);
        }

        Ok(events)
    }
}

// ==================== Coverage ====================

impl CoverageRepository for Database {
    fn insert_snapshot(&self, snapshot: &CoverageSnapshot) -> Result<()> {
        let breakdown = serde_json::to_string(&snapshot.breakdown)?;
        self.lock()?
            .execute(
                &format!(
                    "INSERT INTO coverage_snapshots ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    SNAPSHOT_COLUMNS
                ),
                params![
                    snapshot.id,
                    snapshot.project_id,
                    snapshot.coverage_percentage,
                    snapshot.total_documents as i64,
                    snapshot.docs_with_embeddings as i64,
                    snapshot.total_chunks as i64,
                    breakdown,
                    snapshot.trigger.as_str(),
                    format_timestamp(&snapshot.snapshot_at),
                ],
            )
            .context("Failed to insert coverage snapshot")?;
        Ok(())
    }

    fn list_snapshots(&self, project_id: &str, limit: usize) -> Result<Vec<CoverageSnapshot>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM coverage_snapshots WHERE project_id = ?1 ORDER BY snapshot_at DESC, id DESC LIMIT ?2",
            SNAPSHOT_COLUMNS
        ))?;

        let rows = stmt.query_map(params![project_id, limit as i64], |row| {
            Ok(SnapshotRow {
                id: row.get(0)?,
                project_id: row.get(1)?,
                coverage_percentage: row.get(2)?,
                total_documents: row.get(3)?,
                docs_with_embeddings: row.get(4)?,
                total_chunks: row.get(5)?,
                breakdown: row.get(6)?,
                trigger: row.get(7)?,
                snapshot_at: row.get(8)?,
            })
        })?;

        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row?.into_snapshot()?);
        }

        Ok(snapshots)
    }
}

// Internal row types for database mapping

struct DocumentRow {
    id: String,
    project_id: String,
    file_path: String,
    title: String,
    content: String,
    version: i64,
    doc_type: String,
    last_updated: String,
    access_count: i64,
}

impl DocumentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            file_path: row.get(2)?,
            title: row.get(3)?,
            content: row.get(4)?,
            version: row.get(5)?,
            doc_type: row.get(6)?,
            last_updated: row.get(7)?,
            access_count: row.get(8)?,
        })
    }

    fn into_document(self) -> Result<Document> {
        Ok(Document {
            id: self.id,
            project_id: self.project_id,
            file_path: self.file_path,
            title: self.title,
            content: self.content,
            version: self.version,
            doc_type: DocType::parse(&self.doc_type),
            last_updated: parse_timestamp(&self.last_updated)?,
            access_count: self.access_count.max(0) as u64,
        })
    }
}

struct HistoryRow {
    id: String,
    document_id: String,
    version: i64,
    title: String,
    content: String,
    archived_at: String,
}

impl HistoryRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            document_id: row.get(1)?,
            version: row.get(2)?,
            title: row.get(3)?,
            content: row.get(4)?,
            archived_at: row.get(5)?,
        })
    }

    fn into_history(self) -> Result<DocumentHistory> {
        Ok(DocumentHistory {
            id: self.id,
            document_id: self.document_id,
            version: self.version,
            title: self.title,
            content: self.content,
            archived_at: parse_timestamp(&self.archived_at)?,
        })
    }
}

struct DriftEventRow {
    id: String,
    project_id: String,
    document_id: Option<String>,
    severity: String,
    drift_type: String,
    file_path: String,
    doc_path: Option<String>,
    description: String,
    expected_pattern: Option<String>,
    actual_code: Option<String>,
    resolved: bool,
    resolved_at: Option<String>,
    resolved_by: Option<String>,
    resolution_note: Option<String>,
    detected_at: String,
}

impl DriftEventRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            document_id: row.get(2)?,
            severity: row.get(3)?,
            drift_type: row.get(4)?,
            file_path: row.get(5)?,
            doc_path: row.get(6)?,
            description: row.get(7)?,
            expected_pattern: row.get(8)?,
            actual_code: row.get(9)?,
            resolved: row.get(10)?,
            resolved_at: row.get(11)?,
            resolved_by: row.get(12)?,
            resolution_note: row.get(13)?,
            detected_at: row.get(14)?,
        })
    }

    fn into_event(self) -> Result<DriftEvent> {
        let severity = DriftSeverity::parse(&self.severity).unwrap_or(DriftSeverity::Warning);

        Ok(DriftEvent {
            id: self.id,
            project_id: self.project_id,
            document_id: self.document_id,
            severity,
            drift_type: DriftType::parse(&self.drift_type),
            file_path: self.file_path,
            doc_path: self.doc_path,
            description: self.description,
            expected_pattern: self.expected_pattern,
            actual_code: self.actual_code,
            resolved: self.resolved,
            resolved_at: self.resolved_at.as_deref().map(parse_timestamp).transpose()?,
            resolved_by: self.resolved_by,
            resolution_note: self.resolution_note,
            detected_at: parse_timestamp(&self.detected_at)?,
        })
    }
}

struct SnapshotRow {
    id: String,
    project_id: String,
    coverage_percentage: u32,
    total_documents: i64,
    docs_with_embeddings: i64,
    total_chunks: i64,
    breakdown: String,
    trigger: String,
    snapshot_at: String,
}

impl SnapshotRow {
    fn into_snapshot(self) -> Result<CoverageSnapshot> {
        let breakdown: Vec<CategoryCoverage> = serde_json::from_str(&self.breakdown)?;

        Ok(CoverageSnapshot {
            id: self.id,
            project_id: self.project_id,
            coverage_percentage: self.coverage_percentage,
            total_documents: self.total_documents as usize,
            docs_with_embeddings: self.docs_with_embeddings as usize,
            total_chunks: self.total_chunks as usize,
            breakdown,
            trigger: SnapshotTrigger::parse(&self.trigger),
            snapshot_at: parse_timestamp(&self.snapshot_at)?,
        })
    }
}
