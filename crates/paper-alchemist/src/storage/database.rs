//! SQLite database for document records, source PDFs and the processing log

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, ToSql, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{
    DocumentRecord, DocumentSummary, OcrDecision, PaperMetadata, PipelineStatus, ProcessingLogEntry,
    QualityVerdict, Stage, StageOutcome,
};

use super::repository::DocumentRepository;

const RECORD_COLUMNS: &str = "doc_id, content_id, duplicate_of, status, filename, file_size, raw_text, \
     ocr_performed, ocr_decision, quality_verdict, embedding, metadata, preview_image, error, \
     created_at, updated_at, completed_at";

/// Same columns without the preview blob
const SUMMARY_COLUMNS: &str = "doc_id, content_id, duplicate_of, status, filename, file_size, raw_text, \
     ocr_performed, ocr_decision, quality_verdict, embedding, metadata, NULL, error, \
     created_at, updated_at, completed_at";

/// SQLite-backed document repository
pub struct PaperDb {
    conn: Arc<Mutex<Connection>>,
}

impl PaperDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Database(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::Database(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                doc_id TEXT PRIMARY KEY,
                content_id TEXT,
                duplicate_of TEXT,
                status TEXT NOT NULL,
                filename TEXT,
                file_size INTEGER NOT NULL,
                raw_text TEXT NOT NULL DEFAULT '',
                ocr_performed INTEGER NOT NULL DEFAULT 0,
                ocr_decision TEXT,
                quality_verdict TEXT,
                embedding BLOB,
                metadata TEXT,
                preview_image BLOB,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            );

            -- Dedup lookups; deliberately not unique, duplicates are kept
            CREATE INDEX IF NOT EXISTS idx_documents_content_id ON documents(content_id);
            CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);

            CREATE TABLE IF NOT EXISTS document_sources (
                doc_id TEXT PRIMARY KEY REFERENCES documents(doc_id),
                pdf BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS processing_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                doc_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                outcome TEXT NOT NULL,
                message TEXT,
                duration_ms INTEGER NOT NULL,
                logged_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_processing_log_doc_id ON processing_log(doc_id);
        "#,
        )
        .map_err(|e| Error::Database(format!("Failed to create tables: {}", e)))?;

        tracing::debug!("Database migrations complete");
        Ok(())
    }
}

impl DocumentRepository for PaperDb {
    fn create(&self, record: &DocumentRecord, pdf: &[u8]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO documents (
                doc_id, status, filename, file_size, raw_text, ocr_performed, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.doc_id.to_string(),
                record.status.as_str(),
                record.filename,
                record.file_size as i64,
                record.raw_text,
                record.ocr_performed,
                timestamp(record.created_at),
                timestamp(record.updated_at),
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to insert document: {}", e)))?;

        tx.execute(
            "INSERT INTO document_sources (doc_id, pdf) VALUES (?1, ?2)",
            params![record.doc_id.to_string(), pdf],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get(&self, doc_id: Uuid) -> Result<Option<DocumentRecord>> {
        let conn = self.conn.lock();

        let record = conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE doc_id = ?1", RECORD_COLUMNS),
                params![doc_id.to_string()],
                row_to_record,
            )
            .optional()
            .map_err(|e| Error::Database(format!("Failed to get document: {}", e)))?;

        Ok(record)
    }

    fn source_pdf(&self, doc_id: Uuid) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let pdf = conn
            .query_row(
                "SELECT pdf FROM document_sources WHERE doc_id = ?1",
                params![doc_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(pdf)
    }

    fn list(&self) -> Result<Vec<DocumentSummary>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM documents ORDER BY created_at DESC, rowid DESC",
            SUMMARY_COLUMNS
        ))?;

        let records = stmt
            .query_map([], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(format!("Failed to list documents: {}", e)))?;

        Ok(records.iter().map(DocumentRecord::summary).collect())
    }

    fn status_counts(&self) -> Result<Vec<(PipelineStatus, usize)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM documents GROUP BY status")?;

        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((status, count))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = Vec::with_capacity(rows.len());
        for (status, count) in rows {
            counts.push((status.parse::<PipelineStatus>()?, count as usize));
        }
        counts.sort_by_key(|(status, _)| PipelineStatus::ALL.iter().position(|s| s == status));
        Ok(counts)
    }

    fn record_ocr(
        &self,
        doc_id: Uuid,
        text: &str,
        ocr_performed: bool,
        decision: OcrDecision,
        preview: Option<&[u8]>,
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let decision = decision.as_str();
        checkpoint(
            &tx,
            doc_id,
            PipelineStatus::OcrDone,
            None,
            "raw_text = ?5, ocr_performed = ?6, ocr_decision = ?7, preview_image = ?8",
            &[&text, &ocr_performed, &decision, &preview],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn record_quality(&self, doc_id: Uuid, verdict: Option<&QualityVerdict>, ocr_text: Option<&str>) -> Result<()> {
        let verdict_json = verdict.map(serde_json::to_string).transpose()?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        checkpoint(
            &tx,
            doc_id,
            PipelineStatus::QualityChecked,
            None,
            "quality_verdict = ?5, raw_text = COALESCE(?6, raw_text), \
             ocr_performed = CASE WHEN ?6 IS NULL THEN ocr_performed ELSE 1 END",
            &[&verdict_json, &ocr_text],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn record_embedding(&self, doc_id: Uuid, embedding: &[f32], content_id: &str) -> Result<Option<Uuid>> {
        let blob = embedding_to_blob(embedding);
        let id = doc_id.to_string();

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Earliest other holder of the content id, resolved to the record it duplicates
        let duplicate_of: Option<String> = tx
            .query_row(
                r#"
                SELECT COALESCE(duplicate_of, doc_id) FROM documents
                WHERE content_id = ?1 AND doc_id != ?2
                ORDER BY created_at ASC, rowid ASC
                LIMIT 1
                "#,
                params![content_id, id],
                |row| row.get(0),
            )
            .optional()?
            .filter(|original: &String| original != &id);

        checkpoint(
            &tx,
            doc_id,
            PipelineStatus::Embedded,
            None,
            "embedding = ?5, content_id = ?6, duplicate_of = ?7",
            &[&blob, &content_id, &duplicate_of],
        )?;

        tx.commit()?;

        Ok(duplicate_of.and_then(|s| Uuid::parse_str(&s).ok()))
    }

    fn record_metadata(&self, doc_id: Uuid, metadata: &PaperMetadata) -> Result<()> {
        let json = serde_json::to_string(metadata)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        checkpoint(&tx, doc_id, PipelineStatus::MetadataExtracted, None, "metadata = ?5", &[&json])?;
        tx.commit()?;
        Ok(())
    }

    fn mark_complete(&self, doc_id: Uuid) -> Result<()> {
        let completed_at = timestamp(Utc::now());

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        checkpoint(&tx, doc_id, PipelineStatus::Complete, None, "completed_at = ?5", &[&completed_at])?;
        tx.commit()?;
        Ok(())
    }

    fn record_failure(&self, doc_id: Uuid, failed: PipelineStatus, error: &str) -> Result<()> {
        if !failed.is_failed() {
            return Err(Error::internal(format!("{} is not a failure status", failed)));
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        checkpoint(&tx, doc_id, failed, Some(error), "", &[])?;
        tx.commit()?;
        Ok(())
    }

    fn rewind(&self, doc_id: Uuid, restart_from: Stage) -> Result<PipelineStatus> {
        let target = restart_from.rewind_status();

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = current_status(&tx, doc_id)?
            .ok_or_else(|| Error::DocumentNotFound(doc_id.to_string()))?;

        if current.progress() < target.progress() {
            return Err(Error::CheckpointRejected {
                doc_id: doc_id.to_string(),
                from: current,
                to: target,
            });
        }

        const FINALIZE: &str = "completed_at = NULL";
        const METADATA: &str = "metadata = NULL, completed_at = NULL";
        const EMBEDDING: &str =
            "embedding = NULL, content_id = NULL, duplicate_of = NULL, metadata = NULL, completed_at = NULL";

        let cleared = match restart_from {
            Stage::Finalize => FINALIZE.to_string(),
            Stage::Metadata => METADATA.to_string(),
            Stage::Embedding => EMBEDDING.to_string(),
            Stage::QualityJudge => format!("quality_verdict = NULL, {}", EMBEDDING),
            Stage::Ocr => format!(
                "raw_text = '', ocr_performed = 0, ocr_decision = NULL, preview_image = NULL, \
                 quality_verdict = NULL, {}",
                EMBEDDING
            ),
        };

        tx.execute(
            &format!(
                "UPDATE documents SET status = ?1, error = NULL, updated_at = ?2, {} WHERE doc_id = ?3",
                cleared
            ),
            params![target.as_str(), timestamp(Utc::now()), doc_id.to_string()],
        )?;

        if target.progress() < PipelineStatus::Embedded.progress() {
            release_duplicates(&tx, doc_id)?;
        }

        tx.commit()?;

        tracing::info!("Rewound {} from {} to {}", doc_id, current, target);
        Ok(target)
    }

    fn find_by_content_id(&self, content_id: &str) -> Result<Vec<Uuid>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT doc_id FROM documents WHERE content_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;

        let ids = stmt
            .query_map(params![content_id], |row| {
                let id: String = row.get(0)?;
                parse_uuid(0, &id)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(format!("Failed to look up content id: {}", e)))?;

        Ok(ids)
    }

    fn append_log(&self, entry: &ProcessingLogEntry) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO processing_log (doc_id, stage, outcome, message, duration_ms, logged_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                entry.doc_id.to_string(),
                entry.stage,
                entry.outcome.as_str(),
                entry.message,
                entry.duration_ms as i64,
                timestamp(entry.logged_at),
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to append processing log: {}", e)))?;
        Ok(())
    }

    fn processing_log(&self, doc_id: Uuid) -> Result<Vec<ProcessingLogEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT doc_id, stage, outcome, message, duration_ms, logged_at
            FROM processing_log WHERE doc_id = ?1 ORDER BY id ASC
            "#,
        )?;

        let entries = stmt
            .query_map(params![doc_id.to_string()], |row| {
                let doc_id: String = row.get(0)?;
                let outcome: String = row.get(2)?;
                let duration_ms: i64 = row.get(4)?;
                let logged_at: String = row.get(5)?;
                Ok(ProcessingLogEntry {
                    doc_id: parse_uuid(0, &doc_id)?,
                    stage: row.get(1)?,
                    outcome: StageOutcome::parse(&outcome),
                    message: row.get(3)?,
                    duration_ms: duration_ms.max(0) as u64,
                    logged_at: parse_timestamp(&logged_at),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }
}

/// Guarded status update shared by every checkpoint
///
/// `?1`..`?4` are status, updated_at, doc_id and error; `assignments` may
/// refer to `?5` onwards, bound from `values`.
fn checkpoint(
    conn: &Connection,
    doc_id: Uuid,
    to: PipelineStatus,
    error: Option<&str>,
    assignments: &str,
    values: &[&dyn ToSql],
) -> Result<()> {
    let allowed = to
        .allowed_predecessors()
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = String::from("UPDATE documents SET status = ?1, updated_at = ?2, error = ?4");
    if !assignments.is_empty() {
        sql.push_str(", ");
        sql.push_str(assignments);
    }
    sql.push_str(&format!(" WHERE doc_id = ?3 AND status IN ({})", allowed));

    let status = to.as_str();
    let now = timestamp(Utc::now());
    let id = doc_id.to_string();

    let mut bound: Vec<&dyn ToSql> = vec![&status, &now, &id, &error];
    bound.extend_from_slice(values);

    let changed = conn.execute(&sql, bound.as_slice())?;
    if changed == 1 {
        return Ok(());
    }

    match current_status(conn, doc_id)? {
        None => Err(Error::DocumentNotFound(doc_id.to_string())),
        Some(from) => Err(Error::CheckpointRejected {
            doc_id: doc_id.to_string(),
            from,
            to,
        }),
    }
}

/// Re-point duplicates of a record whose content id was just cleared.
/// The earliest of them becomes the new original for the rest.
fn release_duplicates(conn: &Connection, doc_id: Uuid) -> Result<()> {
    let id = doc_id.to_string();

    let successor: Option<String> = conn
        .query_row(
            "SELECT doc_id FROM documents WHERE duplicate_of = ?1 ORDER BY created_at ASC, rowid ASC LIMIT 1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(successor) = successor else {
        return Ok(());
    };

    conn.execute("UPDATE documents SET duplicate_of = NULL WHERE doc_id = ?1", params![successor])?;
    let moved = conn.execute(
        "UPDATE documents SET duplicate_of = ?1 WHERE duplicate_of = ?2",
        params![successor, id],
    )?;

    tracing::info!("Released duplicates of {}: {} now original for {} records", doc_id, successor, moved);
    Ok(())
}

fn current_status(conn: &Connection, doc_id: Uuid) -> Result<Option<PipelineStatus>> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM documents WHERE doc_id = ?1",
            params![doc_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    status.map(|s| s.parse()).transpose()
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Canonical little-endian f32 encoding
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn conversion_error(idx: usize, e: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<DocumentRecord> {
    let doc_id: String = row.get(0)?;
    let content_id: Option<String> = row.get(1)?;
    let duplicate_of: Option<String> = row.get(2)?;
    let status: String = row.get(3)?;
    let filename: Option<String> = row.get(4)?;
    let file_size: i64 = row.get(5)?;
    let raw_text: String = row.get(6)?;
    let ocr_performed: bool = row.get(7)?;
    let ocr_decision: Option<String> = row.get(8)?;
    let quality_verdict: Option<String> = row.get(9)?;
    let embedding: Option<Vec<u8>> = row.get(10)?;
    let metadata: Option<String> = row.get(11)?;
    let preview_image: Option<Vec<u8>> = row.get(12)?;
    let error: Option<String> = row.get(13)?;
    let created_at: String = row.get(14)?;
    let updated_at: String = row.get(15)?;
    let completed_at: Option<String> = row.get(16)?;

    Ok(DocumentRecord {
        doc_id: parse_uuid(0, &doc_id)?,
        content_id,
        duplicate_of: duplicate_of.and_then(|s| Uuid::parse_str(&s).ok()),
        status: status.parse().map_err(|e| conversion_error(3, e))?,
        filename,
        file_size: file_size.max(0) as u64,
        raw_text,
        ocr_performed,
        ocr_decision: ocr_decision
            .map(|s| s.parse::<OcrDecision>())
            .transpose()
            .map_err(|e| conversion_error(8, e))?,
        quality_verdict: quality_verdict.and_then(|j| serde_json::from_str(&j).ok()),
        embedding: embedding.map(|b| blob_to_embedding(&b)),
        metadata: metadata.and_then(|j| serde_json::from_str(&j).ok()),
        preview_image,
        error,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
        completed_at: completed_at.as_deref().map(parse_timestamp),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(db: &PaperDb, name: &str) -> Uuid {
        let doc_id = Uuid::new_v4();
        let record = DocumentRecord::received(doc_id, Some(name.to_string()), 4);
        db.create(&record, b"%PDF").unwrap();
        doc_id
    }

    fn to_embedded(db: &PaperDb, doc_id: Uuid, embedding: &[f32], content_id: &str) -> Option<Uuid> {
        db.record_ocr(doc_id, "text", false, OcrDecision::NotNeeded, Some(b"png")).unwrap();
        db.record_quality(doc_id, None, None).unwrap();
        db.record_embedding(doc_id, embedding, content_id).unwrap()
    }

    #[test]
    fn create_and_get() {
        let db = PaperDb::in_memory().unwrap();
        let doc_id = seeded(&db, "paper.pdf");

        let record = db.get(doc_id).unwrap().unwrap();
        assert_eq!(record.status, PipelineStatus::Received);
        assert_eq!(record.filename.as_deref(), Some("paper.pdf"));
        assert_eq!(record.raw_text, "");
        assert_eq!(db.source_pdf(doc_id).unwrap().unwrap(), b"%PDF");
        assert!(db.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn checkpoints_advance_in_order() {
        let db = PaperDb::in_memory().unwrap();
        let doc_id = seeded(&db, "a.pdf");

        let verdict = QualityVerdict::new(false, 0.9, "clean");
        db.record_ocr(doc_id, "hello world", false, OcrDecision::NotNeeded, Some(b"png")).unwrap();
        db.record_quality(doc_id, Some(&verdict), None).unwrap();
        db.record_embedding(doc_id, &[1.0, -2.5], "abc").unwrap();
        db.record_metadata(doc_id, &PaperMetadata { title: Some("T".into()), ..Default::default() })
            .unwrap();
        db.mark_complete(doc_id).unwrap();

        let record = db.get(doc_id).unwrap().unwrap();
        assert_eq!(record.status, PipelineStatus::Complete);
        assert_eq!(record.raw_text, "hello world");
        assert_eq!(record.ocr_decision, Some(OcrDecision::NotNeeded));
        assert_eq!(record.quality_verdict, Some(verdict));
        assert_eq!(record.embedding, Some(vec![1.0, -2.5]));
        assert_eq!(record.content_id.as_deref(), Some("abc"));
        assert_eq!(record.preview_image.as_deref(), Some(&b"png"[..]));
        assert!(record.completed_at.is_some());
    }

    #[test]
    fn skipping_a_checkpoint_is_rejected() {
        let db = PaperDb::in_memory().unwrap();
        let doc_id = seeded(&db, "a.pdf");

        let err = db.record_embedding(doc_id, &[1.0], "abc").unwrap_err();
        assert!(matches!(
            err,
            Error::CheckpointRejected { from: PipelineStatus::Received, to: PipelineStatus::Embedded, .. }
        ));

        let record = db.get(doc_id).unwrap().unwrap();
        assert_eq!(record.status, PipelineStatus::Received);
        assert!(record.embedding.is_none());
    }

    #[test]
    fn missing_document_is_not_found() {
        let db = PaperDb::in_memory().unwrap();
        assert!(matches!(
            db.mark_complete(Uuid::new_v4()),
            Err(Error::DocumentNotFound(_))
        ));
    }

    #[test]
    fn failure_keeps_outputs_and_success_clears_error() {
        let db = PaperDb::in_memory().unwrap();
        let doc_id = seeded(&db, "a.pdf");
        db.record_ocr(doc_id, "kept text", false, OcrDecision::NotNeeded, None).unwrap();
        db.record_quality(doc_id, None, None).unwrap();

        db.record_failure(doc_id, PipelineStatus::EmbeddingFailed, "ollama down").unwrap();
        let failed = db.get(doc_id).unwrap().unwrap();
        assert_eq!(failed.status, PipelineStatus::EmbeddingFailed);
        assert_eq!(failed.raw_text, "kept text");
        assert_eq!(failed.error.as_deref(), Some("ollama down"));

        db.record_embedding(doc_id, &[0.5], "cid").unwrap();
        let recovered = db.get(doc_id).unwrap().unwrap();
        assert_eq!(recovered.status, PipelineStatus::Embedded);
        assert!(recovered.error.is_none());
    }

    #[test]
    fn duplicates_reference_the_first_document() {
        let db = PaperDb::in_memory().unwrap();
        let first = seeded(&db, "a.pdf");
        let second = seeded(&db, "b.pdf");
        let third = seeded(&db, "c.pdf");

        assert_eq!(to_embedded(&db, first, &[1.0], "same"), None);
        assert_eq!(to_embedded(&db, second, &[1.0], "same"), Some(first));
        assert_eq!(to_embedded(&db, third, &[1.0], "same"), Some(first));

        assert_eq!(db.find_by_content_id("same").unwrap(), vec![first, second, third]);
        assert_eq!(db.get(second).unwrap().unwrap().duplicate_of, Some(first));
    }

    #[test]
    fn rewound_original_hands_over_to_its_duplicates() {
        let db = PaperDb::in_memory().unwrap();
        let a = seeded(&db, "a.pdf");
        let b = seeded(&db, "b.pdf");
        let c = seeded(&db, "c.pdf");
        let d = seeded(&db, "d.pdf");

        assert_eq!(to_embedded(&db, a, &[1.0], "same"), None);
        assert_eq!(to_embedded(&db, b, &[1.0], "same"), Some(a));
        assert_eq!(to_embedded(&db, c, &[1.0], "same"), Some(a));

        db.rewind(a, Stage::Embedding).unwrap();
        assert_eq!(db.get(b).unwrap().unwrap().duplicate_of, None);
        assert_eq!(db.get(c).unwrap().unwrap().duplicate_of, Some(b));

        assert_eq!(db.record_embedding(a, &[2.0], "other").unwrap(), None);
        assert_eq!(to_embedded(&db, d, &[1.0], "same"), Some(b));
        assert_eq!(db.find_by_content_id("same").unwrap(), vec![b, c, d]);
    }

    #[test]
    fn re_embedding_an_original_with_the_same_content_links_to_a_survivor() {
        let db = PaperDb::in_memory().unwrap();
        let a = seeded(&db, "a.pdf");
        let b = seeded(&db, "b.pdf");
        let c = seeded(&db, "c.pdf");

        to_embedded(&db, a, &[1.0], "same");
        to_embedded(&db, b, &[1.0], "same");
        db.rewind(a, Stage::Embedding).unwrap();

        assert_eq!(db.record_embedding(a, &[1.0], "same").unwrap(), Some(b));
        assert_eq!(to_embedded(&db, c, &[1.0], "same"), Some(b));
    }

    #[test]
    fn rewind_clears_downstream_outputs() {
        let db = PaperDb::in_memory().unwrap();
        let doc_id = seeded(&db, "a.pdf");
        to_embedded(&db, doc_id, &[1.0], "cid");
        db.record_metadata(doc_id, &PaperMetadata { title: Some("T".into()), ..Default::default() })
            .unwrap();

        let status = db.rewind(doc_id, Stage::Embedding).unwrap();
        assert_eq!(status, PipelineStatus::QualityChecked);

        let record = db.get(doc_id).unwrap().unwrap();
        assert_eq!(record.status, PipelineStatus::QualityChecked);
        assert_eq!(record.raw_text, "text");
        assert!(record.embedding.is_none());
        assert!(record.content_id.is_none());
        assert!(record.metadata.is_none());
    }

    #[test]
    fn rewind_cannot_jump_forward() {
        let db = PaperDb::in_memory().unwrap();
        let doc_id = seeded(&db, "a.pdf");
        assert!(matches!(
            db.rewind(doc_id, Stage::Metadata),
            Err(Error::CheckpointRejected { .. })
        ));
        assert_eq!(db.rewind(doc_id, Stage::Ocr).unwrap(), PipelineStatus::Received);
    }

    #[test]
    fn processing_log_round_trip() {
        let db = PaperDb::in_memory().unwrap();
        let doc_id = seeded(&db, "a.pdf");

        for (stage, outcome) in [("ocr", StageOutcome::Completed), ("quality_judge", StageOutcome::SoftFailed)] {
            db.append_log(&ProcessingLogEntry {
                doc_id,
                stage: stage.to_string(),
                outcome,
                message: None,
                duration_ms: 12,
                logged_at: Utc::now(),
            })
            .unwrap();
        }

        let log = db.processing_log(doc_id).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].outcome, StageOutcome::SoftFailed);
        assert!(db.processing_log(Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn list_and_counts() {
        let db = PaperDb::in_memory().unwrap();
        let a = seeded(&db, "a.pdf");
        seeded(&db, "b.pdf");
        db.record_failure(a, PipelineStatus::OcrFailed, "corrupt").unwrap();

        let list = db.list().unwrap();
        assert_eq!(list.len(), 2);

        let counts = db.status_counts().unwrap();
        assert_eq!(
            counts,
            vec![(PipelineStatus::Received, 1), (PipelineStatus::OcrFailed, 1)]
        );
    }
}
