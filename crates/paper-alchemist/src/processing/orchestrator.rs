//! Per-document pipeline state machine
//!
//! A run starts at `status.next_stage()` and walks the stages in order,
//! writing one checkpoint per stage. Stage failures freeze the document at
//! the stage's `*_failed` status; checkpoint write failures abort the run and
//! report the last confirmed status.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::AlchemistConfig;
use crate::error::{Error, Result};
use crate::ingestion::validate_upload;
use crate::providers::{
    EmbeddingProvider, LlmProvider, OcrEngine, OllamaClient, OllamaEmbedder, OllamaLlm, OllamaVision,
    PopplerOcrEngine, VisionModel,
};
use crate::stages::{EmbeddingStage, MetadataStage, OcrStage, QualityJudgeStage, QualityOutcome};
use crate::storage::{DocumentRepository, PaperDb};
use crate::types::{
    DocumentRecord, OcrDecision, PipelineReport, PipelineStatus, ProcessingLogEntry, Stage, StageOutcome,
    StageReport,
};

use super::{ContentIdentifier, StagePolicy};

/// External model collaborators the pipeline drives
#[derive(Clone)]
pub struct Collaborators {
    pub ocr: Arc<dyn OcrEngine>,
    pub vision: Arc<dyn VisionModel>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub llm: Arc<dyn LlmProvider>,
}

/// How a stage ended when it did not halt the document
struct Step {
    outcome: StageOutcome,
    message: Option<String>,
}

impl Step {
    fn completed(message: impl Into<String>) -> Self {
        Self {
            outcome: StageOutcome::Completed,
            message: Some(message.into()),
        }
    }

    fn skipped(message: impl Into<String>) -> Self {
        Self {
            outcome: StageOutcome::Skipped,
            message: Some(message.into()),
        }
    }

    fn soft_failed(message: impl Into<String>) -> Self {
        Self {
            outcome: StageOutcome::SoftFailed,
            message: Some(message.into()),
        }
    }
}

/// Why a stage did not advance
enum Halt {
    /// The stage failed; the document freezes at the stage's failure status
    Stage(Error),
    /// A store read or checkpoint write failed
    Store(Error),
}

type StepResult = std::result::Result<Step, Halt>;

/// Removes the document from the in-flight set when the run ends
struct InFlight<'a> {
    set: &'a DashMap<Uuid, ()>,
    doc_id: Uuid,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.doc_id);
    }
}

/// Pipeline orchestrator
pub struct Pipeline {
    repo: Arc<dyn DocumentRepository>,
    ocr: OcrStage,
    quality: QualityJudgeStage,
    embedding: EmbeddingStage,
    metadata: MetadataStage,
    identifier: ContentIdentifier,
    max_upload_size: usize,
    in_flight: DashMap<Uuid, ()>,
}

impl Pipeline {
    pub fn new(config: &AlchemistConfig, repo: Arc<dyn DocumentRepository>, collaborators: Collaborators) -> Self {
        let policy = |stage| StagePolicy::for_stage(&config.pipeline, stage);

        let embedding = EmbeddingStage::new(collaborators.embedder, &config.embeddings, policy(Stage::Embedding));
        let identifier = ContentIdentifier::new(embedding.dimensions());

        Self {
            repo,
            ocr: OcrStage::new(collaborators.ocr, config.ocr.clone(), policy(Stage::Ocr)),
            quality: QualityJudgeStage::new(collaborators.vision, policy(Stage::QualityJudge)),
            embedding,
            metadata: MetadataStage::new(collaborators.llm, config.metadata.clone(), policy(Stage::Metadata)),
            identifier,
            max_upload_size: config.server.max_upload_size,
            in_flight: DashMap::new(),
        }
    }

    /// Pipeline over the configured SQLite database, Ollama models and
    /// local Poppler/Tesseract tools
    pub fn open(config: &AlchemistConfig) -> Result<Self> {
        let repo = Arc::new(PaperDb::new(config.database_path())?);
        tracing::info!("Database opened at {}", config.database_path().display());

        let client = Arc::new(OllamaClient::new(&config.ollama)?);
        tracing::info!("Ollama client initialized at {}", client.base_url());

        if !PopplerOcrEngine::tools_available() {
            tracing::warn!("pdftoppm/tesseract not found on PATH; OCR and previews will fail");
        }

        let collaborators = Collaborators {
            ocr: Arc::new(PopplerOcrEngine::new(&config.ocr)),
            vision: Arc::new(OllamaVision::new(Arc::clone(&client), &config.vision)),
            embedder: Arc::new(OllamaEmbedder::new(Arc::clone(&client), &config.embeddings)),
            llm: Arc::new(OllamaLlm::new(client, &config.metadata)),
        };

        Ok(Self::new(config, repo, collaborators))
    }

    pub fn repository(&self) -> &Arc<dyn DocumentRepository> {
        &self.repo
    }

    /// Validate and persist an upload, then run it through every stage
    pub async fn ingest(&self, pdf: &[u8], filename: Option<String>) -> Result<PipelineReport> {
        validate_upload(pdf, self.max_upload_size)?;

        let doc_id = Uuid::new_v4();
        let record = DocumentRecord::received(doc_id, filename, pdf.len() as u64);
        self.repo.create(&record, pdf)?;

        tracing::info!(
            "Received document {} ({}, {} bytes)",
            doc_id,
            record.filename.as_deref().unwrap_or("unnamed"),
            pdf.len()
        );

        self.process(doc_id).await
    }

    /// Resume a document from its persisted status
    ///
    /// A complete document is left untouched; a failed one retries the stage
    /// that failed using the outputs already persisted.
    pub async fn process(&self, doc_id: Uuid) -> Result<PipelineReport> {
        let _guard = self.claim(doc_id)?;

        let record = self
            .repo
            .get(doc_id)?
            .ok_or_else(|| Error::DocumentNotFound(doc_id.to_string()))?;

        self.run(record).await
    }

    /// Rewind to the checkpoint before `restart_from` and run from there
    pub async fn reprocess(&self, doc_id: Uuid, restart_from: Stage) -> Result<PipelineReport> {
        let _guard = self.claim(doc_id)?;

        self.repo.rewind(doc_id, restart_from)?;
        let record = self
            .repo
            .get(doc_id)?
            .ok_or_else(|| Error::DocumentNotFound(doc_id.to_string()))?;

        tracing::info!("Reprocessing {} from {}", doc_id, restart_from);
        self.run(record).await
    }

    fn claim(&self, doc_id: Uuid) -> Result<InFlight<'_>> {
        match self.in_flight.entry(doc_id) {
            Entry::Occupied(_) => Err(Error::AlreadyProcessing(doc_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InFlight {
                    set: &self.in_flight,
                    doc_id,
                })
            }
        }
    }

    async fn run(&self, mut record: DocumentRecord) -> Result<PipelineReport> {
        let started = Instant::now();
        let doc_id = record.doc_id;
        let mut stages = Vec::new();
        let mut error = None;

        if record.status == PipelineStatus::Complete {
            tracing::info!("Document {} already complete, nothing to do", doc_id);
        }

        while let Some(stage) = record.status.next_stage() {
            tracing::info!("[{}] {} started (status {})", doc_id, stage, record.status);
            let stage_started = Instant::now();

            let result = match stage {
                Stage::Ocr => self.ocr_stage(&mut record).await,
                Stage::QualityJudge => self.quality_stage(&mut record).await,
                Stage::Embedding => self.embedding_stage(&mut record).await,
                Stage::Metadata => self.metadata_stage(&mut record).await,
                Stage::Finalize => self.finalize_stage(&mut record),
            };
            let duration_ms = stage_started.elapsed().as_millis() as u64;

            match result {
                Ok(step) => {
                    record.status = stage.success_status();
                    record.error = None;
                    tracing::info!("[{}] {} {} in {}ms", doc_id, stage, step.outcome, duration_ms);
                    self.log(doc_id, stage, step.outcome, step.message.clone(), duration_ms);
                    stages.push(StageReport {
                        stage,
                        outcome: step.outcome,
                        duration_ms,
                        message: step.message,
                    });
                }
                Err(Halt::Stage(e)) => {
                    let message = e.to_string();
                    let Some(failed) = stage.failure_status() else {
                        return Err(self.persistence_error(doc_id, record.status, e));
                    };

                    tracing::error!("[{}] {} failed after {}ms: {}", doc_id, stage, duration_ms, message);
                    self.repo
                        .record_failure(doc_id, failed, &message)
                        .map_err(|e| self.persistence_error(doc_id, record.status, e))?;
                    self.log(doc_id, stage, StageOutcome::Failed, Some(message.clone()), duration_ms);

                    record.status = failed;
                    stages.push(StageReport {
                        stage,
                        outcome: StageOutcome::Failed,
                        duration_ms,
                        message: Some(message.clone()),
                    });
                    error = Some(message);
                    break;
                }
                Err(Halt::Store(e)) => {
                    tracing::error!("[{}] checkpoint for {} not written: {}", doc_id, stage, e);
                    return Err(self.persistence_error(doc_id, record.status, e));
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!("[{}] run finished at {} in {}ms", doc_id, record.status, duration_ms);

        Ok(PipelineReport {
            doc_id,
            status: record.status,
            content_id: record.content_id,
            duplicate_of: record.duplicate_of,
            error,
            stages,
            duration_ms,
        })
    }

    async fn ocr_stage(&self, record: &mut DocumentRecord) -> StepResult {
        let pdf = self.source_pdf(record.doc_id)?;
        let output = self.ocr.extract(&pdf).await.map_err(Halt::Stage)?;

        self.repo
            .record_ocr(
                record.doc_id,
                &output.text,
                output.ocr_performed,
                output.decision,
                output.preview.as_deref(),
            )
            .map_err(Halt::Store)?;

        let message = format!(
            "{} chars, decision {}, ocr_performed={}{}",
            output.text.chars().count(),
            output.decision,
            output.ocr_performed,
            if output.preview.is_none() { ", no preview" } else { "" }
        );

        record.raw_text = output.text;
        record.ocr_performed = output.ocr_performed;
        record.ocr_decision = Some(output.decision);
        record.preview_image = output.preview;

        Ok(Step::completed(message))
    }

    async fn quality_stage(&self, record: &mut DocumentRecord) -> StepResult {
        let (step, verdict) = match record.preview_image.as_deref() {
            None => (Step::skipped("no preview image"), None),
            Some(png) => match self.quality.judge(png).await {
                QualityOutcome::Judged(verdict) => (
                    Step::completed(format!(
                        "needs_ocr={} confidence={:.2}",
                        verdict.needs_ocr, verdict.confidence
                    )),
                    Some(verdict),
                ),
                QualityOutcome::Unparseable => (Step::soft_failed("unparseable verdict"), None),
                QualityOutcome::Unavailable(reason) => (Step::soft_failed(reason), None),
            },
        };

        let ocr_text = match (record.ocr_decision, verdict.as_ref()) {
            (Some(OcrDecision::Deferred), Some(verdict)) => {
                let pdf = self.source_pdf(record.doc_id)?;
                self.ocr.resolve_deferred(&pdf, Some(verdict)).await
            }
            _ => None,
        };

        self.repo
            .record_quality(record.doc_id, verdict.as_ref(), ocr_text.as_deref())
            .map_err(Halt::Store)?;

        if let Some(text) = ocr_text {
            tracing::info!("[{}] deferred OCR replaced the text layer", record.doc_id);
            record.raw_text = text;
            record.ocr_performed = true;
        }
        record.quality_verdict = verdict;

        Ok(step)
    }

    async fn embedding_stage(&self, record: &mut DocumentRecord) -> StepResult {
        if record.raw_text.trim().is_empty() {
            return Err(Halt::Stage(Error::InvalidInput(
                "No extracted text to embed".to_string(),
            )));
        }

        let embedding = self.embedding.embed(&record.raw_text).await.map_err(Halt::Stage)?;
        let content_id = self.identifier.identify(&embedding).map_err(Halt::Stage)?;

        let duplicate_of = self
            .repo
            .record_embedding(record.doc_id, &embedding, &content_id)
            .map_err(Halt::Store)?;

        let message = match duplicate_of {
            Some(original) => {
                tracing::warn!("[{}] duplicate of {} (content {})", record.doc_id, original, content_id);
                format!("content {} duplicates {}", content_id, original)
            }
            None => format!("content {}", content_id),
        };

        record.embedding = Some(embedding);
        record.content_id = Some(content_id);
        record.duplicate_of = duplicate_of;

        Ok(Step::completed(message))
    }

    async fn metadata_stage(&self, record: &mut DocumentRecord) -> StepResult {
        let metadata = self
            .metadata
            .extract_metadata(&record.raw_text)
            .await
            .map_err(Halt::Stage)?;

        self.repo
            .record_metadata(record.doc_id, &metadata)
            .map_err(Halt::Store)?;

        let message = format!("{} fields", metadata.populated_fields());
        record.metadata = Some(metadata);
        Ok(Step::completed(message))
    }

    fn finalize_stage(&self, record: &mut DocumentRecord) -> StepResult {
        self.repo.mark_complete(record.doc_id).map_err(Halt::Store)?;
        record.completed_at = Some(Utc::now());
        Ok(Step::completed("complete"))
    }

    fn source_pdf(&self, doc_id: Uuid) -> std::result::Result<Vec<u8>, Halt> {
        match self.repo.source_pdf(doc_id) {
            Ok(Some(pdf)) => Ok(pdf),
            Ok(None) => Err(Halt::Store(Error::DocumentNotFound(format!(
                "source PDF for {}",
                doc_id
            )))),
            Err(e) => Err(Halt::Store(e)),
        }
    }

    fn log(&self, doc_id: Uuid, stage: Stage, outcome: StageOutcome, message: Option<String>, duration_ms: u64) {
        let entry = ProcessingLogEntry {
            doc_id,
            stage: stage.as_str().to_string(),
            outcome,
            message,
            duration_ms,
            logged_at: Utc::now(),
        };

        if let Err(e) = self.repo.append_log(&entry) {
            tracing::warn!("[{}] processing log append failed: {}", doc_id, e);
        }
    }

    fn persistence_error(&self, doc_id: Uuid, last_confirmed: PipelineStatus, e: Error) -> Error {
        match e {
            Error::CheckpointRejected { .. } | Error::DocumentNotFound(_) => e,
            other => Error::Persistence {
                doc_id: doc_id.to_string(),
                last_confirmed,
                message: other.to_string(),
            },
        }
    }
}
