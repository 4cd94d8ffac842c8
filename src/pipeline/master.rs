//! Orquestador principal del pipeline.
//! Se encarga de:
//! - Ejecutar los stages en orden canónico, cada uno vía `safe_process`
//!   (idempotencia + retry clasificado).
//! - Reflejar cada transición en `documents.stage_status` (start/complete/
//!   fail) a través del StageTracker.
//! - Cortar en el primer fallo, con la excepción del stage de storage: si ya
//!   hay imágenes extraídas, se intenta igual para no perderlas.
//! - Exponer `run_single_stage` para reintentos manuales (API) y del worker
//!   de retries.
use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use serde_json::json;
use uuid::Uuid;

use krai_core::{PipelineEngine, ProcessingContext, ProcessingResult, ProcessingStatus, Stage, StageError,
                StageProcessor};
use krai_persistence::{DocumentRepository, StageTracker};

/// Resumen observable de una corrida completa.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineRunSummary {
    pub document_id: Uuid,
    pub completed_stages: Vec<String>,
    pub failed_stage: Option<String>,
    pub retrying_stage: Option<String>,
    pub duplicate_of: Option<Uuid>,
}

pub struct MasterPipeline {
    engine: PipelineEngine,
    tracker: Arc<StageTracker>,
    documents: DocumentRepository,
    /// Procesadores en orden canónico; el registro por stage sirve a
    /// `run_single_stage`.
    processors: Vec<Arc<dyn StageProcessor>>,
    by_stage: HashMap<Stage, Arc<dyn StageProcessor>>,
}

impl MasterPipeline {
    pub fn new(engine: PipelineEngine, tracker: Arc<StageTracker>, documents: DocumentRepository, processors: Vec<Arc<dyn StageProcessor>>) -> Self {
        let by_stage = processors.iter().map(|p| (p.stage(), Arc::clone(p))).collect();
        Self { engine,
               tracker,
               documents,
               processors,
               by_stage }
    }

    pub fn tracker(&self) -> &Arc<StageTracker> {
        &self.tracker
    }

    /// Corrida completa en orden canónico, con smart-resume vía marcadores.
    pub async fn process_document(&self, ctx: &mut ProcessingContext) -> PipelineRunSummary {
        let mut summary = PipelineRunSummary { document_id: ctx.document_id,
                                               completed_stages: Vec::new(),
                                               failed_stage: None,
                                               retrying_stage: None,
                                               duplicate_of: None };

        for processor in &self.processors {
            let stage = processor.stage();
            let result = self.run_tracked(processor.as_ref(), ctx).await;

            match result.status {
                ProcessingStatus::Completed | ProcessingStatus::SkippedCompleted => {
                    summary.completed_stages.push(stage.as_str().to_string());
                }
                ProcessingStatus::SkippedDuplicate => {
                    // Subida duplicada: no hay nada más que procesar.
                    summary.duplicate_of = ctx.duplicate_of;
                    summary.completed_stages.push(stage.as_str().to_string());
                    info!("pipeline: doc={} duplicate of {:?}; stopping", ctx.document_id, ctx.duplicate_of);
                    break;
                }
                ProcessingStatus::Retrying => {
                    // El worker en background terminará este stage; los
                    // posteriores no corren en esta pasada.
                    summary.retrying_stage = Some(stage.as_str().to_string());
                    break;
                }
                ProcessingStatus::Failed => {
                    summary.failed_stage = Some(stage.as_str().to_string());
                    // Las imágenes extraídas no se pierden: si el fallo llegó
                    // después de la extracción pero antes de storage, storage
                    // se intenta igual.
                    if matches!(stage, Stage::Classification | Stage::Metadata) && !ctx.images.is_empty() {
                        if let Some(storage) = self.by_stage.get(&Stage::Storage) {
                            warn!("pipeline: doc={} failed at {stage}, attempting storage stage anyway", ctx.document_id);
                            let storage_result = self.run_tracked(storage.as_ref(), ctx).await;
                            if storage_result.is_success() {
                                summary.completed_stages.push(Stage::Storage.as_str().to_string());
                            }
                        }
                    }
                    break;
                }
            }
        }
        summary
    }

    /// Un stage con su ciclo de tracker: start → safe_process → complete/fail.
    async fn run_tracked(&self, processor: &dyn StageProcessor, ctx: &mut ProcessingContext) -> ProcessingResult {
        let stage = processor.stage();
        if let Err(e) = self.tracker.start_stage(ctx.document_id, stage).await {
            warn!("pipeline: tracker start failed for {stage}: {e}");
        }
        let result = self.engine.safe_process(processor, ctx).await;
        let tracker_result = match result.status {
            ProcessingStatus::Completed | ProcessingStatus::SkippedCompleted | ProcessingStatus::SkippedDuplicate => {
                self.tracker
                    .complete_stage(ctx.document_id,
                                    stage,
                                    json!({
                                        "status": result.status,
                                        "correlation_id": result.correlation_id,
                                        "processing_time_ms": result.processing_time_ms,
                                        "data": result.data,
                                    }))
                    .await
            }
            ProcessingStatus::Retrying => {
                // processing se mantiene; el intento en background cerrará el
                // stage. Se deja rastro del correlation id del próximo intento.
                self.tracker
                    .update_progress(ctx.document_id, stage, 0.0)
                    .await
            }
            ProcessingStatus::Failed => {
                let message = result.error_message.clone().unwrap_or_else(|| "unknown failure".to_string());
                self.tracker.fail_stage(ctx.document_id, stage, &message).await
            }
        };
        if let Err(e) = tracker_result {
            warn!("pipeline: tracker update failed for {stage}: {e}");
        }
        result
    }

    /// Re-corre un único stage (retry manual de la API o worker background).
    /// Reconstruye el contexto desde el documento persistido; cada stage
    /// hidrata de DB lo que le falte.
    pub async fn run_single_stage(&self,
                                  stage: Stage,
                                  document_id: Uuid,
                                  force: bool,
                                  retry_attempt: u32,
                                  pipeline_error_id: Option<Uuid>)
                                  -> Result<ProcessingResult, StageError> {
        let processor = self.by_stage
                            .get(&stage)
                            .ok_or_else(|| StageError::Internal(format!("no processor registered for stage {stage}")))?;
        let doc = self.documents
                      .get(document_id)
                      .await
                      .map_err(StageError::from)?
                      .ok_or_else(|| StageError::Validation(format!("unknown document {document_id}")))?;

        let mut ctx = ProcessingContext::from_document(&doc, &format!("retry-{document_id}"));
        ctx.force = force;
        ctx.retry_attempt = retry_attempt;
        ctx.pipeline_error_id = pipeline_error_id;

        // Los stages de texto/metadata necesitan el texto por página.
        if !matches!(stage, Stage::Upload) && ctx.file_path.exists() {
            if let Ok(pdf) = open_pdf(&ctx) {
                for page in 1..=pdf.page_count() as i32 {
                    let text = pdf.page_text(page as u32);
                    if !text.trim().is_empty() {
                        ctx.page_texts.insert(page, text);
                    }
                }
            }
        }

        Ok(self.run_tracked(processor.as_ref(), &mut ctx).await)
    }
}

pub(crate) fn open_pdf(ctx: &ProcessingContext) -> Result<krai_adapters::pdf::PdfFile, StageError> {
    krai_adapters::pdf::PdfFile::open(&ctx.file_path)
}
