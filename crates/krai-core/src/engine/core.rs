//! Core PipelineEngine implementation
//!
//! `safe_process` envuelve a cada stage con el mismo contrato:
//! idempotencia → ejecución → clasificación → retry → métricas. Los stores
//! concretos (Postgres o memoria) se inyectan por constructor; el engine no
//! conoce SQL ni HTTP.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, warn};
use serde_json::json;
use uuid::Uuid;

use crate::classify::{classify_error, ErrorCategory};
use crate::constants::PIPELINE_VERSION;
use crate::context::ProcessingContext;
use crate::errorlog::{ErrorLog, ErrorStatus, PipelineErrorRecord};
use crate::errors::StageError;
use crate::hashing::correlation_id;
use crate::idempotency::{compute_context_hash, CompletionStore};
use crate::metrics::PerformanceCollector;
use crate::result::{ProcessingResult, ProcessingStatus};
use crate::retry::{RetryPolicy, RetryPolicySource};
use crate::scheduler::{RetryRequest, RetryScheduler};
use crate::stage::Stage;

/// Salida exitosa de un stage.
pub enum StageSuccess {
    /// Corrida normal; `data` es la salida observable del stage.
    Done(serde_json::Value),
    /// Dedupe por contenido (p.ej. subida de bytes ya conocidos).
    SkippedDuplicate(serde_json::Value),
}

/// Contrato de un stage del pipeline.
///
/// Reglas clave:
/// - `context_fingerprint` debe devolver el subconjunto ESTABLE del contexto
///   que gobierna la idempotencia del stage (mismo subset ⇒ mismo hash).
/// - `process` hace el trabajo real; todo error sale como `StageError` para
///   que el clasificador decida.
#[async_trait]
pub trait StageProcessor: Send + Sync {
    fn stage(&self) -> Stage;

    /// Servicio externo dominante del stage, para resolución de políticas de
    /// reintento ("ollama", "minio", "postgres", "pipeline").
    fn service_name(&self) -> &str {
        "pipeline"
    }

    fn context_fingerprint(&self, ctx: &ProcessingContext) -> serde_json::Value;

    async fn process(&self, ctx: &mut ProcessingContext) -> Result<StageSuccess, StageError>;
}

/// Motor de ejecución con idempotencia y retry clasificado.
pub struct PipelineEngine {
    completion: Arc<dyn CompletionStore>,
    errors: Arc<dyn ErrorLog>,
    policies: Arc<dyn RetryPolicySource>,
    scheduler: Option<Arc<dyn RetryScheduler>>,
    collector: Arc<PerformanceCollector>,
}

impl PipelineEngine {
    pub fn new(completion: Arc<dyn CompletionStore>,
               errors: Arc<dyn ErrorLog>,
               policies: Arc<dyn RetryPolicySource>,
               collector: Arc<PerformanceCollector>)
               -> Self {
        Self { completion,
               errors,
               policies,
               scheduler: None,
               collector }
    }

    /// Conecta el agendador de reintentos en background. Sin scheduler, el
    /// fallo transitorio se reintenta una vez in-line tras `base_delay`.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn RetryScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn collector(&self) -> &Arc<PerformanceCollector> {
        &self.collector
    }

    /// Hash de contexto del stage: versión del pipeline + nombre del stage +
    /// subset declarado por el procesador.
    fn data_hash(&self, processor: &dyn StageProcessor, ctx: &ProcessingContext) -> String {
        let fp = json!({
            "pipeline_version": PIPELINE_VERSION,
            "stage": processor.stage().as_str(),
            "fields": processor.context_fingerprint(ctx),
        });
        compute_context_hash(&fp)
    }

    /// Ejecuta un stage con el contrato completo de `safe_process`.
    pub async fn safe_process(&self, processor: &dyn StageProcessor, ctx: &mut ProcessingContext) -> ProcessingResult {
        let stage = processor.stage();
        let attempt = ctx.retry_attempt;
        let corr = correlation_id(&ctx.request_id, stage.as_str(), attempt);
        let data_hash = self.data_hash(processor, ctx);

        // 1. Gate de idempotencia: marcador previo con el mismo hash ⇒ skip.
        //    Un fallo del store no bloquea la corrida (re-ejecutar es seguro).
        if !ctx.force {
            match self.completion.is_completed(ctx.document_id, stage, &data_hash).await {
                Ok(true) => {
                    debug!("safe_process: skip {} doc={} (marker hit)", stage, ctx.document_id);
                    return ProcessingResult::skipped_completed(&corr, attempt);
                }
                Ok(false) => {}
                Err(e) => warn!("safe_process: marker check failed for {stage}: {e}; running stage"),
            }
        }

        // 2. Ejecución medida.
        let started = Instant::now();
        let run = processor.process(ctx).await;
        let elapsed = started.elapsed();
        self.collector.record_stage(stage.as_str(), elapsed);

        match run {
            Ok(success) => self.finish_success(stage, ctx, success, &data_hash, &corr, attempt, elapsed.as_millis() as u64)
                               .await,
            Err(err) => self.handle_failure(processor, stage, ctx, err, &data_hash, &corr, attempt, elapsed.as_millis() as u64)
                            .await,
        }
    }

    async fn finish_success(&self,
                            stage: Stage,
                            ctx: &ProcessingContext,
                            success: StageSuccess,
                            data_hash: &str,
                            corr: &str,
                            attempt: u32,
                            elapsed_ms: u64)
                            -> ProcessingResult {
        // 3. Marcador durable (ON CONFLICT DO UPDATE en la impl Postgres).
        if let Err(e) = self.completion.set_marker(ctx.document_id, stage, data_hash).await {
            // El stage terminó: reportarlo como éxito pero dejar rastro; la
            // próxima corrida re-ejecutará por ausencia de marcador.
            warn!("safe_process: marker upsert failed for {stage}: {e}");
        }

        // 4. Si esta corrida era un reintento, resolver la fila de error.
        if let Some(error_id) = ctx.pipeline_error_id {
            if let Err(e) = self.errors.set_status(error_id, ErrorStatus::Resolved).await {
                warn!("safe_process: could not resolve pipeline_error {error_id}: {e}");
            }
        }

        let (status, data) = match success {
            StageSuccess::Done(data) => (ProcessingStatus::Completed, data),
            StageSuccess::SkippedDuplicate(data) => (ProcessingStatus::SkippedDuplicate, data),
        };
        ProcessingResult { status,
                           data,
                           processing_time_ms: elapsed_ms,
                           correlation_id: corr.to_string(),
                           retry_attempt: attempt,
                           error: None,
                           error_message: None,
                           next_attempt: None }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_failure(&self,
                            processor: &dyn StageProcessor,
                            stage: Stage,
                            ctx: &mut ProcessingContext,
                            err: StageError,
                            data_hash: &str,
                            corr: &str,
                            attempt: u32,
                            elapsed_ms: u64)
                            -> ProcessingResult {
        let classification = classify_error(&err);
        if classification.error_category == ErrorCategory::Unknown {
            error!("safe_process: UNKNOWN error in {} doc={} attempt={}: {err} (treated as permanent)",
                   stage, ctx.document_id, attempt);
        }

        let policy = self.policies
                         .resolve(processor.service_name(), stage.as_str())
                         .await
                         .unwrap_or_else(|e| {
                             warn!("safe_process: policy resolution failed ({e}); using defaults");
                             RetryPolicy::default()
                         });

        let transient = classification.error_category == ErrorCategory::Transient;
        let attempts_remaining = attempt < policy.max_attempts;

        if transient && attempts_remaining {
            let next_attempt = attempt + 1;
            let next_corr = correlation_id(&ctx.request_id, stage.as_str(), next_attempt);
            let error_id = self.log_error(ctx, stage, &classification.error_type, classification.error_category, &err, corr, next_attempt, ErrorStatus::Retrying)
                               .await;

            if let (Some(scheduler), Some(error_id)) = (self.scheduler.as_ref(), error_id) {
                scheduler.schedule(RetryRequest { document_id: ctx.document_id,
                                                 stage,
                                                 attempt: next_attempt,
                                                 policy,
                                                 correlation_id: next_corr.clone(),
                                                 error_id })
                         .await;
                return ProcessingResult { status: ProcessingStatus::Retrying,
                                          data: json!({"correlation_id": next_corr, "next_attempt": next_attempt}),
                                          processing_time_ms: elapsed_ms,
                                          correlation_id: corr.to_string(),
                                          retry_attempt: attempt,
                                          error: Some(classification),
                                          error_message: Some(err.to_string()),
                                          next_attempt: Some(next_attempt) };
            }

            // Fallback sin orquestador: dormir base_delay y reintentar una vez
            // in-line.
            warn!("safe_process: no retry scheduler; inline retry of {} doc={} in {:.1}s",
                  stage,
                  ctx.document_id,
                  policy.base_delay_seconds);
            tokio::time::sleep(std::time::Duration::from_secs_f64(policy.base_delay_seconds)).await;
            ctx.retry_attempt = next_attempt;
            let retry_started = Instant::now();
            match processor.process(ctx).await {
                Ok(success) => {
                    if let Some(error_id) = error_id {
                        let _ = self.errors.set_status(error_id, ErrorStatus::Resolved).await;
                    }
                    return self.finish_success(stage, ctx, success, data_hash, &next_corr, next_attempt, retry_started.elapsed().as_millis() as u64)
                               .await;
                }
                Err(retry_err) => {
                    if let Some(error_id) = error_id {
                        let _ = self.errors.set_status(error_id, ErrorStatus::Failed).await;
                    }
                    let cls = classify_error(&retry_err);
                    return ProcessingResult { status: ProcessingStatus::Failed,
                                              data: serde_json::Value::Null,
                                              processing_time_ms: retry_started.elapsed().as_millis() as u64,
                                              correlation_id: next_corr,
                                              retry_attempt: next_attempt,
                                              error: Some(cls),
                                              error_message: Some(retry_err.to_string()),
                                              next_attempt: None };
                }
            }
        }

        // Permanente, desconocido, o intentos agotados.
        let _ = self.log_error(ctx, stage, &classification.error_type, classification.error_category, &err, corr, attempt, ErrorStatus::Failed)
                    .await;
        ProcessingResult { status: ProcessingStatus::Failed,
                           data: serde_json::Value::Null,
                           processing_time_ms: elapsed_ms,
                           correlation_id: corr.to_string(),
                           retry_attempt: attempt,
                           error: Some(classification),
                           error_message: Some(err.to_string()),
                           next_attempt: None }
    }

    #[allow(clippy::too_many_arguments)]
    async fn log_error(&self,
                       ctx: &ProcessingContext,
                       stage: Stage,
                       error_type: &str,
                       category: ErrorCategory,
                       err: &StageError,
                       corr: &str,
                       attempt: u32,
                       status: ErrorStatus)
                       -> Option<Uuid> {
        let record = PipelineErrorRecord { id: Uuid::new_v4(),
                                           document_id: ctx.document_id,
                                           stage,
                                           error_category: category,
                                           error_type: error_type.to_string(),
                                           message: err.to_string(),
                                           context: json!({
                                               "request_id": ctx.request_id,
                                               "file_path": ctx.file_path.display().to_string(),
                                               "original_filename": ctx.original_filename,
                                           }),
                                           correlation_id: corr.to_string(),
                                           attempt,
                                           status,
                                           created_at: Utc::now(),
                                           resolved_at: None };
        match self.errors.record(record).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!("safe_process: could not persist pipeline_error for {stage}: {e}");
                None
            }
        }
    }
}
