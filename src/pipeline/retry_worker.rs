//! Worker de reintentos en background.
//!
//! `safe_process` agenda acá los fallos transitorios; el worker:
//! 1. Deriva la clave determinista de advisory lock de (doc_id, stage) y hace
//!    `pg_try_advisory_lock`: si otro proceso ya reintenta ese par, se retira.
//! 2. Duerme el backoff exponencial con jitter de la política.
//! 3. Recupera el contexto desde `krai_system.pipeline_errors` y re-ejecuta
//!    el stage vía `MasterPipeline::run_single_stage`.
//! 4. Cierra la fila de error (resolved/failed) y SIEMPRE libera el lock.
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use sqlx::PgPool;
use tokio::sync::OnceCell;

use krai_core::{advisory_lock_key, backoff_delay, ErrorLog, ErrorStatus, ProcessingStatus, RetryRequest,
                RetryScheduler, StageError};
use krai_persistence::{AdvisoryLock, PgErrorLog};

use super::master::MasterPipeline;

pub struct RetryWorker {
    pool: PgPool,
    errors: Arc<PgErrorLog>,
    /// Se enlaza después de construir el pipeline (dependencia circular
    /// engine → scheduler → pipeline → engine).
    pipeline: OnceCell<Arc<MasterPipeline>>,
}

impl RetryWorker {
    pub fn new(pool: PgPool, errors: Arc<PgErrorLog>) -> Self {
        Self { pool,
               errors,
               pipeline: OnceCell::new() }
    }

    pub fn bind(&self, pipeline: Arc<MasterPipeline>) {
        if self.pipeline.set(pipeline).is_err() {
            warn!("retry worker already bound to a pipeline");
        }
    }
}

#[async_trait]
impl RetryScheduler for RetryWorker {
    async fn schedule(&self, request: RetryRequest) {
        let Some(pipeline) = self.pipeline.get().cloned() else {
            warn!("retry worker not bound; dropping retry for doc={} stage={}",
                  request.document_id,
                  request.stage);
            return;
        };
        let pool = self.pool.clone();
        let errors = Arc::clone(&self.errors);
        tokio::spawn(async move {
            run_retry(pool, errors, pipeline, request).await;
        });
    }
}

async fn run_retry(pool: PgPool, errors: Arc<PgErrorLog>, pipeline: Arc<MasterPipeline>, request: RetryRequest) {
    // Single-flight entre procesos: la clave es idéntica en cualquier worker
    // (sha256 de "doc:stage", primeros 8 bytes, mod 2^63−1).
    let key = advisory_lock_key(request.document_id, request.stage.as_str());
    let lock = match AdvisoryLock::try_acquire(&pool, key).await {
        Ok(Some(lock)) => lock,
        Ok(None) => {
            debug!("retry: another worker holds lock {key} for doc={} stage={}",
                   request.document_id,
                   request.stage);
            return;
        }
        Err(e) => {
            warn!("retry: lock acquisition failed for doc={} stage={}: {e}",
                  request.document_id,
                  request.stage);
            return;
        }
    };

    // Todo el trabajo bajo lock; la liberación ocurre en TODOS los caminos
    // (equivalente a try/finally).
    let outcome = attempt_under_lock(&errors, &pipeline, &request).await;
    if let Err(e) = lock.release().await {
        warn!("retry: lock release failed for key {key}: {e}");
    }
    if let Err(e) = outcome {
        warn!("retry: attempt errored for doc={} stage={}: {e}", request.document_id, request.stage);
        let _ = errors.set_status(request.error_id, ErrorStatus::Failed).await;
    }
}

async fn attempt_under_lock(errors: &Arc<PgErrorLog>, pipeline: &Arc<MasterPipeline>, request: &RetryRequest) -> Result<(), StageError> {
    // Backoff del intento N: base·mult^(N−2) (el primer reintento espera el
    // delay base).
    let delay = backoff_delay(&request.policy, request.attempt.saturating_sub(1));
    debug!("retry: doc={} stage={} attempt={} sleeping {:.1}s",
           request.document_id,
           request.stage,
           request.attempt,
           delay.as_secs_f64());
    tokio::time::sleep(delay).await;

    // Contexto del reintento: SIEMPRE desde krai_system.pipeline_errors.
    let record = errors.fetch(request.error_id).await?;
    if record.as_ref().map(|r| r.status) != Some(ErrorStatus::Retrying) {
        debug!("retry: error {} no longer retrying; skipping", request.error_id);
        return Ok(());
    }

    let result = pipeline.run_single_stage(request.stage,
                                           request.document_id,
                                           false,
                                           request.attempt,
                                           Some(request.error_id))
                         .await?;

    match result.status {
        ProcessingStatus::Completed | ProcessingStatus::SkippedCompleted | ProcessingStatus::SkippedDuplicate => {
            // safe_process ya marcó la fila como resolved vía el
            // pipeline_error_id del contexto.
            info!("retry: doc={} stage={} attempt={} succeeded",
                  request.document_id,
                  request.stage,
                  request.attempt);
        }
        ProcessingStatus::Retrying => {
            // Otra ronda quedó agendada con una fila nueva; la actual se
            // cierra como superseded.
            errors.set_status(request.error_id, ErrorStatus::Resolved).await?;
        }
        ProcessingStatus::Failed => {
            errors.set_status(request.error_id, ErrorStatus::Failed).await?;
            info!("retry: doc={} stage={} attempt={} exhausted/failed",
                  request.document_id,
                  request.stage,
                  request.attempt);
        }
    }
    Ok(())
}
