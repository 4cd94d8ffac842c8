//! Marcadores de completitud de stage en `krai_system.stage_completion_markers`.
//!
//! Upsert con `ON CONFLICT (document_id, stage_name) DO UPDATE`: seguro bajo
//! llamadas concurrentes (el último hash gana).
use async_trait::async_trait;
use log::debug;
use sqlx::PgPool;
use uuid::Uuid;

use krai_core::{CompletionStore, Stage, StageError};

use crate::error::{with_retry, PersistenceError};

pub struct PgCompletionStore {
    pool: PgPool,
}

impl PgCompletionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CompletionStore for PgCompletionStore {
    async fn is_completed(&self, document_id: Uuid, stage: Stage, data_hash: &str) -> Result<bool, StageError> {
        // Lectura del gate de idempotencia con retry corto: un micro-corte
        // acá no debe tumbar todo el stage.
        let row: Option<String> = with_retry(|| async move {
                                      sqlx::query_scalar("SELECT data_hash FROM krai_system.stage_completion_markers \
                                                          WHERE document_id = $1 AND stage_name = $2")
                                          .bind(document_id)
                                          .bind(stage.as_str())
                                          .fetch_optional(&self.pool)
                                          .await
                                          .map_err(PersistenceError::from)
                                  }).await
                                    .map_err(StageError::from)?;
        Ok(row.map(|h| h.trim() == data_hash).unwrap_or(false))
    }

    async fn set_marker(&self, document_id: Uuid, stage: Stage, data_hash: &str) -> Result<(), StageError> {
        with_retry(|| async move {
            sqlx::query("INSERT INTO krai_system.stage_completion_markers (document_id, stage_name, data_hash, completed_at) \
                         VALUES ($1, $2, $3, now()) \
                         ON CONFLICT (document_id, stage_name) \
                         DO UPDATE SET data_hash = EXCLUDED.data_hash, completed_at = now()")
                .bind(document_id)
                .bind(stage.as_str())
                .bind(data_hash)
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(PersistenceError::from)
        }).await
          .map_err(StageError::from)?;
        debug!("marker set: doc={document_id} stage={stage}");
        Ok(())
    }

    async fn clear_document(&self, document_id: Uuid) -> Result<(), StageError> {
        sqlx::query("DELETE FROM krai_system.stage_completion_markers WHERE document_id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StageError::from(PersistenceError::from(e)))?;
        Ok(())
    }
}
