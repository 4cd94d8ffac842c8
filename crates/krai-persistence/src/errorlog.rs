//! Registro de errores del pipeline en `krai_system.pipeline_errors`.
//!
//! El orquestador de retries lee SIEMPRE de `krai_system.pipeline_errors`
//! (no de `krai_intelligence`): es la única fuente del contexto de reintento.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use krai_core::classify::ErrorCategory;
use krai_core::{ErrorLog, ErrorStatus, PipelineErrorRecord, Stage, StageError};

use crate::error::PersistenceError;

pub struct PgErrorLog {
    pool: PgPool,
}

impl PgErrorLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_category(s: &str) -> ErrorCategory {
        match s {
            "transient" => ErrorCategory::Transient,
            "permanent" => ErrorCategory::Permanent,
            _ => ErrorCategory::Unknown,
        }
    }

    fn parse_status(s: &str) -> ErrorStatus {
        match s {
            "retrying" => ErrorStatus::Retrying,
            "failed" => ErrorStatus::Failed,
            "resolved" => ErrorStatus::Resolved,
            _ => ErrorStatus::Pending,
        }
    }
}

#[async_trait]
impl ErrorLog for PgErrorLog {
    async fn record(&self, record: PipelineErrorRecord) -> Result<Uuid, StageError> {
        // context serializado como string + cast ::jsonb (contrato del driver).
        let context = serde_json::to_string(&record.context).map_err(|e| StageError::Internal(e.to_string()))?;
        sqlx::query("INSERT INTO krai_system.pipeline_errors \
                     (id, document_id, stage_name, error_category, error_type, message, context, correlation_id, attempt, status, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7::jsonb, $8, $9, $10, $11)")
            .bind(record.id)
            .bind(record.document_id)
            .bind(record.stage.as_str())
            .bind(record.error_category.as_str())
            .bind(&record.error_type)
            .bind(&record.message)
            .bind(context)
            .bind(&record.correlation_id)
            .bind(record.attempt as i32)
            .bind(record.status.as_str())
            .bind(record.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StageError::from(PersistenceError::from(e)))?;
        Ok(record.id)
    }

    async fn set_status(&self, error_id: Uuid, status: ErrorStatus) -> Result<(), StageError> {
        sqlx::query("UPDATE krai_system.pipeline_errors \
                     SET status = $2, resolved_at = CASE WHEN $2 = 'resolved' THEN now() ELSE resolved_at END \
                     WHERE id = $1")
            .bind(error_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StageError::from(PersistenceError::from(e)))?;
        Ok(())
    }

    async fn fetch(&self, error_id: Uuid) -> Result<Option<PipelineErrorRecord>, StageError> {
        let row = sqlx::query("SELECT id, document_id, stage_name, error_category, error_type, message, context, \
                                      correlation_id, attempt, status, created_at, resolved_at \
                               FROM krai_system.pipeline_errors WHERE id = $1")
            .bind(error_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StageError::from(PersistenceError::from(e)))?;

        let Some(row) = row else { return Ok(None) };

        let stage_name: String = row.try_get("stage_name").map_err(db_err)?;
        let stage = Stage::parse(&stage_name).ok_or_else(|| StageError::Internal(format!("unknown stage in pipeline_errors: {stage_name}")))?;
        let category: String = row.try_get("error_category").map_err(db_err)?;
        let status: String = row.try_get("status").map_err(db_err)?;
        let attempt: i32 = row.try_get("attempt").map_err(db_err)?;
        let context: serde_json::Value = row.try_get("context").map_err(db_err)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(db_err)?;
        let resolved_at: Option<DateTime<Utc>> = row.try_get("resolved_at").map_err(db_err)?;

        Ok(Some(PipelineErrorRecord { id: row.try_get("id").map_err(db_err)?,
                                      document_id: row.try_get("document_id").map_err(db_err)?,
                                      stage,
                                      error_category: Self::parse_category(&category),
                                      error_type: row.try_get("error_type").map_err(db_err)?,
                                      message: row.try_get("message").map_err(db_err)?,
                                      context,
                                      correlation_id: row.try_get("correlation_id").map_err(db_err)?,
                                      attempt: attempt.max(0) as u32,
                                      status: Self::parse_status(&status),
                                      created_at,
                                      resolved_at }))
    }
}

fn db_err(e: sqlx::Error) -> StageError {
    StageError::from(PersistenceError::from(e))
}
