//! Registro auditable de errores del pipeline.
//!
//! Cada fallo clasificado produce una fila (implementación Postgres en
//! `krai_system.pipeline_errors`); el orquestador de retries consume esas
//! filas para reconstruir el contexto del reintento.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

use crate::classify::ErrorCategory;
use crate::errors::StageError;
use crate::stage::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStatus {
    Pending,
    Retrying,
    Failed,
    Resolved,
}

impl ErrorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::Pending => "pending",
            ErrorStatus::Retrying => "retrying",
            ErrorStatus::Failed => "failed",
            ErrorStatus::Resolved => "resolved",
        }
    }
}

/// Fila lógica de `pipeline_errors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineErrorRecord {
    pub id: Uuid,
    pub document_id: Uuid,
    pub stage: Stage,
    pub error_category: ErrorCategory,
    pub error_type: String,
    pub message: String,
    /// Contexto serializado (subset del ProcessingContext para el retry).
    pub context: serde_json::Value,
    pub correlation_id: String,
    pub attempt: u32,
    pub status: ErrorStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ErrorLog: Send + Sync {
    /// Inserta un registro nuevo y devuelve su id.
    async fn record(&self, record: PipelineErrorRecord) -> Result<Uuid, StageError>;

    /// Transición de estado (retrying → resolved/failed, etc.).
    async fn set_status(&self, error_id: Uuid, status: ErrorStatus) -> Result<(), StageError>;

    /// Recupera un registro por id (contexto del retry en background).
    async fn fetch(&self, error_id: Uuid) -> Result<Option<PipelineErrorRecord>, StageError>;
}

/// Implementación en memoria, para tests y corridas sin DB.
#[derive(Default)]
pub struct InMemoryErrorLog {
    inner: Mutex<Vec<PipelineErrorRecord>>,
}

impl InMemoryErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<PipelineErrorRecord> {
        self.inner.lock().expect("errorlog lock").clone()
    }
}

#[async_trait]
impl ErrorLog for InMemoryErrorLog {
    async fn record(&self, record: PipelineErrorRecord) -> Result<Uuid, StageError> {
        let id = record.id;
        self.inner.lock().map_err(|e| StageError::Internal(e.to_string()))?.push(record);
        Ok(id)
    }

    async fn set_status(&self, error_id: Uuid, status: ErrorStatus) -> Result<(), StageError> {
        let mut guard = self.inner.lock().map_err(|e| StageError::Internal(e.to_string()))?;
        if let Some(r) = guard.iter_mut().find(|r| r.id == error_id) {
            r.status = status;
            if status == ErrorStatus::Resolved {
                r.resolved_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn fetch(&self, error_id: Uuid) -> Result<Option<PipelineErrorRecord>, StageError> {
        let guard = self.inner.lock().map_err(|e| StageError::Internal(e.to_string()))?;
        Ok(guard.iter().find(|r| r.id == error_id).cloned())
    }
}
