//! Resultado de la ejecución de un stage.
use serde::{Deserialize, Serialize};

use crate::classify::ErrorClassification;

/// Status observable de una invocación vía `safe_process`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// El stage corrió y terminó bien.
    Completed,
    /// Marcador previo con el mismo data_hash: no se re-ejecutó.
    SkippedCompleted,
    /// Dedupe por contenido (subida duplicada).
    SkippedDuplicate,
    /// Fallo transitorio; hay un reintento agendado en background.
    Retrying,
    Failed,
}

/// Resultado neutral devuelto por `PipelineEngine::safe_process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub status: ProcessingStatus,
    /// Salida del stage (shape propio de cada stage; JSON).
    pub data: serde_json::Value,
    /// Duración de la ejecución en milisegundos (0 si se saltó).
    pub processing_time_ms: u64,
    pub correlation_id: String,
    pub retry_attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorClassification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Próximo intento agendado (sólo con status `Retrying`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt: Option<u32>,
}

impl ProcessingResult {
    pub fn skipped_completed(correlation_id: &str, attempt: u32) -> Self {
        ProcessingResult { status: ProcessingStatus::SkippedCompleted,
                           data: serde_json::Value::Null,
                           processing_time_ms: 0,
                           correlation_id: correlation_id.to_string(),
                           retry_attempt: attempt,
                           error: None,
                           error_message: None,
                           next_attempt: None }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status,
                 ProcessingStatus::Completed | ProcessingStatus::SkippedCompleted | ProcessingStatus::SkippedDuplicate)
    }
}
