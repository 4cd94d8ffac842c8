//! Contrato del agendador de reintentos en background.
//!
//! `safe_process` entrega un `RetryRequest` cuando clasifica un fallo como
//! transitorio con intentos restantes; la implementación real (tarea tokio +
//! advisory lock Postgres) vive en el binario. La ausencia de scheduler
//! habilita el fallback síncrono (sleep + un reintento in-line).
use async_trait::async_trait;
use uuid::Uuid;

use crate::retry::RetryPolicy;
use crate::stage::Stage;

#[derive(Debug, Clone)]
pub struct RetryRequest {
    pub document_id: Uuid,
    pub stage: Stage,
    /// Intento que ejecutará el worker (ya incrementado).
    pub attempt: u32,
    pub policy: RetryPolicy,
    /// Correlation id fresco para ese intento.
    pub correlation_id: String,
    /// Fila de pipeline_errors con el contexto del reintento.
    pub error_id: Uuid,
}

#[async_trait]
pub trait RetryScheduler: Send + Sync {
    /// Agenda el reintento; nunca bloquea la corrida actual.
    async fn schedule(&self, request: RetryRequest);
}
