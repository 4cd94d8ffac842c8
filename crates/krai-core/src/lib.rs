//! krai-core: contratos neutrales del pipeline de procesamiento documental
//!
//! Propósito:
//! - Proveer los contratos del pipeline (contexto, resultado, trait de stage)
//!   y la orquestación `safe_process`: idempotencia → ejecución →
//!   clasificación de errores → retry → métricas.
//! - Mantener el determinismo mediante hashes de contexto (JSON canónico +
//!   SHA-256) y claves de advisory lock derivadas de (document_id, stage).
//!
//! Componentes principales:
//! - `stage`: etapas canónicas del pipeline y su estado persistible.
//! - `context`: `ProcessingContext`, acumulador tipado por documento.
//! - `result`: `ProcessingResult` con status, timing y correlation id.
//! - `errors` + `classify`: taxonomía de fallos y clasificador determinista.
//! - `retry`: modelo de políticas de reintento y cálculo de backoff.
//! - `idempotency`: hash de contexto y store de marcadores de completitud.
//! - `errorlog`: registro auditable de errores del pipeline.
//! - `engine`: `PipelineEngine` con el envoltorio `safe_process`.
//! - `metrics`: colector de métricas de rendimiento por stage.
//!
//! Re-exports: se exponen símbolos clave para facilitar el uso desde
//! binarios/tests.

pub mod classify;
pub mod constants;
pub mod context;
pub mod engine;
pub mod errorlog;
pub mod errors;
pub mod hashing;
pub mod idempotency;
pub mod metrics;
pub mod result;
pub mod retry;
pub mod scheduler;
pub mod stage;

// Re-exports públicos principales
pub use classify::{classify_error, ErrorCategory, ErrorClassification};
pub use context::{ProcessingContext, TableBlock};
pub use engine::{PipelineEngine, StageProcessor, StageSuccess};
pub use errorlog::{ErrorLog, ErrorStatus, InMemoryErrorLog, PipelineErrorRecord};
pub use errors::StageError;
pub use hashing::{advisory_lock_key, correlation_id, hash_str, hash_value, to_canonical_json};
pub use idempotency::{compute_context_hash, CompletionStore, InMemoryCompletionStore};
pub use metrics::PerformanceCollector;
pub use result::{ProcessingResult, ProcessingStatus};
pub use retry::{backoff_delay, RetryPolicy, RetryPolicySource, StaticRetryPolicies};
pub use scheduler::{RetryRequest, RetryScheduler};
pub use stage::{Stage, StageEntry, StageState};
