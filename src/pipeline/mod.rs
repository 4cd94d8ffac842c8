//! Orquestación del pipeline completo y reintentos en background.

mod master;
mod retry_worker;

pub use master::{MasterPipeline, PipelineRunSummary};
pub use retry_worker::RetryWorker;
