//! Orquestación `safe_process` del pipeline.

mod core;

pub use core::{PipelineEngine, StageProcessor, StageSuccess};
