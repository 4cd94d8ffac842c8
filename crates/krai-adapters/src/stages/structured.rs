//! S10 — Structured extraction (opcional): persiste las tablas detectadas en
//! `krai_intelligence.structured_tables` cuando el despliegue la tiene.
//!
//! La ausencia de la tabla NO es un error del pipeline: el repositorio se
//! auto-deshabilita en el primer 42P01 y este stage reporta `disabled`.
use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use serde_json::json;

use krai_core::{ProcessingContext, Stage, StageError, StageProcessor, StageSuccess};
use krai_persistence::IntelligenceRepository;

pub struct StructuredStage {
    intelligence: Arc<IntelligenceRepository>,
}

impl StructuredStage {
    pub fn new(intelligence: Arc<IntelligenceRepository>) -> Self {
        Self { intelligence }
    }
}

#[async_trait]
impl StageProcessor for StructuredStage {
    fn stage(&self) -> Stage {
        Stage::StructuredExtraction
    }

    fn service_name(&self) -> &str {
        "postgres"
    }

    fn context_fingerprint(&self, ctx: &ProcessingContext) -> serde_json::Value {
        json!({
            "file_hash": ctx.file_hash,
            "table_count": ctx.tables.len(),
        })
    }

    async fn process(&self, ctx: &mut ProcessingContext) -> Result<StageSuccess, StageError> {
        let mut stored = 0usize;
        let mut disabled = false;
        for table in &ctx.tables {
            match self.intelligence
                      .insert_structured_table(ctx.document_id, table.page_number, &table.markdown, &table.context)
                      .await
                      .map_err(StageError::from)?
            {
                Some(_) => stored += 1,
                None => {
                    disabled = true;
                    break;
                }
            }
        }
        info!("structured: doc={} stored={} disabled={}", ctx.document_id, stored, disabled);
        Ok(StageSuccess::Done(json!({
            "tables_stored": stored,
            "feature_disabled": disabled,
        })))
    }
}
