//! S8 — Search indexing: verifica el payload indexable y publica los
//! baselines de rendimiento.
//!
//! Las escrituras de analytics por consulta se agendan con `tokio::spawn`
//! (nunca bloquear el runtime con un block_on anidado); la búsqueda por
//! similitud vive en `IntelligenceRepository::similarity_search` (pgvector
//! `<=>`).
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use serde_json::json;

use krai_core::{PerformanceCollector, ProcessingContext, Stage, StageError, StageProcessor, StageSuccess};
use krai_persistence::IntelligenceRepository;

pub struct SearchStage {
    intelligence: Arc<IntelligenceRepository>,
    collector: Arc<PerformanceCollector>,
}

impl SearchStage {
    pub fn new(intelligence: Arc<IntelligenceRepository>, collector: Arc<PerformanceCollector>) -> Self {
        Self { intelligence,
               collector }
    }

    /// Registro fire-and-forget de una consulta de búsqueda (la usa la API);
    /// agenda la escritura en el runtime en curso.
    pub fn record_query(intelligence: Arc<IntelligenceRepository>, query: String, duration_ms: u64, result_count: usize, filters: serde_json::Value) {
        tokio::spawn(async move {
            if let Err(e) = intelligence.record_search(&query, duration_ms, result_count, filters).await {
                warn!("search: analytics write failed: {e}");
            }
        });
    }
}

#[async_trait]
impl StageProcessor for SearchStage {
    fn stage(&self) -> Stage {
        Stage::Search
    }

    fn service_name(&self) -> &str {
        "postgres"
    }

    fn context_fingerprint(&self, ctx: &ProcessingContext) -> serde_json::Value {
        json!({"file_hash": ctx.file_hash})
    }

    async fn process(&self, ctx: &mut ProcessingContext) -> Result<StageSuccess, StageError> {
        // Payload indexable: el documento necesita al menos sus embeddings de
        // texto cuando tiene chunks.
        let indexed = self.intelligence
                          .count_embeddings_for_document(ctx.document_id)
                          .await
                          .map_err(StageError::from)?;
        if !ctx.chunks.is_empty() && indexed == 0 {
            return Err(StageError::Validation(format!("document {} has {} chunks but no embeddings indexed",
                                                      ctx.document_id,
                                                      ctx.chunks.len())));
        }

        // Publicar baselines p95 de las métricas calientes acumuladas.
        for summary in self.collector.snapshot() {
            if summary.name.starts_with("stage:") || summary.name.starts_with("db:embeddings") {
                if let Err(e) = self.intelligence
                                    .upsert_performance_baseline(&summary.name, summary.p95_ms, summary.count as u64)
                                    .await
                {
                    warn!("search: baseline upsert failed for {}: {e}", summary.name);
                }
            }
        }

        info!("search: doc={} embeddings_indexed={}", ctx.document_id, indexed);
        Ok(StageSuccess::Done(json!({"embeddings_indexed": indexed})))
    }
}
