//! S7 — Embedding: texto, tablas y embeddings visuales hacia la tabla
//! unificada (vector(768)).
//!
//! - Texto: un embedding por chunk; va a `chunks.embedding` Y a
//!   `unified_embeddings` (source_kind=text_chunk).
//! - Tablas: markdown+contexto embebido como texto (source_kind=table).
//! - Visual: dimensión nativa del modelo ajustada a 768 (pad con ceros o
//!   truncado); la dimensión nativa queda en native_dim/metadata.
//! - Los 500 estilo Ollama por desborde de contexto se manejan en el
//!   proveedor (truncamiento progresivo + límite aprendido), nunca como
//!   reintento ciego.
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use log::{info, warn};
use serde_json::json;
use tokio::sync::Semaphore;
use uuid::Uuid;

use krai_core::constants::{DEFAULT_STAGE_CONCURRENCY, EMBEDDING_DIM};
use krai_core::{ProcessingContext, Stage, StageError, StageProcessor, StageSuccess};
use krai_persistence::IntelligenceRepository;
use krai_providers::{AiService, VisualEmbedder};

pub struct EmbeddingStage {
    intelligence: Arc<IntelligenceRepository>,
    ai: Arc<dyn AiService>,
    visual: Option<Arc<dyn VisualEmbedder>>,
    concurrency: usize,
}

impl EmbeddingStage {
    pub fn new(intelligence: Arc<IntelligenceRepository>, ai: Arc<dyn AiService>, visual: Option<Arc<dyn VisualEmbedder>>) -> Self {
        Self { intelligence,
               ai,
               visual,
               concurrency: DEFAULT_STAGE_CONCURRENCY }
    }

    /// Ajusta un vector a la dimensión fija del store: trunca o rellena con
    /// ceros en el borde, registrando la dimensión nativa aparte.
    pub fn fit_dimension(mut v: Vec<f32>, dim: usize) -> Vec<f32> {
        if v.len() > dim {
            v.truncate(dim);
        } else {
            v.resize(dim, 0.0);
        }
        v
    }
}

#[async_trait]
impl StageProcessor for EmbeddingStage {
    fn stage(&self) -> Stage {
        Stage::Embedding
    }

    fn service_name(&self) -> &str {
        "ollama"
    }

    fn context_fingerprint(&self, ctx: &ProcessingContext) -> serde_json::Value {
        json!({
            "file_hash": ctx.file_hash,
            "model": self.ai.embedding_model(),
            "visual_model": self.visual.as_ref().map(|v| v.model().to_string()),
        })
    }

    async fn process(&self, ctx: &mut ProcessingContext) -> Result<StageSuccess, StageError> {
        // Re-hidratación para reintentos standalone.
        if ctx.chunks.is_empty() {
            ctx.chunks = self.intelligence.fetch_chunks(ctx.document_id).await.map_err(StageError::from)?;
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let model = self.ai.embedding_model().to_string();

        // 1. Chunks de texto, en lote acotado. El primer error corta el
        //    stage (el retry clasificado se encarga del resto).
        let futures: Vec<_> = ctx.chunks
                                 .iter()
                                 .map(|chunk| {
                                     let semaphore = Arc::clone(&semaphore);
                                     let ai = Arc::clone(&self.ai);
                                     let text = chunk.text.clone();
                                     async move {
                                         let _permit = semaphore.acquire().await;
                                         ai.embed_text(&text).await
                                     }
                                 })
                                 .collect();
        let embeddings = join_all(futures).await;

        let mut text_embedded = 0usize;
        for (chunk, result) in ctx.chunks.iter().zip(embeddings) {
            ctx.check_cancelled()?;
            let native = result.map_err(StageError::from)?;
            let fitted = Self::fit_dimension(native, EMBEDDING_DIM);
            self.intelligence
                .store_chunk_embedding(chunk, fitted, &model)
                .await
                .map_err(StageError::from)?;
            text_embedded += 1;
        }

        // 2. Tablas como texto.
        let mut tables_embedded = 0usize;
        for table in &ctx.tables {
            let text = format!("{}\n{}", table.context, table.markdown);
            let native = self.ai.embed_text(&text).await.map_err(StageError::from)?;
            let native_dim = native.len();
            let fitted = Self::fit_dimension(native, EMBEDDING_DIM);
            self.intelligence
                .store_unified_embedding("table",
                                         Uuid::new_v4(),
                                         fitted,
                                         native_dim,
                                         &model,
                                         json!({
                                             "document_id": ctx.document_id,
                                             "page_number": table.page_number,
                                             "context": table.context,
                                         }))
                .await
                .map_err(StageError::from)?;
            tables_embedded += 1;
        }

        // 3. Embeddings visuales opcionales; fallos por imagen degradan.
        let mut images_embedded = 0usize;
        if let Some(visual) = &self.visual {
            for image in &ctx.images {
                ctx.check_cancelled()?;
                match visual.embed_image(&image.data).await {
                    Ok(native) => {
                        let native_dim = native.len();
                        let fitted = Self::fit_dimension(native, EMBEDDING_DIM);
                        self.intelligence
                            .store_unified_embedding("image",
                                                     image.id,
                                                     fitted,
                                                     native_dim,
                                                     visual.model(),
                                                     json!({
                                                         "document_id": ctx.document_id,
                                                         "page_number": image.page_number,
                                                         "native_dim": native_dim,
                                                         "stored_dim": EMBEDDING_DIM,
                                                     }))
                            .await
                            .map_err(StageError::from)?;
                        images_embedded += 1;
                    }
                    Err(e) => warn!("embedding: visual embed failed for image p{}: {e}", image.page_number),
                }
            }
        }

        info!("embedding: doc={} text={} tables={} images={}",
              ctx.document_id,
              text_embedded,
              tables_embedded,
              images_embedded);

        Ok(StageSuccess::Done(json!({
            "text_embedded": text_embedded,
            "tables_embedded": tables_embedded,
            "images_embedded": images_embedded,
            "model": model,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_dimension_pads_with_zeros() {
        let v = EmbeddingStage::fit_dimension(vec![1.0, 2.0], 5);
        assert_eq!(v, vec![1.0, 2.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn fit_dimension_truncates() {
        let v = EmbeddingStage::fit_dimension((0..1000).map(|i| i as f32).collect(), EMBEDDING_DIM);
        assert_eq!(v.len(), EMBEDDING_DIM);
        assert_eq!(v[767], 767.0);
    }

    #[test]
    fn fit_dimension_identity_when_exact() {
        let v: Vec<f32> = (0..EMBEDDING_DIM).map(|i| i as f32).collect();
        assert_eq!(EmbeddingStage::fit_dimension(v.clone(), EMBEDDING_DIM), v);
    }
}
