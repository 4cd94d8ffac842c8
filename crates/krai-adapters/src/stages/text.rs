//! S2 — Text: extracción de texto por página + chunking jerárquico.
use async_trait::async_trait;
use log::info;
use serde_json::json;

use krai_core::{ProcessingContext, Stage, StageError, StageProcessor, StageSuccess};
use krai_persistence::IntelligenceRepository;

use crate::chunking::{chunk_document, detect_tables, ChunkerConfig};
use crate::pdf::PdfFile;

pub struct TextStage {
    intelligence: std::sync::Arc<IntelligenceRepository>,
    chunker: ChunkerConfig,
}

impl TextStage {
    pub fn new(intelligence: std::sync::Arc<IntelligenceRepository>, chunker: ChunkerConfig) -> Self {
        Self { intelligence,
               chunker }
    }
}

#[async_trait]
impl StageProcessor for TextStage {
    fn stage(&self) -> Stage {
        Stage::Text
    }

    fn service_name(&self) -> &str {
        "postgres"
    }

    fn context_fingerprint(&self, ctx: &ProcessingContext) -> serde_json::Value {
        json!({
            "file_hash": ctx.file_hash,
            "hierarchical": self.chunker.hierarchical,
            "allow_short": self.chunker.allow_short,
            "target": [self.chunker.target_min, self.chunker.target_max],
        })
    }

    async fn process(&self, ctx: &mut ProcessingContext) -> Result<StageSuccess, StageError> {
        let pdf = PdfFile::open(&ctx.file_path)?;
        let page_count = pdf.page_count() as i32;

        // 1. Texto por página (1-based), con punto de cancelación por página
        //    y yield cooperativo en documentos grandes.
        for page in 1..=page_count {
            ctx.check_cancelled()?;
            let text = pdf.page_text(page as u32);
            if !text.trim().is_empty() {
                ctx.page_texts.insert(page, text);
            }
            if page % 25 == 0 {
                tokio::task::yield_now().await;
            }
        }

        // 2. Chunking jerárquico + detección de tablas para stages
        //    posteriores (embedding/structured).
        let chunks = chunk_document(ctx.document_id, &ctx.page_texts, &self.chunker);
        ctx.tables = detect_tables(&ctx.page_texts);

        // 3. Persistencia al final del stage (nunca filas a medias).
        self.intelligence.insert_chunks(&chunks).await.map_err(StageError::from)?;
        info!("text: doc={} pages={} chunks={} tables={}",
              ctx.document_id,
              ctx.page_texts.len(),
              chunks.len(),
              ctx.tables.len());
        ctx.chunks = chunks;

        Ok(StageSuccess::Done(json!({
            "pages_with_text": ctx.page_texts.len(),
            "chunk_count": ctx.chunks.len(),
            "table_count": ctx.tables.len(),
        })))
    }
}
