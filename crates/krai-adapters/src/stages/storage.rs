//! S6 — Storage: sube imágenes al object store (clave = sha256) y persiste
//! las filas en DB.
//!
//! - HEAD antes de PUT: contenido idéntico nunca se re-sube.
//! - El Master Pipeline intenta este stage incluso si un stage posterior
//!   falló antes: las imágenes extraídas no se pierden.
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use log::info;
use serde_json::json;

use krai_core::{ProcessingContext, Stage, StageError, StageProcessor, StageSuccess};
use krai_persistence::ContentRepository;
use krai_providers::ObjectStorage;

use super::image::{ImageStage, ImageStageConfig};

pub struct StorageStage {
    content: ContentRepository,
    store: Arc<dyn ObjectStorage>,
}

impl StorageStage {
    pub fn new(content: ContentRepository, store: Arc<dyn ObjectStorage>) -> Self {
        Self { content,
               store }
    }
}

#[async_trait]
impl StageProcessor for StorageStage {
    fn stage(&self) -> Stage {
        Stage::Storage
    }

    fn service_name(&self) -> &str {
        "minio"
    }

    fn context_fingerprint(&self, ctx: &ProcessingContext) -> serde_json::Value {
        let hashes: Vec<&str> = ctx.images.iter().map(|i| i.sha256.as_str()).collect();
        json!({
            "file_hash": ctx.file_hash,
            "image_hashes": hashes,
        })
    }

    async fn process(&self, ctx: &mut ProcessingContext) -> Result<StageSuccess, StageError> {
        // Re-hidratación para reintentos standalone: los bytes viven sólo en
        // el contexto, así que un retry sin imágenes re-extrae del PDF (sin
        // OCR/visión; esos campos ya están en DB si el stage 3 corrió).
        if ctx.images.is_empty() && ctx.file_path.exists() {
            ctx.images = ImageStage::extract_images(ctx, &ImageStageConfig::default())?;
        }

        let images = std::mem::take(&mut ctx.images);
        let mut uploaded = 0usize;
        let mut skipped = 0usize;
        for image in &images {
            ctx.check_cancelled()?;
            let key = image.storage_key().to_string();
            // Dedupe content-addressed: HEAD primero.
            if self.store.exists(&key).await.map_err(StageError::from)? {
                skipped += 1;
            } else {
                self.store
                    .put(&key, Bytes::from(image.data.clone()), &image.mime)
                    .await
                    .map_err(StageError::from)?;
                uploaded += 1;
            }
            let url = self.store.public_url(&key);
            self.content.upsert_image(image, &url).await.map_err(StageError::from)?;
        }
        ctx.images = images;

        info!("storage: doc={} uploaded={} deduped={}", ctx.document_id, uploaded, skipped);
        Ok(StageSuccess::Done(json!({
            "uploaded": uploaded,
            "skipped_existing": skipped,
            "rows": ctx.images.len(),
        })))
    }
}
