//! S3 — Image: extracción de imágenes embebidas, filtrado, OCR y descripción
//! por visión. Sin escrituras a DB: el stage de storage persiste.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;

use krai_core::constants::{DEFAULT_STAGE_CONCURRENCY, MAX_IMAGE_SIZE, MIN_IMAGE_SIZE};
use krai_core::{ProcessingContext, Stage, StageError, StageProcessor, StageSuccess};
use krai_domain::ExtractedImage;
use krai_providers::{AiService, OcrEngine};

use crate::pdf::PdfFile;

#[derive(Debug, Clone)]
pub struct ImageStageConfig {
    pub min_size: u32,
    pub max_size: u32,
    pub ocr_enabled: bool,
    pub vision_enabled: bool,
    pub concurrency: usize,
}

impl Default for ImageStageConfig {
    fn default() -> Self {
        ImageStageConfig { min_size: MIN_IMAGE_SIZE,
                           max_size: MAX_IMAGE_SIZE,
                           ocr_enabled: true,
                           vision_enabled: true,
                           concurrency: DEFAULT_STAGE_CONCURRENCY }
    }
}

pub struct ImageStage {
    ocr: Option<Arc<dyn OcrEngine>>,
    vision: Option<Arc<dyn AiService>>,
    config: ImageStageConfig,
}

impl ImageStage {
    pub fn new(ocr: Option<Arc<dyn OcrEngine>>, vision: Option<Arc<dyn AiService>>, config: ImageStageConfig) -> Self {
        Self { ocr,
               vision,
               config }
    }

    /// Extracción pura (sin OCR/visión); también la usa el stage de storage
    /// para re-hidratar bytes en reintentos standalone.
    pub fn extract_images(ctx: &ProcessingContext, config: &ImageStageConfig) -> Result<Vec<ExtractedImage>, StageError> {
        let pdf = PdfFile::open(&ctx.file_path)?;
        let page_count = pdf.page_count() as u32;

        let mut images: Vec<ExtractedImage> = Vec::new();
        let mut pages_by_hash: HashMap<String, Vec<i32>> = HashMap::new();

        for page in 1..=page_count {
            ctx.check_cancelled()?;
            for raw in pdf.page_images(page) {
                // Ventana de tamaños: descartar miniaturas y escaneos absurdos.
                if raw.width < config.min_size || raw.height < config.min_size {
                    continue;
                }
                if raw.width > config.max_size || raw.height > config.max_size {
                    continue;
                }
                // Banners/cabeceras obvios: razón de aspecto extrema.
                let aspect = raw.width.max(raw.height) as f64 / raw.width.min(raw.height).max(1) as f64;
                if aspect > 10.0 {
                    continue;
                }
                // Streams sin formato reconocible (raw bitmaps de filtros
                // exóticos) no sirven para OCR/visión ni para servir.
                if raw.mime == "application/octet-stream" && image::guess_format(&raw.data).is_err() {
                    continue;
                }
                let sha256 = format!("{:x}", Sha256::digest(&raw.data));
                pages_by_hash.entry(sha256.clone()).or_default().push(raw.page_number);
                let mut img = ExtractedImage::new(ctx.document_id, raw.page_number, &sha256, &raw.mime, raw.width, raw.height, raw.data)?;
                img.original_filename = Some(format!("{}-p{:04}.{}",
                                                     ctx.original_filename.trim_end_matches(".pdf"),
                                                     raw.page_number,
                                                     mime_extension(&raw.mime)));
                images.push(img);
            }
        }

        // Logos repetidos: el mismo contenido pequeño en muchas páginas es
        // cabecera/logo, no contenido.
        let repeated: Vec<String> = pages_by_hash.iter()
                                                 .filter(|(_, pages)| pages.len() >= 5)
                                                 .map(|(h, _)| h.clone())
                                                 .collect();
        let before = images.len();
        images.retain(|img| !(repeated.contains(&img.sha256) && (img.width * img.height) < 160_000));
        if images.len() < before {
            debug!("image: filtered {} repeated header/logo images", before - images.len());
        }
        Ok(images)
    }
}

fn mime_extension(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/tiff" => "tif",
        _ => "bin",
    }
}

#[async_trait]
impl StageProcessor for ImageStage {
    fn stage(&self) -> Stage {
        Stage::Image
    }

    fn service_name(&self) -> &str {
        "ollama"
    }

    fn context_fingerprint(&self, ctx: &ProcessingContext) -> serde_json::Value {
        json!({
            "file_hash": ctx.file_hash,
            "min_size": self.config.min_size,
            "max_size": self.config.max_size,
            "ocr": self.config.ocr_enabled && self.ocr.is_some(),
            "vision": self.config.vision_enabled && self.vision.is_some(),
        })
    }

    async fn process(&self, ctx: &mut ProcessingContext) -> Result<StageSuccess, StageError> {
        let mut images = Self::extract_images(ctx, &self.config)?;

        // OCR + visión en lotes acotados por semáforo; los fallos por imagen
        // degradan (la imagen queda sin ocr_text) en lugar de tirar el stage.
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut enriched = Vec::with_capacity(images.len());
        let futures: Vec<_> = images.drain(..)
                                    .map(|mut img| {
                                        let semaphore = Arc::clone(&semaphore);
                                        let ocr = self.ocr.clone().filter(|_| self.config.ocr_enabled);
                                        let vision = self.vision.clone().filter(|_| self.config.vision_enabled);
                                        async move {
                                            let _permit = semaphore.acquire().await;
                                            if let Some(ocr) = ocr {
                                                match ocr.recognize(&img.data).await {
                                                    Ok(r) if !r.text.trim().is_empty() => {
                                                        img.ocr_text = Some(r.text);
                                                        img.ocr_confidence = r.confidence;
                                                    }
                                                    Ok(_) => {}
                                                    Err(e) => warn!("image: ocr failed on p{}: {e}", img.page_number),
                                                }
                                            }
                                            if let Some(vision) = vision {
                                                match vision.describe_image(&img.data, "Describe this technical diagram or photo in one sentence.").await {
                                                    Ok(desc) if !desc.is_empty() => img.ai_description = Some(desc),
                                                    Ok(_) => {}
                                                    Err(e) => warn!("image: vision failed on p{}: {e}", img.page_number),
                                                }
                                            }
                                            img
                                        }
                                    })
                                    .collect();
        for img in join_all(futures).await {
            enriched.push(img);
        }

        info!("image: doc={} extracted={} (ocr={}, vision={})",
              ctx.document_id,
              enriched.len(),
              self.config.ocr_enabled && self.ocr.is_some(),
              self.config.vision_enabled && self.vision.is_some());
        ctx.images = enriched;

        Ok(StageSuccess::Done(json!({"image_count": ctx.images.len()})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_extension_mapping() {
        assert_eq!(mime_extension("image/png"), "png");
        assert_eq!(mime_extension("image/jpeg"), "jpg");
        assert_eq!(mime_extension("application/octet-stream"), "bin");
    }
}
