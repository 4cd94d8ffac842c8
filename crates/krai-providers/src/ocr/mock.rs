//! OCR mock: texto fijo por tamaño de entrada (determinista).
use async_trait::async_trait;

use super::{OcrEngine, OcrResult};
use crate::error::ProviderError;

#[derive(Default)]
pub struct MockOcr;

#[async_trait]
impl OcrEngine for MockOcr {
    async fn recognize(&self, image: &[u8]) -> Result<OcrResult, ProviderError> {
        Ok(OcrResult { text: format!("mock ocr ({} bytes)", image.len()),
                       confidence: Some(0.99) })
    }
}
