//! OCR de imágenes extraídas.

mod mock;
mod tesseract;

pub use mock::MockOcr;
pub use tesseract::TesseractOcr;

use async_trait::async_trait;

use crate::error::ProviderError;

#[derive(Debug, Clone)]
pub struct OcrResult {
    pub text: String,
    /// Confianza media por palabra en [0,1]; None si el motor no la reporta.
    pub confidence: Option<f32>,
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<OcrResult, ProviderError>;
}
