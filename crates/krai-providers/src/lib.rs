//! krai-providers: clientes de servicios externos detrás de traits.
//!
//! - `ai`: LLM/embeddings/visión (Ollama) con límite de prompt adaptativo.
//! - `ocr`: OCR local (binario Tesseract) con confianza.
//! - `storage`: object store S3-compatible direccionado por hash.
//!
//! Cada servicio tiene una implementación real y una mock determinista para
//! tests y corridas offline.

pub mod ai;
pub mod error;
pub mod ocr;
pub mod storage;

pub use ai::{AiService, HttpVisualEmbedder, MockAiService, MockVisualEmbedder, OllamaProvider, VisualEmbedder};
pub use error::ProviderError;
pub use ocr::{MockOcr, OcrEngine, OcrResult, TesseractOcr};
pub use storage::{InMemoryObjectStorage, ObjectStorage, S3Config, S3ObjectStorage};
