//! Los diez stages del pipeline (S1 upload … S10 structured_extraction).
//!
//! Cada stage implementa `krai_core::StageProcessor`: declara su subset de
//! contexto para idempotencia (`context_fingerprint`) y hace el trabajo en
//! `process`. Ningún stage escribe artefactos parciales: la persistencia
//! ocurre al final del stage, de modo que un fallo no deja filas a medias.

mod classification;
mod embedding;
mod image;
mod link;
mod metadata;
mod search;
mod storage;
mod structured;
mod text;
mod upload;

pub use classification::{ClassificationStage, ProductDiscovery};
pub use embedding::EmbeddingStage;
pub use image::{ImageStage, ImageStageConfig};
pub use link::{LinkStage, VideoMetadataClient};
pub use metadata::MetadataStage;
pub use search::SearchStage;
pub use storage::StorageStage;
pub use structured::StructuredStage;
pub use text::TextStage;
pub use upload::UploadStage;
