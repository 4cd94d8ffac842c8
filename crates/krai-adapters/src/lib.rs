//! krai-adapters: stages concretos del pipeline y acceso a PDF.
//!
//! - `pdf`: apertura de PDF/.pdfz, texto por página, imágenes embebidas,
//!   anotaciones de enlace y metadata del documento.
//! - `chunking`: chunker jerárquico (encabezados → section_hierarchy).
//! - `patterns`: tablas de detección (fabricantes, series, códigos de error,
//!   números de parte, versiones).
//! - `stages`: los diez procesadores S1..S10 que implementan
//!   `krai_core::StageProcessor`.

pub mod chunking;
pub mod patterns;
pub mod pdf;
pub mod stages;

pub use stages::{ClassificationStage, EmbeddingStage, ImageStage, LinkStage, MetadataStage, SearchStage,
                 StorageStage, StructuredStage, TextStage, UploadStage};
