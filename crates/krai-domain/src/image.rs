//! Imagen extraída de un documento, direccionada por contenido.
//!
//! La clave de almacenamiento en el object store es siempre el SHA-256 hex de
//! los bytes: dos extracciones con bytes idénticos comparten objeto y nunca se
//! re-suben.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DomainError;

/// Rectángulo de colocación en coordenadas de página PDF (puntos).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        (self.x1 - self.x0).abs()
    }
    pub fn height(&self) -> f64 {
        (self.y1 - self.y0).abs()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedImage {
    pub id: Uuid,
    pub document_id: Uuid,
    pub page_number: i32,
    /// SHA-256 hex del contenido; también es la clave en el bucket `images`.
    pub sha256: String,
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub bbox: Option<BoundingBox>,
    pub ocr_text: Option<String>,
    pub ocr_confidence: Option<f32>,
    pub ai_description: Option<String>,
    /// Nombre legible original, distinto de la clave de storage.
    pub original_filename: Option<String>,
    pub related_chunks: Vec<Uuid>,
    /// Bytes del contenido; presentes sólo durante el pipeline, nunca se
    /// serializan hacia la DB.
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl ExtractedImage {
    pub fn new(document_id: Uuid, page_number: i32, sha256: &str, mime: &str, width: u32, height: u32, data: Vec<u8>) -> Result<Self, DomainError> {
        if sha256.len() != 64 || !sha256.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::ValidationError("sha256 debe ser hex de 64 caracteres".to_string()));
        }
        if mime.is_empty() {
            return Err(DomainError::ValidationError("mime no puede estar vacío".to_string()));
        }
        Ok(ExtractedImage { id: Uuid::new_v4(),
                            document_id,
                            page_number,
                            sha256: sha256.to_lowercase(),
                            mime: mime.to_string(),
                            width,
                            height,
                            bbox: None,
                            ocr_text: None,
                            ocr_confidence: None,
                            ai_description: None,
                            original_filename: None,
                            related_chunks: Vec::new(),
                            data })
    }

    /// Clave determinista en el object store (== sha256 del contenido).
    pub fn storage_key(&self) -> &str {
        &self.sha256
    }
}
