//! Documento técnico ingerido (manual de servicio, catálogo de partes, etc.).
//!
//! Invariantes:
//! - `file_hash` es el SHA-256 hex de los bytes del archivo y identifica el
//!   documento de forma única (dedupe por contenido).
//! - `stage_status` refleja el estado por etapa del pipeline tal como se
//!   persiste en JSONB; el dominio lo transporta como JSON opaco para no
//!   acoplar las entidades al vocabulario del pipeline.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DomainError;

/// Tipo de documento detectado heurísticamente durante la ingesta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    ServiceManual,
    PartsCatalog,
    UserGuide,
    QuickReference,
    TechnicalBulletin,
    InstallationGuide,
    FirmwareNotes,
    Datasheet,
    Unknown,
}

impl DocumentType {
    /// Representación estable en minúsculas (coincide con la columna de DB).
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::ServiceManual => "service_manual",
            DocumentType::PartsCatalog => "parts_catalog",
            DocumentType::UserGuide => "user_guide",
            DocumentType::QuickReference => "quick_reference",
            DocumentType::TechnicalBulletin => "technical_bulletin",
            DocumentType::InstallationGuide => "installation_guide",
            DocumentType::FirmwareNotes => "firmware_notes",
            DocumentType::Datasheet => "datasheet",
            DocumentType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "service_manual" => DocumentType::ServiceManual,
            "parts_catalog" => DocumentType::PartsCatalog,
            "user_guide" => DocumentType::UserGuide,
            "quick_reference" => DocumentType::QuickReference,
            "technical_bulletin" => DocumentType::TechnicalBulletin,
            "installation_guide" => DocumentType::InstallationGuide,
            "firmware_notes" => DocumentType::FirmwareNotes,
            "datasheet" => DocumentType::Datasheet,
            _ => DocumentType::Unknown,
        }
    }
}

/// Documento persistido en `krai_core.documents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub file_hash: String,
    pub filename: String,
    /// Nombre legible original cuando difiere del nombre normalizado.
    pub original_filename: Option<String>,
    /// Ruta local (o clave remota) del archivo fuente para re-procesos.
    pub storage_path: Option<String>,
    pub page_count: i32,
    pub document_type: DocumentType,
    pub language: Option<String>,
    pub version: Option<String>,
    pub manufacturer_id: Option<Uuid>,
    pub series_id: Option<Uuid>,
    /// Mapa stage_name -> {status, started_at, completed_at, progress, ...}.
    pub stage_status: serde_json::Value,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Crea un documento nuevo validando el hash de contenido.
    pub fn new(file_hash: &str, filename: &str, page_count: i32, document_type: DocumentType) -> Result<Self, DomainError> {
        if file_hash.len() != 64 || !file_hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::ValidationError("file_hash debe ser SHA-256 hex de 64 caracteres".to_string()));
        }
        if filename.trim().is_empty() {
            return Err(DomainError::ValidationError("filename no puede estar vacío".to_string()));
        }
        if page_count < 0 {
            return Err(DomainError::ValidationError("page_count no puede ser negativo".to_string()));
        }
        let now = Utc::now();
        Ok(Document { id: Uuid::new_v4(),
                      file_hash: file_hash.to_lowercase(),
                      filename: filename.to_string(),
                      original_filename: None,
                      storage_path: None,
                      page_count,
                      document_type,
                      language: None,
                      version: None,
                      manufacturer_id: None,
                      series_id: None,
                      stage_status: serde_json::json!({}),
                      metadata: serde_json::json!({}),
                      created_at: now,
                      updated_at: now })
    }
}
