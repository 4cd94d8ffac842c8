//! Taxonomía de fallos observables por el pipeline.
//!
//! Los stages devuelven `StageError`; el clasificador (`classify`) decide si
//! el fallo es transitorio, permanente o desconocido. Las variantes llevan la
//! información mínima para esa decisión (status HTTP, tipo de IO, etc.).
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum StageError {
    /// El archivo subido no es un PDF (ni .pdfz válido).
    #[error("invalid file type: {0}")]
    InvalidFileType(String),

    /// El PDF no puede abrirse/parsearse.
    #[error("corrupt document: {0}")]
    CorruptDocument(String),

    /// Respuesta HTTP no exitosa de un servicio externo (AI, storage, scrape).
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    /// Timeout de red o de servicio.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Conexión rechazada / DNS irresoluble.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Datos que no cumplen el esquema/validación de dominio.
    #[error("validation: {0}")]
    Validation(String),

    /// El prompt excede la ventana de contexto del modelo; se maneja
    /// in-stage con truncamiento progresivo, nunca como transitorio.
    #[error("context length exceeded for model {model}")]
    ContextLimit { model: String },

    /// Función/tabla de DB ausente: la feature se auto-deshabilita.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// Error de IO local (archivos temporales, lectura de PDF).
    #[error("io: {0}")]
    Io(String),

    /// Error del driver/BD no clasificado aguas arriba.
    #[error("database: {0}")]
    Database(String),

    /// Ejecución cancelada por el llamador.
    #[error("cancelled")]
    Cancelled,

    #[error("internal: {0}")]
    Internal(String),
}

impl From<krai_domain::DomainError> for StageError {
    fn from(e: krai_domain::DomainError) -> Self {
        StageError::Validation(e.to_string())
    }
}

impl StageError {
    /// Nombre estable de la variante, usado como `error_type` en el registro
    /// de errores.
    pub fn error_type(&self) -> &'static str {
        match self {
            StageError::InvalidFileType(_) => "invalid_file_type",
            StageError::CorruptDocument(_) => "corrupt_document",
            StageError::Http { .. } => "http",
            StageError::Timeout(_) => "timeout",
            StageError::Connection(_) => "connection",
            StageError::Validation(_) => "validation",
            StageError::ContextLimit { .. } => "context_limit",
            StageError::MissingDependency(_) => "missing_dependency",
            StageError::Io(_) => "io",
            StageError::Database(_) => "database",
            StageError::Cancelled => "cancelled",
            StageError::Internal(_) => "internal",
        }
    }
}
