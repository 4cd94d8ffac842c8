//! Clasificador determinista de errores.
//!
//! Reglas (en orden):
//! - HTTP 408 y 429 → transitorio.
//! - HTTP 5xx → transitorio.
//! - HTTP 4xx restantes → permanente.
//! - Conexión rechazada / DNS / timeout → transitorio.
//! - Errores de esquema/validación y de archivo → permanente.
//! - Cualquier otra cosa → desconocido (se trata como permanente con aviso).
//!
//! La resolución de la política de reintento es un problema aparte
//! (`retry::RetryPolicySource`); este módulo sólo clasifica.
use serde::{Deserialize, Serialize};

use crate::errors::StageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Transient,
    Permanent,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub error_category: ErrorCategory,
    pub error_type: String,
}

/// Clasifica un `StageError` de forma determinista.
pub fn classify_error(error: &StageError) -> ErrorClassification {
    let category = match error {
        StageError::Http { status, .. } => match *status {
            408 | 429 => ErrorCategory::Transient,
            500..=599 => ErrorCategory::Transient,
            400..=499 => ErrorCategory::Permanent,
            _ => ErrorCategory::Unknown,
        },
        StageError::Timeout(_) | StageError::Connection(_) => ErrorCategory::Transient,
        StageError::Database(msg) => {
            // Mensajes de pool/conexión del driver llegan como texto; se hace
            // best-effort sin acoplar a SQLSTATE.
            let m = msg.to_lowercase();
            if m.contains("pool timed out")
               || m.contains("connection closed")
               || m.contains("connection refused")
               || m.contains("connection reset")
               || m.contains("timeout")
               || m.contains("deadlock detected")
               || m.contains("could not serialize access")
            {
                ErrorCategory::Transient
            } else {
                ErrorCategory::Unknown
            }
        }
        StageError::InvalidFileType(_)
        | StageError::CorruptDocument(_)
        | StageError::Validation(_)
        | StageError::Cancelled => ErrorCategory::Permanent,
        // ContextLimit se maneja dentro del stage (truncamiento progresivo);
        // si llega hasta aquí no debe reintentarse a ciegas.
        StageError::ContextLimit { .. } => ErrorCategory::Permanent,
        StageError::MissingDependency(_) => ErrorCategory::Permanent,
        StageError::Io(_) | StageError::Internal(_) => ErrorCategory::Unknown,
    };
    ErrorClassification { error_category: category,
                          error_type: error.error_type().to_string() }
}

/// Detecta la respuesta estilo Ollama de desbordamiento de contexto dentro de
/// un cuerpo 500. El stage de embeddings la convierte en
/// `StageError::ContextLimit` antes de llegar al clasificador.
pub fn is_context_length_overflow(status: u16, body: &str) -> bool {
    status == 500 && body.to_lowercase().contains("input length exceeds context length")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> StageError {
        StageError::Http { status,
                           message: "x".into() }
    }

    #[test]
    fn http_408_and_429_are_transient() {
        assert_eq!(classify_error(&http(408)).error_category, ErrorCategory::Transient);
        assert_eq!(classify_error(&http(429)).error_category, ErrorCategory::Transient);
    }

    #[test]
    fn http_5xx_is_transient() {
        for s in [500, 502, 503, 504] {
            assert_eq!(classify_error(&http(s)).error_category, ErrorCategory::Transient);
        }
    }

    #[test]
    fn http_4xx_is_permanent() {
        for s in [400, 401, 403, 404, 422] {
            assert_eq!(classify_error(&http(s)).error_category, ErrorCategory::Permanent);
        }
    }

    #[test]
    fn network_failures_are_transient() {
        assert_eq!(classify_error(&StageError::Timeout("read".into())).error_category,
                   ErrorCategory::Transient);
        assert_eq!(classify_error(&StageError::Connection("refused".into())).error_category,
                   ErrorCategory::Transient);
    }

    #[test]
    fn validation_is_permanent() {
        assert_eq!(classify_error(&StageError::Validation("bad".into())).error_category,
                   ErrorCategory::Permanent);
        assert_eq!(classify_error(&StageError::InvalidFileType("txt".into())).error_category,
                   ErrorCategory::Permanent);
    }

    #[test]
    fn unknown_kinds_are_unknown() {
        assert_eq!(classify_error(&StageError::Internal("?".into())).error_category,
                   ErrorCategory::Unknown);
    }

    #[test]
    fn ollama_overflow_detection() {
        assert!(is_context_length_overflow(500, "error: input length exceeds context length"));
        assert!(!is_context_length_overflow(503, "input length exceeds context length"));
        assert!(!is_context_length_overflow(500, "model not found"));
    }
}
