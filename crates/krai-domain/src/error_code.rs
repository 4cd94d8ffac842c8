//! Códigos de error extraídos de manuales de servicio.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DomainError;

/// Severidad declarada o inferida del código de error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "info" => Severity::Info,
            "low" => Severity::Low,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            _ => Severity::Medium,
        }
    }
}

/// Código de error con descripción, solución y contexto circundante.
///
/// Reglas de calidad (aplicadas en el constructor):
/// - `description` con al menos 10 caracteres útiles.
/// - `context_text` con al menos 50 caracteres (texto circundante real).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorCode {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_id: Option<Uuid>,
    pub code: String,
    pub description: String,
    pub solution_text: Option<String>,
    pub context_text: String,
    pub severity: Severity,
    pub confidence: f32,
    pub page_number: i32,
    pub related_images: Vec<Uuid>,
    pub related_parts: Vec<Uuid>,
}

impl ErrorCode {
    pub fn new(document_id: Uuid, code: &str, description: &str, context_text: &str, severity: Severity, confidence: f32, page_number: i32) -> Result<Self, DomainError> {
        if code.trim().is_empty() {
            return Err(DomainError::ValidationError("code no puede estar vacío".to_string()));
        }
        if description.trim().chars().count() < 10 {
            return Err(DomainError::ValidationError(format!("descripción demasiado corta para {code} (mínimo 10 caracteres)")));
        }
        if context_text.trim().chars().count() < 50 {
            return Err(DomainError::ValidationError(format!("context_text demasiado corto para {code} (mínimo 50 caracteres)")));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(DomainError::ValidationError("confidence debe estar en [0,1]".to_string()));
        }
        Ok(ErrorCode { id: Uuid::new_v4(),
                       document_id,
                       chunk_id: None,
                       code: code.trim().to_string(),
                       description: description.trim().to_string(),
                       solution_text: None,
                       context_text: context_text.to_string(),
                       severity,
                       confidence,
                       page_number,
                       related_images: Vec::new(),
                       related_parts: Vec::new() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_description_rejected() {
        let ctx = "x".repeat(60);
        assert!(ErrorCode::new(Uuid::new_v4(), "13.20.01", "corto", &ctx, Severity::Medium, 0.9, 4).is_err());
    }

    #[test]
    fn short_context_rejected() {
        assert!(ErrorCode::new(Uuid::new_v4(), "13.20.01", "Paper jam in duplexer", "pequeño", Severity::Medium, 0.9, 4).is_err());
    }
}
