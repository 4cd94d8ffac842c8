//! Número de parte extraído de catálogos/manuales.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DomainError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub id: Uuid,
    pub document_id: Uuid,
    pub part_number: String,
    pub description: Option<String>,
    /// Códigos de error cuyo texto de solución menciona esta parte.
    pub linked_error_codes: Vec<Uuid>,
}

impl Part {
    pub fn new(document_id: Uuid, part_number: &str) -> Result<Self, DomainError> {
        let pn = part_number.trim();
        if pn.len() < 4 {
            return Err(DomainError::ValidationError(format!("part_number demasiado corto: {pn:?}")));
        }
        Ok(Part { id: Uuid::new_v4(),
                  document_id,
                  part_number: pn.to_string(),
                  description: None,
                  linked_error_codes: Vec::new() })
    }
}
