//! Chunk de texto con jerarquía de secciones y encadenamiento lineal.
//!
//! Invariantes:
//! - La secuencia de chunks de un documento está totalmente ordenada por
//!   (page_number, offset dentro de la página); `chunk_index` materializa ese
//!   orden.
//! - `previous_chunk_id`/`next_chunk_id` forman una cadena lineal: si
//!   `next_chunk_id` de C apunta a D, entonces `previous_chunk_id` de D
//!   apunta a C.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DomainError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    /// Posición absoluta dentro del documento (0-based).
    pub chunk_index: i32,
    pub page_number: i32,
    pub text: String,
    /// Camino ordenado de encabezados ("capítulo" -> "sección" -> ...).
    pub section_hierarchy: Vec<String>,
    pub previous_chunk_id: Option<Uuid>,
    pub next_chunk_id: Option<Uuid>,
    pub metadata: serde_json::Value,
}

impl Chunk {
    pub fn new(document_id: Uuid, chunk_index: i32, page_number: i32, text: &str, section_hierarchy: Vec<String>) -> Result<Self, DomainError> {
        if text.trim().is_empty() {
            return Err(DomainError::ValidationError("el texto del chunk no puede estar vacío".to_string()));
        }
        if chunk_index < 0 {
            return Err(DomainError::ValidationError("chunk_index no puede ser negativo".to_string()));
        }
        if page_number < 1 {
            return Err(DomainError::ValidationError("page_number es 1-based".to_string()));
        }
        Ok(Chunk { id: Uuid::new_v4(),
                   document_id,
                   chunk_index,
                   page_number,
                   text: text.to_string(),
                   section_hierarchy,
                   previous_chunk_id: None,
                   next_chunk_id: None,
                   metadata: serde_json::json!({}) })
    }

    /// Longitud del texto en caracteres (no bytes).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Enlaza una secuencia de chunks en una cadena lineal prev/next in-place.
/// El orden del slice se asume ya total (por chunk_index).
pub fn link_chain(chunks: &mut [Chunk]) {
    let ids: Vec<Uuid> = chunks.iter().map(|c| c.id).collect();
    for (i, c) in chunks.iter_mut().enumerate() {
        c.previous_chunk_id = if i > 0 { Some(ids[i - 1]) } else { None };
        c.next_chunk_id = if i + 1 < ids.len() { Some(ids[i + 1]) } else { None };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_chain_is_bidirectionally_consistent() {
        let doc = Uuid::new_v4();
        let mut chunks: Vec<Chunk> = (0..4).map(|i| Chunk::new(doc, i, 1, &format!("chunk {i} body"), vec![]).unwrap())
                                           .collect();
        link_chain(&mut chunks);
        assert!(chunks[0].previous_chunk_id.is_none());
        assert!(chunks[3].next_chunk_id.is_none());
        for i in 0..3 {
            assert_eq!(chunks[i].next_chunk_id, Some(chunks[i + 1].id));
            assert_eq!(chunks[i + 1].previous_chunk_id, Some(chunks[i].id));
        }
    }

    #[test]
    fn empty_text_rejected() {
        let err = Chunk::new(Uuid::new_v4(), 0, 1, "   ", vec![]);
        assert!(err.is_err());
    }
}
