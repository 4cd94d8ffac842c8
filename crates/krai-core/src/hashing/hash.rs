//! Hash helpers – SHA-256 sobre JSON canónico.
//!
//! Todo lo direccionado por contenido en el sistema (hashes de contexto,
//! claves de advisory lock, correlation ids) pasa por aquí; nunca se usa el
//! `Hash` del lenguaje, que no es estable entre procesos.

use crate::hashing::to_canonical_json;
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Hashea un string y devuelve hex en minúsculas.
pub fn hash_str(input: &str) -> String {
    let mut h = Sha256::new();
    h.update(input.as_bytes());
    format!("{:x}", h.finalize())
}

/// Hashea un JSON Value aplicando primero canonicalización.
pub fn hash_value(v: &Value) -> String {
    let canonical = to_canonical_json(v);
    hash_str(&canonical)
}

/// Clave de advisory lock determinista para (document_id, stage): primeros 8
/// bytes del SHA-256 de `"{doc_id}:{stage}"` en big-endian, módulo 2^63−1.
/// Idéntica en cualquier proceso, apta para `pg_try_advisory_lock`.
pub fn advisory_lock_key(document_id: Uuid, stage_name: &str) -> i64 {
    let mut h = Sha256::new();
    h.update(format!("{document_id}:{stage_name}").as_bytes());
    let digest = h.finalize();
    let mut first8 = [0u8; 8];
    first8.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(first8) % (i64::MAX as u64)) as i64
}

/// Correlation id por intento: SHA-256 de `"{parent}:{stage}:{attempt}"`,
/// truncado a 32 hex (16 bytes).
pub fn correlation_id(parent_request_id: &str, stage_name: &str, attempt: u32) -> String {
    let full = hash_str(&format!("{parent_request_id}:{stage_name}:{attempt}"));
    full[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_deterministic_and_non_negative() {
        let doc = Uuid::parse_str("6d9f1c7e-8a30-4b7b-9d2e-111111111111").unwrap();
        let a = advisory_lock_key(doc, "embedding");
        let b = advisory_lock_key(doc, "embedding");
        assert_eq!(a, b);
        assert!(a >= 0);
        assert_ne!(a, advisory_lock_key(doc, "text"));
    }

    #[test]
    fn correlation_id_changes_per_attempt() {
        let c1 = correlation_id("req-1", "embedding", 1);
        let c2 = correlation_id("req-1", "embedding", 2);
        assert_ne!(c1, c2);
        assert_eq!(c1.len(), 32);
        // mismo input => mismo id
        assert_eq!(c1, correlation_id("req-1", "embedding", 1));
    }
}
