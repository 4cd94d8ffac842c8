//! Idempotencia por stage: hash de contexto + marcadores de completitud.
//!
//! Contrato:
//! - `compute_context_hash` es una función pura (sin DB): SHA-256 del JSON
//!   canónico del subconjunto de campos que cada stage declara relevante.
//! - `CompletionStore` persiste marcadores (document_id, stage) → data_hash;
//!   el upsert debe ser seguro bajo concurrencia (ON CONFLICT DO UPDATE en la
//!   implementación Postgres).
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::errors::StageError;
use crate::hashing::hash_value;
use crate::stage::Stage;

/// Hash estable del subconjunto de contexto relevante para un stage.
/// Mismo JSON (independiente del orden de claves) ⇒ mismo hash, en cualquier
/// proceso y corrida.
pub fn compute_context_hash(fingerprint: &serde_json::Value) -> String {
    hash_value(fingerprint)
}

/// Marcador durable de stage completado.
#[derive(Debug, Clone)]
pub struct CompletionMarker {
    pub document_id: Uuid,
    pub stage: Stage,
    pub data_hash: String,
    pub completed_at: DateTime<Utc>,
}

#[async_trait]
pub trait CompletionStore: Send + Sync {
    /// ¿Existe marcador para (doc, stage) con exactamente este data_hash?
    async fn is_completed(&self, document_id: Uuid, stage: Stage, data_hash: &str) -> Result<bool, StageError>;

    /// Inserta/actualiza el marcador (último hash gana).
    async fn set_marker(&self, document_id: Uuid, stage: Stage, data_hash: &str) -> Result<(), StageError>;

    /// Borra los marcadores de un documento (re-proceso forzado).
    async fn clear_document(&self, document_id: Uuid) -> Result<(), StageError>;
}

/// Implementación en memoria del `CompletionStore`.
///
/// - Volátil: útil para tests y corridas sin DB.
/// - Paridad 1:1 con la implementación Postgres (mismo contrato observable).
#[derive(Default)]
pub struct InMemoryCompletionStore {
    inner: DashMap<(Uuid, Stage), CompletionMarker>,
}

impl InMemoryCompletionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl CompletionStore for InMemoryCompletionStore {
    async fn is_completed(&self, document_id: Uuid, stage: Stage, data_hash: &str) -> Result<bool, StageError> {
        Ok(self.inner
               .get(&(document_id, stage))
               .map(|m| m.data_hash == data_hash)
               .unwrap_or(false))
    }

    async fn set_marker(&self, document_id: Uuid, stage: Stage, data_hash: &str) -> Result<(), StageError> {
        self.inner.insert((document_id, stage),
                          CompletionMarker { document_id,
                                             stage,
                                             data_hash: data_hash.to_string(),
                                             completed_at: Utc::now() });
        Ok(())
    }

    async fn clear_document(&self, document_id: Uuid) -> Result<(), StageError> {
        self.inner.retain(|(doc, _), _| *doc != document_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn context_hash_is_stable_across_key_order() {
        let a = json!({"file_hash": "abc", "page_count": 3});
        let b = json!({"page_count": 3, "file_hash": "abc"});
        assert_eq!(compute_context_hash(&a), compute_context_hash(&b));
    }

    #[tokio::test]
    async fn marker_roundtrip_and_hash_mismatch() {
        let store = InMemoryCompletionStore::new();
        let doc = Uuid::new_v4();
        assert!(!store.is_completed(doc, Stage::Text, "h1").await.unwrap());
        store.set_marker(doc, Stage::Text, "h1").await.unwrap();
        assert!(store.is_completed(doc, Stage::Text, "h1").await.unwrap());
        // hash distinto => el stage debe re-ejecutarse
        assert!(!store.is_completed(doc, Stage::Text, "h2").await.unwrap());
        // upsert: el último hash gana
        store.set_marker(doc, Stage::Text, "h2").await.unwrap();
        assert!(store.is_completed(doc, Stage::Text, "h2").await.unwrap());
    }
}
