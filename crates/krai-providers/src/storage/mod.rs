//! Object storage direccionado por contenido.
//!
//! Contrato: la clave de un objeto es el SHA-256 hex de sus bytes, sin
//! subdirectorios. `exists` (HEAD) antes de `put` evita re-subidas de
//! contenido idéntico.

mod memory;
mod s3;

pub use memory::InMemoryObjectStorage;
pub use s3::{S3Config, S3ObjectStorage};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ProviderError;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// HEAD del objeto; true si ya existe.
    async fn exists(&self, key: &str) -> Result<bool, ProviderError>;

    /// Sube el objeto (key = sha256 hex del contenido).
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), ProviderError>;

    async fn get(&self, key: &str) -> Result<Bytes, ProviderError>;

    /// URL pública (o interna) del objeto para persistir en DB.
    fn public_url(&self, key: &str) -> String;
}
