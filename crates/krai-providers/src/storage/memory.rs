//! Object storage en memoria (tests): misma semántica HEAD/PUT/GET.
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::ObjectStorage;
use crate::error::ProviderError;

#[derive(Default)]
pub struct InMemoryObjectStorage {
    objects: DashMap<String, (Bytes, String)>,
    puts: std::sync::atomic::AtomicUsize,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Cantidad de PUTs reales ejecutados (para verificar dedupe por HEAD).
    pub fn put_count(&self) -> usize {
        self.puts.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn exists(&self, key: &str) -> Result<bool, ProviderError> {
        Ok(self.objects.contains_key(key))
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), ProviderError> {
        self.puts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.objects.insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ProviderError> {
        self.objects
            .get(key)
            .map(|e| e.0.clone())
            .ok_or_else(|| ProviderError::Storage(format!("not found: {key}")))
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://images/{key}")
    }
}
