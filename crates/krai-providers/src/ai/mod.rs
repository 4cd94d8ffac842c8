//! Servicio de IA: embeddings de texto, completado y descripción de imágenes.

mod mock;
mod ollama;
mod visual;

pub use mock::MockAiService;
pub use ollama::{normalize_ollama_url, OllamaProvider};
pub use visual::{HttpVisualEmbedder, MockVisualEmbedder, VisualEmbedder};

use async_trait::async_trait;

use crate::error::ProviderError;

/// Contrato del servicio de IA consumido por los stages.
///
/// Las implementaciones deben ser seguras para uso concurrente (se comparten
/// vía `Arc` entre lotes limitados por semáforo).
#[async_trait]
pub trait AiService: Send + Sync {
    /// Embedding de un texto; dimensión nativa del modelo configurado.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Completado de texto (prompt plano, respuesta no streameada).
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Descripción de una imagen (modelo de visión estilo LLaVA).
    async fn describe_image(&self, image: &[u8], prompt: &str) -> Result<String, ProviderError>;

    /// Nombre del modelo de embeddings activo (se persiste en metadata).
    fn embedding_model(&self) -> &str;

    /// Dimensión nativa del modelo de embeddings.
    fn embedding_dim(&self) -> usize;
}
