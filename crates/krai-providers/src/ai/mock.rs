//! Servicio de IA determinista para tests y corridas offline.
//!
//! - Embeddings: vector pseudoaleatorio derivado del SHA-256 del texto
//!   (mismo texto ⇒ mismo vector), normalizado.
//! - Completado: devuelve JSON vacío estable ("{}") salvo prompts de
//!   clasificación conocidos, donde responde un shape mínimo usable.
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::AiService;
use crate::error::ProviderError;

pub struct MockAiService {
    dim: usize,
}

impl MockAiService {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Default for MockAiService {
    fn default() -> Self {
        Self::new(krai_core::constants::EMBEDDING_DIM)
    }
}

#[async_trait]
impl AiService for MockAiService {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        // Expansión del digest a `dim` floats en [-1,1], estable por texto.
        let seed = Sha256::digest(text.as_bytes());
        let mut out = Vec::with_capacity(self.dim);
        let mut counter: u32 = 0;
        while out.len() < self.dim {
            let mut h = Sha256::new();
            h.update(seed);
            h.update(counter.to_be_bytes());
            for b in h.finalize() {
                if out.len() == self.dim {
                    break;
                }
                out.push((b as f32 - 127.5) / 127.5);
            }
            counter += 1;
        }
        Ok(out)
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        if prompt.contains("manufacturer") {
            return Ok(r#"{"manufacturer": null, "models": []}"#.to_string());
        }
        Ok("{}".to_string())
    }

    async fn describe_image(&self, _image: &[u8], _prompt: &str) -> Result<String, ProviderError> {
        Ok("diagram".to_string())
    }

    fn embedding_model(&self) -> &str {
        "mock-embedding"
    }

    fn embedding_dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embeddings_are_deterministic_and_sized() {
        let svc = MockAiService::new(768);
        let a = svc.embed_text("fuser unit").await.unwrap();
        let b = svc.embed_text("fuser unit").await.unwrap();
        let c = svc.embed_text("transfer belt").await.unwrap();
        assert_eq!(a.len(), 768);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
