//! Embeddings visuales (familia ColQwen detrás de un servicio HTTP propio).
//!
//! El servicio expone `POST /embed` con `{"image": "<base64>"}` y responde
//! `{"embedding": [f32], "dim": n}`. La dimensión nativa NO es la del store
//! unificado: el stage de embeddings ajusta (pad/truncate) a la columna fija
//! y registra la dimensión nativa en metadata.
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::error::ProviderError;

#[async_trait]
pub trait VisualEmbedder: Send + Sync {
    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>, ProviderError>;
    fn model(&self) -> &str;
}

pub struct HttpVisualEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Deserialize)]
struct VisualResponse {
    embedding: Vec<f32>,
}

impl HttpVisualEmbedder {
    pub fn new(endpoint: &str, model: &str) -> Self {
        HttpVisualEmbedder { client: reqwest::Client::new(),
                             endpoint: endpoint.trim_end_matches('/').to_string(),
                             model: model.to_string() }
    }
}

#[async_trait]
impl VisualEmbedder for HttpVisualEmbedder {
    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>, ProviderError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let resp = self.client
                       .post(format!("{}/embed", self.endpoint))
                       .json(&json!({"model": self.model, "image": encoded}))
                       .send()
                       .await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        if !(200..300).contains(&status) {
            return Err(ProviderError::Http { status,
                                             body });
        }
        let parsed: VisualResponse = serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(parsed.embedding)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Mock determinista con dimensión nativa distinta de 768 (ejercita el
/// pad/truncate del stage de embeddings).
pub struct MockVisualEmbedder {
    dim: usize,
}

impl MockVisualEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait]
impl VisualEmbedder for MockVisualEmbedder {
    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>, ProviderError> {
        let digest = Sha256::digest(image);
        Ok((0..self.dim).map(|i| (digest[i % 32] as f32 - 127.5) / 127.5).collect())
    }

    fn model(&self) -> &str {
        "mock-visual"
    }
}
