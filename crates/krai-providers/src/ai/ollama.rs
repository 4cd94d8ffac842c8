//! Proveedor Ollama (HTTP local) para embeddings, completado y visión.
//!
//! Particularidades operativas:
//! - Hostnames de contenedor ("ollama", "host.docker.internal") se reescriben
//!   a 127.0.0.1 cuando el proceso corre fuera de un contenedor.
//! - Los 500 con cuerpo "input length exceeds context length" disparan
//!   truncamiento progresivo del prompt y aprendizaje del límite por modelo;
//!   no se reintentan como transitorios.
use async_trait::async_trait;
use base64::Engine as _;
use dashmap::DashMap;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::json;

use krai_core::classify::is_context_length_overflow;

use super::AiService;
use crate::error::ProviderError;

/// Límite inicial de caracteres de prompt cuando el modelo aún no enseñó el
/// suyo.
const DEFAULT_MAX_PROMPT_CHARS: usize = 8000;
/// Piso de truncamiento: por debajo de esto el overflow se reporta tal cual.
const MIN_PROMPT_CHARS: usize = 512;

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    embedding_model: String,
    completion_model: String,
    vision_model: String,
    embedding_dim: usize,
    /// Límite de prompt aprendido por modelo (chars). Se ajusta a la baja al
    /// observar overflows de contexto.
    learned_limits: DashMap<String, usize>,
    configured_max_prompt_chars: Option<usize>,
}

/// Reescribe hostnames de contenedor a loopback cuando el proceso corre en el
/// host (sin /.dockerenv). Idempotente para URLs ya locales.
pub fn normalize_ollama_url(url: &str) -> String {
    let in_container = std::path::Path::new("/.dockerenv").exists();
    if in_container {
        return url.trim_end_matches('/').to_string();
    }
    let mut out = url.trim_end_matches('/').to_string();
    for host in ["ollama", "host.docker.internal", "krai-ollama"] {
        let needle = format!("//{host}");
        if out.contains(&needle) {
            out = out.replace(&needle, "//127.0.0.1");
        }
    }
    out
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaProvider {
    pub fn new(base_url: &str, embedding_model: &str, completion_model: &str, vision_model: &str, embedding_dim: usize, max_prompt_chars: Option<usize>) -> Self {
        OllamaProvider { client: reqwest::Client::new(),
                         base_url: normalize_ollama_url(base_url),
                         embedding_model: embedding_model.to_string(),
                         completion_model: completion_model.to_string(),
                         vision_model: vision_model.to_string(),
                         embedding_dim,
                         learned_limits: DashMap::new(),
                         configured_max_prompt_chars: max_prompt_chars }
    }

    fn prompt_limit(&self, model: &str) -> usize {
        self.learned_limits
            .get(model)
            .map(|v| *v)
            .or(self.configured_max_prompt_chars)
            .unwrap_or(DEFAULT_MAX_PROMPT_CHARS)
    }

    fn learn_limit(&self, model: &str, chars: usize) {
        debug!("ollama: learned prompt limit for {model}: {chars} chars");
        self.learned_limits.insert(model.to_string(), chars);
    }

    /// Trunca en el borde de char más cercano por debajo de `max_chars`.
    fn truncate_chars(text: &str, max_chars: usize) -> &str {
        match text.char_indices().nth(max_chars) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<(u16, String), ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        Ok((status, text))
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let (status, body) = self.post_json("/api/embeddings",
                                            json!({"model": self.embedding_model, "prompt": text}))
                                 .await?;
        if is_context_length_overflow(status, &body) {
            return Err(ProviderError::ContextLimit { model: self.embedding_model.clone() });
        }
        if !(200..300).contains(&status) {
            return Err(ProviderError::Http { status,
                                             body });
        }
        let parsed: EmbeddingResponse = serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(parsed.embedding)
    }
}

#[async_trait]
impl AiService for OllamaProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        // Truncamiento progresivo: se parte del límite conocido y se reduce
        // 20% por overflow hasta el piso; el último límite bueno se aprende.
        let mut limit = self.prompt_limit(&self.embedding_model);
        loop {
            let attempt_text = Self::truncate_chars(text, limit);
            match self.embed_once(attempt_text).await {
                Ok(v) => {
                    if attempt_text.len() < text.len() {
                        self.learn_limit(&self.embedding_model, limit);
                    }
                    return Ok(v);
                }
                Err(ProviderError::ContextLimit { .. }) if limit > MIN_PROMPT_CHARS => {
                    let next = (limit * 4) / 5;
                    warn!("ollama: context overflow at {limit} chars; retrying with {next}");
                    limit = next.max(MIN_PROMPT_CHARS);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let (status, body) = self.post_json("/api/generate",
                                            json!({"model": self.completion_model, "prompt": prompt, "stream": false}))
                                 .await?;
        if is_context_length_overflow(status, &body) {
            return Err(ProviderError::ContextLimit { model: self.completion_model.clone() });
        }
        if !(200..300).contains(&status) {
            return Err(ProviderError::Http { status,
                                             body });
        }
        let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(parsed.response)
    }

    async fn describe_image(&self, image: &[u8], prompt: &str) -> Result<String, ProviderError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let (status, body) = self.post_json("/api/generate",
                                            json!({
                                                "model": self.vision_model,
                                                "prompt": prompt,
                                                "images": [encoded],
                                                "stream": false
                                            }))
                                 .await?;
        if !(200..300).contains(&status) {
            return Err(ProviderError::Http { status,
                                             body });
        }
        let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(parsed.response.trim().to_string())
    }

    fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_hostnames_rewritten_outside_container() {
        // En el entorno de test no existe /.dockerenv
        if std::path::Path::new("/.dockerenv").exists() {
            return;
        }
        assert_eq!(normalize_ollama_url("http://ollama:11434/"), "http://127.0.0.1:11434");
        assert_eq!(normalize_ollama_url("http://host.docker.internal:11434"),
                   "http://127.0.0.1:11434");
        assert_eq!(normalize_ollama_url("http://127.0.0.1:11434"), "http://127.0.0.1:11434");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "áéíóú";
        assert_eq!(OllamaProvider::truncate_chars(s, 2), "áé");
        assert_eq!(OllamaProvider::truncate_chars(s, 10), s);
    }
}
