//! Configuración central de la aplicación.
//! Carga variables de entorno (.env) y expone una estructura inmutable
//! (`CONFIG`). La construcción del pool vive en `krai_persistence::pool`; acá
//! sólo se arma la configuración a partir del entorno.
use once_cell::sync::Lazy;
use std::env;

use krai_core::constants::DEFAULT_STAGE_CONCURRENCY;

/// Configuración global de la aplicación.
pub struct AppConfig {
    pub database: krai_persistence::DbConfig,
    pub ai: AiConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
}

pub struct AiConfig {
    /// URL base de Ollama (se normalizan hostnames de contenedor).
    pub ollama_url: String,
    pub embedding_model: String,
    pub completion_model: String,
    pub vision_model: String,
    /// Límite inicial de chars de prompt para embeddings (el proveedor
    /// aprende el real por modelo).
    pub embedding_max_prompt_chars: Option<usize>,
    /// Servicio de embeddings visuales (familia ColQwen); None lo desactiva.
    pub visual_embedding_endpoint: Option<String>,
    pub visual_embedding_model: String,
    /// Reconocida por compatibilidad con despliegues torch (informativa).
    pub visual_embedding_torch_dtype: Option<String>,
}

pub struct StorageConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket_images: String,
    pub public_url_images: Option<String>,
    /// UPLOAD_IMAGES_TO_R2: permite apagar la subida (sólo filas DB).
    pub upload_enabled: bool,
}

pub struct PipelineConfig {
    pub enable_svg_extraction: bool,
    pub enable_hierarchical_chunking: bool,
    pub allow_short_chunks: bool,
    pub nonfatal_table_extraction: bool,
    pub ocr_enabled: bool,
    pub vision_enabled: bool,
    pub stage_concurrency: usize,
    /// Directorio de archivos subidos por la API.
    pub upload_dir: String,
}

pub struct ServerConfig {
    pub bind_addr: String,
}

fn flag(name: &str, default: bool) -> bool {
    env::var(name).map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                  .unwrap_or(default)
}

/// Instancia global perezosa de configuración, evaluada una sola vez.
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    krai_persistence::config::init_dotenv();
    AppConfig { database: krai_persistence::DbConfig::from_env(),
                ai: AiConfig { ollama_url: env::var("OLLAMA_URL").unwrap_or_else(|_| "http://127.0.0.1:11434".into()),
                               embedding_model: env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "embeddinggemma".into()),
                               completion_model: env::var("COMPLETION_MODEL").unwrap_or_else(|_| "llama3.2".into()),
                               vision_model: env::var("VISION_MODEL").unwrap_or_else(|_| "llava".into()),
                               embedding_max_prompt_chars: env::var("EMBEDDING_MAX_PROMPT_CHARS").ok().and_then(|v| v.parse().ok()),
                               visual_embedding_endpoint: env::var("VISUAL_EMBEDDING_ENDPOINT").ok().filter(|v| !v.is_empty()),
                               visual_embedding_model: env::var("VISUAL_EMBEDDING_MODEL").unwrap_or_else(|_| "colqwen2.5".into()),
                               visual_embedding_torch_dtype: env::var("VISUAL_EMBEDDING_TORCH_DTYPE").ok() },
                storage: StorageConfig { endpoint: env::var("OBJECT_STORAGE_ENDPOINT").unwrap_or_else(|_| "http://127.0.0.1:9000".into()),
                                         access_key: env::var("OBJECT_STORAGE_ACCESS_KEY").unwrap_or_default(),
                                         secret_key: env::var("OBJECT_STORAGE_SECRET_KEY").unwrap_or_default(),
                                         bucket_images: env::var("OBJECT_STORAGE_BUCKET_IMAGES").unwrap_or_else(|_| "images".into()),
                                         public_url_images: env::var("OBJECT_STORAGE_PUBLIC_URL_IMAGES").ok().filter(|v| !v.is_empty()),
                                         upload_enabled: flag("UPLOAD_IMAGES_TO_R2", true) },
                pipeline: PipelineConfig { enable_svg_extraction: flag("ENABLE_SVG_EXTRACTION", false),
                                           enable_hierarchical_chunking: flag("ENABLE_HIERARCHICAL_CHUNKING", true),
                                           allow_short_chunks: flag("DEBUG_ALLOW_SHORT_CHUNKS", false),
                                           nonfatal_table_extraction: flag("DEBUG_NONFATAL_TABLE_EXTRACTION", true),
                                           ocr_enabled: flag("OCR_ENABLED", true),
                                           vision_enabled: flag("VISION_ENABLED", true),
                                           stage_concurrency: env::var("STAGE_CONCURRENCY").ok()
                                                                                           .and_then(|v| v.parse().ok())
                                                                                           .unwrap_or(DEFAULT_STAGE_CONCURRENCY),
                                           upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "/tmp/krai-uploads".into()) },
                server: ServerConfig { bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8034".into()) } }
});
