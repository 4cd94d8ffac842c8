//! Constantes compartidas del pipeline.

/// Versión lógica del pipeline; participa de los hashes de contexto para que
/// un cambio de semántica invalide los marcadores previos.
pub const PIPELINE_VERSION: &str = "2";

/// Dimensión fija de la tabla unificada de embeddings.
pub const EMBEDDING_DIM: usize = 768;

/// Longitud mínima (caracteres) de un chunk útil; por debajo se descarta
/// salvo flag de debug.
pub const MIN_CHUNK_CHARS: usize = 50;

/// Ventana objetivo de tamaño de chunk en caracteres.
pub const CHUNK_TARGET_MIN: usize = 500;
pub const CHUNK_TARGET_MAX: usize = 1500;

/// Ventana de tamaños aceptados para imágenes embebidas (px).
pub const MIN_IMAGE_SIZE: u32 = 100;
pub const MAX_IMAGE_SIZE: u32 = 5000;

/// TTL del cache de políticas de reintento.
pub const RETRY_POLICY_CACHE_TTL_SECS: u64 = 60;

/// Concurrencia por defecto para lotes dentro de un stage (OCR, embeddings).
pub const DEFAULT_STAGE_CONCURRENCY: usize = 4;
