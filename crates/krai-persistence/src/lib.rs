//! Implementaciones Postgres (sqlx) de los contratos del core.
//!
//! Objetivo general del módulo:
//! - Un único pool async compartido por todo el proceso; cada llamada usa
//!   `&pool` (checkout implícito) o `pool.acquire()` cuando necesita sesión
//!   propia (advisory locks).
//! - Paridad 1:1 con los stores en memoria del core: mismo contrato
//!   observable para marcadores, registro de errores y políticas.
//! - Parámetros JSONB siempre serializados como string y casteados con
//!   `::jsonb` en el SQL (nunca confiar en conversión automática del driver).
//! - Esquemas: `krai_core` (documentos y catálogo), `krai_content`
//!   (imágenes/links/videos), `krai_intelligence` (chunks, embeddings,
//!   error codes, analytics), `krai_system` (errores del pipeline,
//!   marcadores, políticas), `krai_parts` (catálogo de partes).

pub mod config;
pub mod error;
pub mod errorlog;
pub mod locks;
pub mod markers;
pub mod policies;
pub mod pool;
pub mod repos;
pub mod tracker;

pub use config::DbConfig;
pub use error::PersistenceError;
pub use errorlog::PgErrorLog;
pub use locks::AdvisoryLock;
pub use markers::PgCompletionStore;
pub use policies::PgRetryPolicyStore;
pub use pool::{build_pool, build_pool_from_env};
pub use repos::{CatalogRepository, ContentRepository, DocumentRepository, IntelligenceRepository, PartsRepository};
pub use tracker::StageTracker;
