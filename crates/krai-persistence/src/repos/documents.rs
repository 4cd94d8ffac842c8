//! Repositorio de `krai_core.documents`.
use std::sync::Arc;
use std::time::Instant;

use sqlx::{PgPool, Row};
use uuid::Uuid;

use krai_domain::{Document, DocumentType};

use krai_core::PerformanceCollector;

use crate::error::PersistenceError;

#[derive(Clone)]
pub struct DocumentRepository {
    pool: PgPool,
    collector: Option<Arc<PerformanceCollector>>,
}

impl DocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool,
               collector: None }
    }

    pub fn with_collector(mut self, collector: Arc<PerformanceCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    fn record(&self, name: &str, started: Instant) {
        if let Some(c) = &self.collector {
            c.record_call(name, started.elapsed());
        }
    }

    /// Dedupe por contenido: busca un documento con el mismo SHA-256.
    pub async fn find_by_hash(&self, file_hash: &str) -> Result<Option<Document>, PersistenceError> {
        let started = Instant::now();
        let row = sqlx::query("SELECT * FROM krai_core.documents WHERE file_hash = $1").bind(file_hash)
                                                                                       .fetch_optional(&self.pool)
                                                                                       .await?;
        self.record("db:documents.find_by_hash", started);
        row.map(row_to_document).transpose()
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Document>, PersistenceError> {
        let row = sqlx::query("SELECT * FROM krai_core.documents WHERE id = $1").bind(id)
                                                                                .fetch_optional(&self.pool)
                                                                                .await?;
        row.map(row_to_document).transpose()
    }

    pub async fn insert(&self, doc: &Document) -> Result<(), PersistenceError> {
        let started = Instant::now();
        let stage_status = serde_json::to_string(&doc.stage_status)?;
        let metadata = serde_json::to_string(&doc.metadata)?;
        sqlx::query("INSERT INTO krai_core.documents \
                     (id, file_hash, filename, original_filename, storage_path, page_count, document_type, language, \
                      version, manufacturer_id, series_id, stage_status, metadata, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12::jsonb, $13::jsonb, $14, $15)")
            .bind(doc.id)
            .bind(&doc.file_hash)
            .bind(&doc.filename)
            .bind(&doc.original_filename)
            .bind(&doc.storage_path)
            .bind(doc.page_count)
            .bind(doc.document_type.as_str())
            .bind(&doc.language)
            .bind(&doc.version)
            .bind(doc.manufacturer_id)
            .bind(doc.series_id)
            .bind(stage_status)
            .bind(metadata)
            .bind(doc.created_at)
            .bind(doc.updated_at)
            .execute(&self.pool)
            .await?;
        self.record("db:documents.insert", started);
        Ok(())
    }

    /// Resultado de clasificación (S4): fabricante/serie detectados.
    pub async fn set_classification(&self, id: Uuid, manufacturer_id: Option<Uuid>, series_id: Option<Uuid>) -> Result<(), PersistenceError> {
        sqlx::query("UPDATE krai_core.documents SET manufacturer_id = $2, series_id = $3, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(manufacturer_id)
            .bind(series_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Versión del documento detectada en metadata (S5).
    pub async fn set_version(&self, id: Uuid, version: &str) -> Result<(), PersistenceError> {
        sqlx::query("UPDATE krai_core.documents SET version = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(version)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_document(row: sqlx::postgres::PgRow) -> Result<Document, PersistenceError> {
    let file_hash: String = row.try_get("file_hash")?;
    let document_type: String = row.try_get("document_type")?;
    Ok(Document { id: row.try_get("id")?,
                  file_hash: file_hash.trim().to_string(),
                  filename: row.try_get("filename")?,
                  original_filename: row.try_get("original_filename")?,
                  storage_path: row.try_get("storage_path")?,
                  page_count: row.try_get("page_count")?,
                  document_type: DocumentType::parse(&document_type),
                  language: row.try_get("language")?,
                  version: row.try_get("version")?,
                  manufacturer_id: row.try_get("manufacturer_id")?,
                  series_id: row.try_get("series_id")?,
                  stage_status: row.try_get("stage_status")?,
                  metadata: row.try_get("metadata")?,
                  created_at: row.try_get("created_at")?,
                  updated_at: row.try_get("updated_at")? })
}
