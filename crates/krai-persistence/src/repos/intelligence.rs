//! Repositorio de `krai_intelligence`: chunks, embeddings unificados, error
//! codes, analytics y tablas estructuradas (opcionales).
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::warn;
use pgvector::Vector;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use krai_core::constants::EMBEDDING_DIM;
use krai_core::PerformanceCollector;
use krai_domain::{Chunk, ErrorCode, Severity};

use crate::error::PersistenceError;

pub struct IntelligenceRepository {
    pool: PgPool,
    collector: Option<Arc<PerformanceCollector>>,
    /// `krai_intelligence.structured_tables` es opcional por despliegue: al
    /// primer 42P01 se deshabilita sin más ruido.
    structured_tables_disabled: AtomicBool,
}

impl IntelligenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool,
               collector: None,
               structured_tables_disabled: AtomicBool::new(false) }
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

    pub async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), PersistenceError> {
        let started = Instant::now();
        for chunk in chunks {
            let metadata = serde_json::to_string(&chunk.metadata)?;
            sqlx::query("INSERT INTO krai_intelligence.chunks \
                         (id, document_id, chunk_index, page_number, text, section_hierarchy, \
                          previous_chunk_id, next_chunk_id, metadata) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::jsonb) \
                         ON CONFLICT (document_id, chunk_index) \
                         DO UPDATE SET text = EXCLUDED.text, \
                                       section_hierarchy = EXCLUDED.section_hierarchy, \
                                       previous_chunk_id = EXCLUDED.previous_chunk_id, \
                                       next_chunk_id = EXCLUDED.next_chunk_id, \
                                       metadata = EXCLUDED.metadata")
                .bind(chunk.id)
                .bind(chunk.document_id)
                .bind(chunk.chunk_index)
                .bind(chunk.page_number)
                .bind(&chunk.text)
                .bind(&chunk.section_hierarchy)
                .bind(chunk.previous_chunk_id)
                .bind(chunk.next_chunk_id)
                .bind(metadata)
                .execute(&self.pool)
                .await?;
        }
        self.record("db:chunks.insert", started);
        Ok(())
    }

    pub async fn fetch_chunks(&self, document_id: Uuid) -> Result<Vec<Chunk>, PersistenceError> {
        let rows = sqlx::query("SELECT id, document_id, chunk_index, page_number, text, section_hierarchy, \
                                       previous_chunk_id, next_chunk_id, metadata \
                                FROM krai_intelligence.chunks WHERE document_id = $1 ORDER BY chunk_index")
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?;
        let mut chunks = Vec::with_capacity(rows.len());
        for row in rows {
            chunks.push(Chunk { id: row.try_get("id")?,
                                document_id: row.try_get("document_id")?,
                                chunk_index: row.try_get("chunk_index")?,
                                page_number: row.try_get("page_number")?,
                                text: row.try_get("text")?,
                                section_hierarchy: row.try_get("section_hierarchy")?,
                                previous_chunk_id: row.try_get("previous_chunk_id")?,
                                next_chunk_id: row.try_get("next_chunk_id")?,
                                metadata: row.try_get("metadata")? });
        }
        Ok(chunks)
    }

    /// Embedding de texto: actualiza la columna del chunk Y la tabla unificada
    /// en la misma transacción.
    pub async fn store_chunk_embedding(&self, chunk: &Chunk, embedding: Vec<f32>, model: &str) -> Result<(), PersistenceError> {
        debug_assert_eq!(embedding.len(), EMBEDDING_DIM);
        let started = Instant::now();
        let native_dim = embedding.len() as i32;
        let vector = Vector::from(embedding);
        let metadata = serde_json::to_string(&serde_json::json!({
            "document_id": chunk.document_id,
            "page_number": chunk.page_number,
        }))?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE krai_intelligence.chunks SET embedding = $2 WHERE id = $1")
            .bind(chunk.id)
            .bind(&vector)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO krai_intelligence.unified_embeddings \
                     (source_kind, source_id, embedding, native_dim, model, metadata) \
                     VALUES ('text_chunk', $1, $2, $3, $4, $5::jsonb) \
                     ON CONFLICT (source_kind, source_id, model) \
                     DO UPDATE SET embedding = EXCLUDED.embedding, native_dim = EXCLUDED.native_dim")
            .bind(chunk.id)
            .bind(&vector)
            .bind(native_dim)
            .bind(model)
            .bind(metadata)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        self.record("db:embeddings.store_chunk", started);
        Ok(())
    }

    /// Embedding visual o de tabla, ya ajustado a la dimensión fija; la
    /// dimensión nativa del modelo queda en `native_dim`/metadata.
    pub async fn store_unified_embedding(&self,
                                         source_kind: &str,
                                         source_id: Uuid,
                                         embedding: Vec<f32>,
                                         native_dim: usize,
                                         model: &str,
                                         metadata: serde_json::Value)
                                         -> Result<(), PersistenceError> {
        debug_assert_eq!(embedding.len(), EMBEDDING_DIM);
        let started = Instant::now();
        let metadata = serde_json::to_string(&metadata)?;
        sqlx::query("INSERT INTO krai_intelligence.unified_embeddings \
                     (source_kind, source_id, embedding, native_dim, model, metadata) \
                     VALUES ($1, $2, $3, $4, $5, $6::jsonb) \
                     ON CONFLICT (source_kind, source_id, model) \
                     DO UPDATE SET embedding = EXCLUDED.embedding, native_dim = EXCLUDED.native_dim, \
                                   metadata = EXCLUDED.metadata")
            .bind(source_kind)
            .bind(source_id)
            .bind(Vector::from(embedding))
            .bind(native_dim as i32)
            .bind(model)
            .bind(metadata)
            .execute(&self.pool)
            .await?;
        self.record("db:embeddings.store_unified", started);
        Ok(())
    }

    pub async fn count_embeddings_for_document(&self, document_id: Uuid) -> Result<i64, PersistenceError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM krai_intelligence.unified_embeddings \
                                         WHERE metadata->>'document_id' = $1")
            .bind(document_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn insert_error_codes(&self, codes: &[ErrorCode]) -> Result<(), PersistenceError> {
        for ec in codes {
            sqlx::query("INSERT INTO krai_intelligence.error_codes \
                         (id, document_id, chunk_id, code, description, solution_text, context_text, severity, \
                          confidence, page_number, related_images, related_parts) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
                         ON CONFLICT (document_id, code, page_number) \
                         DO UPDATE SET description = EXCLUDED.description, \
                                       solution_text = EXCLUDED.solution_text, \
                                       severity = EXCLUDED.severity, \
                                       confidence = EXCLUDED.confidence, \
                                       related_images = EXCLUDED.related_images, \
                                       related_parts = EXCLUDED.related_parts")
                .bind(ec.id)
                .bind(ec.document_id)
                .bind(ec.chunk_id)
                .bind(&ec.code)
                .bind(&ec.description)
                .bind(&ec.solution_text)
                .bind(&ec.context_text)
                .bind(ec.severity.as_str())
                .bind(ec.confidence)
                .bind(ec.page_number)
                .bind(&ec.related_images)
                .bind(&ec.related_parts)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn fetch_error_codes(&self, document_id: Uuid) -> Result<Vec<ErrorCode>, PersistenceError> {
        let rows = sqlx::query("SELECT * FROM krai_intelligence.error_codes WHERE document_id = $1 ORDER BY page_number")
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let severity: String = row.try_get("severity")?;
            out.push(ErrorCode { id: row.try_get("id")?,
                                 document_id: row.try_get("document_id")?,
                                 chunk_id: row.try_get("chunk_id")?,
                                 code: row.try_get("code")?,
                                 description: row.try_get("description")?,
                                 solution_text: row.try_get("solution_text")?,
                                 context_text: row.try_get("context_text")?,
                                 severity: Severity::parse(&severity),
                                 confidence: row.try_get("confidence")?,
                                 page_number: row.try_get("page_number")?,
                                 related_images: row.try_get("related_images")?,
                                 related_parts: row.try_get("related_parts")? });
        }
        Ok(out)
    }

    /// Fila de analytics por consulta de búsqueda.
    pub async fn record_search(&self, query: &str, duration_ms: u64, result_count: usize, filters: serde_json::Value) -> Result<(), PersistenceError> {
        let filters = serde_json::to_string(&filters)?;
        sqlx::query("INSERT INTO krai_intelligence.search_analytics (query, duration_ms, result_count, filters) \
                     VALUES ($1, $2, $3, $4::jsonb)")
            .bind(query)
            .bind(duration_ms as i64)
            .bind(result_count as i32)
            .bind(filters)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Similaridad coseno vía `<=>` de pgvector sobre la tabla unificada,
    /// filtrada por source_kind.
    pub async fn similarity_search(&self, query_embedding: Vec<f32>, source_kind: &str, limit: i64) -> Result<Vec<(Uuid, f64)>, PersistenceError> {
        let started = Instant::now();
        let rows = sqlx::query("SELECT source_id, (embedding <=> $1)::float8 AS distance \
                                FROM krai_intelligence.unified_embeddings \
                                WHERE source_kind = $2 \
                                ORDER BY embedding <=> $1 \
                                LIMIT $3")
            .bind(Vector::from(query_embedding))
            .bind(source_kind)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        self.record("db:embeddings.similarity_search", started);
        rows.into_iter()
            .map(|row| Ok((row.try_get("source_id")?, row.try_get("distance")?)))
            .collect()
    }

    /// Inserta una tabla estructurada si el despliegue tiene la tabla
    /// destino; con 42P01 la feature se apaga (una sola advertencia).
    /// Devuelve el id insertado, o None si la feature está deshabilitada.
    pub async fn insert_structured_table(&self, document_id: Uuid, page_number: i32, markdown: &str, context: &str) -> Result<Option<Uuid>, PersistenceError> {
        if self.structured_tables_disabled.load(Ordering::Relaxed) {
            return Ok(None);
        }
        let id = Uuid::new_v4();
        let res = sqlx::query("INSERT INTO krai_intelligence.structured_tables \
                               (id, document_id, page_number, markdown, context) \
                               VALUES ($1, $2, $3, $4, $5)")
            .bind(id)
            .bind(document_id)
            .bind(page_number)
            .bind(markdown)
            .bind(context)
            .execute(&self.pool)
            .await
            .map_err(PersistenceError::from);
        match res {
            Ok(_) => Ok(Some(id)),
            Err(PersistenceError::MissingObject(m)) => {
                if !self.structured_tables_disabled.swap(true, Ordering::Relaxed) {
                    warn!("structured_tables missing ({m}); structured-table storage disabled for this process");
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Sube el p95 actual de una métrica como baseline de rendimiento.
    pub async fn upsert_performance_baseline(&self, metric_name: &str, p95_ms: f64, sample_count: u64) -> Result<(), PersistenceError> {
        sqlx::query("INSERT INTO krai_system.performance_baselines (metric_name, p95_ms, sample_count) \
                     VALUES ($1, $2, $3) \
                     ON CONFLICT (metric_name) \
                     DO UPDATE SET p95_ms = EXCLUDED.p95_ms, sample_count = EXCLUDED.sample_count, recorded_at = now()")
            .bind(metric_name)
            .bind(p95_ms)
            .bind(sample_count as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
