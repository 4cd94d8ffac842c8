//! Repositorio de `krai_parts.parts_catalog`.
use sqlx::PgPool;
use uuid::Uuid;

use krai_domain::Part;

use crate::error::PersistenceError;

#[derive(Clone)]
pub struct PartsRepository {
    pool: PgPool,
}

impl PartsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert por (document_id, part_number); los links a error codes se
    /// fusionan con los existentes.
    pub async fn upsert_parts(&self, parts: &[Part]) -> Result<(), PersistenceError> {
        for part in parts {
            sqlx::query("INSERT INTO krai_parts.parts_catalog \
                         (id, document_id, part_number, description, linked_error_codes) \
                         VALUES ($1, $2, $3, $4, $5) \
                         ON CONFLICT (document_id, part_number) \
                         DO UPDATE SET description = COALESCE(EXCLUDED.description, krai_parts.parts_catalog.description), \
                                       linked_error_codes = (SELECT ARRAY(SELECT DISTINCT unnest(krai_parts.parts_catalog.linked_error_codes || EXCLUDED.linked_error_codes)))")
                .bind(part.id)
                .bind(part.document_id)
                .bind(&part.part_number)
                .bind(&part.description)
                .bind(&part.linked_error_codes)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn count_parts(&self, document_id: Uuid) -> Result<i64, PersistenceError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM krai_parts.parts_catalog WHERE document_id = $1")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}
