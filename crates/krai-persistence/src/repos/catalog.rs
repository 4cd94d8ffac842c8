//! Repositorio del catálogo canónico (fabricantes, series, productos).
use sqlx::PgPool;
use uuid::Uuid;

use krai_domain::Product;

use crate::error::PersistenceError;

#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert por nombre canónico; los aliases nuevos reemplazan los previos.
    pub async fn upsert_manufacturer(&self, name: &str, aliases: &[String]) -> Result<Uuid, PersistenceError> {
        let id: Uuid = sqlx::query_scalar("INSERT INTO krai_core.manufacturers (name, aliases) VALUES ($1, $2) \
                                           ON CONFLICT (name) DO UPDATE SET aliases = EXCLUDED.aliases \
                                           RETURNING id")
            .bind(name)
            .bind(aliases)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn get_or_create_series(&self, manufacturer_id: Uuid, name: &str) -> Result<Uuid, PersistenceError> {
        let id: Uuid = sqlx::query_scalar("INSERT INTO krai_core.series (manufacturer_id, name) VALUES ($1, $2) \
                                           ON CONFLICT (manufacturer_id, name) DO UPDATE SET name = EXCLUDED.name \
                                           RETURNING id")
            .bind(manufacturer_id)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    /// Upsert por (manufacturer_id, model_number); conserva el id existente.
    pub async fn upsert_product(&self, product: &Product) -> Result<Uuid, PersistenceError> {
        let product_type = serde_json::to_value(product.product_type)?;
        let metadata = serde_json::to_string(&product.metadata)?;
        let id: Uuid = sqlx::query_scalar("INSERT INTO krai_core.products \
                                           (id, manufacturer_id, series_id, model_number, product_type, metadata) \
                                           VALUES ($1, $2, $3, $4, $5, $6::jsonb) \
                                           ON CONFLICT (manufacturer_id, model_number) \
                                           DO UPDATE SET series_id = COALESCE(EXCLUDED.series_id, krai_core.products.series_id), \
                                                         product_type = EXCLUDED.product_type, \
                                                         metadata = krai_core.products.metadata || EXCLUDED.metadata \
                                           RETURNING id")
            .bind(product.id)
            .bind(product.manufacturer_id)
            .bind(product.series_id)
            .bind(&product.model_number)
            .bind(product_type.as_str().unwrap_or("unknown").to_string())
            .bind(metadata)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    /// Relación M:N producto ↔ accesorio.
    pub async fn link_accessory(&self, product_id: Uuid, accessory_id: Uuid, is_standard: bool, compatibility_notes: Option<&str>) -> Result<(), PersistenceError> {
        sqlx::query("INSERT INTO krai_core.product_accessories (product_id, accessory_id, is_standard, compatibility_notes) \
                     VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (product_id, accessory_id) \
                     DO UPDATE SET is_standard = EXCLUDED.is_standard, \
                                   compatibility_notes = COALESCE(EXCLUDED.compatibility_notes, krai_core.product_accessories.compatibility_notes)")
            .bind(product_id)
            .bind(accessory_id)
            .bind(is_standard)
            .bind(compatibility_notes)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
