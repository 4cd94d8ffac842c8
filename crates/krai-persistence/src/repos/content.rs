//! Repositorio de `krai_content` (imágenes, links, videos).
use sqlx::PgPool;
use uuid::Uuid;

use krai_domain::{ExtractedImage, Link, Video};

use crate::error::PersistenceError;

#[derive(Clone)]
pub struct ContentRepository {
    pool: PgPool,
}

impl ContentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert por (document_id, page_number, sha256): una re-corrida actualiza
    /// OCR/descripción sin duplicar filas.
    pub async fn upsert_image(&self, image: &ExtractedImage, storage_url: &str) -> Result<(), PersistenceError> {
        let bbox = match &image.bbox {
            Some(b) => Some(serde_json::to_string(b)?),
            None => None,
        };
        sqlx::query("INSERT INTO krai_content.images \
                     (id, document_id, page_number, sha256, storage_key, storage_url, mime, width, height, bbox, \
                      ocr_text, ocr_confidence, ai_description, original_filename, related_chunks) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10::jsonb, $11, $12, $13, $14, $15) \
                     ON CONFLICT (document_id, page_number, sha256) \
                     DO UPDATE SET storage_url = EXCLUDED.storage_url, \
                                   ocr_text = EXCLUDED.ocr_text, \
                                   ocr_confidence = EXCLUDED.ocr_confidence, \
                                   ai_description = EXCLUDED.ai_description, \
                                   related_chunks = EXCLUDED.related_chunks")
            .bind(image.id)
            .bind(image.document_id)
            .bind(image.page_number)
            .bind(&image.sha256)
            .bind(image.storage_key())
            .bind(storage_url)
            .bind(&image.mime)
            .bind(image.width as i32)
            .bind(image.height as i32)
            .bind(bbox)
            .bind(&image.ocr_text)
            .bind(image.ocr_confidence)
            .bind(&image.ai_description)
            .bind(&image.original_filename)
            .bind(&image.related_chunks)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_images(&self, document_id: Uuid) -> Result<i64, PersistenceError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM krai_content.images WHERE document_id = $1")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn insert_links(&self, links: &[Link]) -> Result<(), PersistenceError> {
        for link in links {
            let metadata = serde_json::to_string(&link.metadata)?;
            sqlx::query("INSERT INTO krai_content.links \
                         (id, document_id, url, page_number, link_type, scrape_status, scraped_content, related_chunks, metadata) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::jsonb) \
                         ON CONFLICT (document_id, page_number, url) \
                         DO UPDATE SET scrape_status = EXCLUDED.scrape_status, \
                                       scraped_content = EXCLUDED.scraped_content, \
                                       related_chunks = EXCLUDED.related_chunks, \
                                       metadata = EXCLUDED.metadata")
                .bind(link.id)
                .bind(link.document_id)
                .bind(&link.url)
                .bind(link.page_number)
                .bind(&link.link_type)
                .bind(link.scrape_status.as_str())
                .bind(&link.scraped_content)
                .bind(&link.related_chunks)
                .bind(metadata)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Dedupe por (document_id, platform, platform_id).
    pub async fn upsert_videos(&self, videos: &[Video]) -> Result<(), PersistenceError> {
        for video in videos {
            let metadata = serde_json::to_string(&video.metadata)?;
            sqlx::query("INSERT INTO krai_content.videos \
                         (id, document_id, url, platform, platform_id, title, page_number, metadata) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8::jsonb) \
                         ON CONFLICT (document_id, platform, platform_id) \
                         DO UPDATE SET title = COALESCE(EXCLUDED.title, krai_content.videos.title), \
                                       metadata = EXCLUDED.metadata")
                .bind(video.id)
                .bind(video.document_id)
                .bind(&video.url)
                .bind(video.platform.as_str())
                .bind(&video.platform_id)
                .bind(&video.title)
                .bind(video.page_number)
                .bind(metadata)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}
