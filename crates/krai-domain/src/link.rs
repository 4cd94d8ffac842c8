//! Enlaces y videos extraídos del texto y anotaciones del PDF.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    Pending,
    Scraped,
    Failed,
    Skipped,
}

impl ScrapeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeStatus::Pending => "pending",
            ScrapeStatus::Scraped => "scraped",
            ScrapeStatus::Failed => "failed",
            ScrapeStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: Uuid,
    pub document_id: Uuid,
    pub url: String,
    pub page_number: i32,
    /// "text" (detectado en el cuerpo) o "annotation" (anotación PDF).
    pub link_type: String,
    pub scrape_status: ScrapeStatus,
    pub scraped_content: Option<String>,
    pub related_chunks: Vec<Uuid>,
    pub metadata: serde_json::Value,
}

impl Link {
    pub fn new(document_id: Uuid, url: &str, page_number: i32, link_type: &str) -> Self {
        Link { id: Uuid::new_v4(),
               document_id,
               url: url.to_string(),
               page_number,
               link_type: link_type.to_string(),
               scrape_status: ScrapeStatus::Pending,
               scraped_content: None,
               related_chunks: Vec::new(),
               metadata: serde_json::json!({}) }
    }
}

/// Plataformas de video con enriquecimiento soportado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoPlatform {
    Youtube,
    Vimeo,
    Brightcove,
}

impl VideoPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoPlatform::Youtube => "youtube",
            VideoPlatform::Vimeo => "vimeo",
            VideoPlatform::Brightcove => "brightcove",
        }
    }
}

/// Video identificado en el documento; la dedupe es por (platform, platform_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: Uuid,
    pub document_id: Uuid,
    pub url: String,
    pub platform: VideoPlatform,
    pub platform_id: String,
    pub title: Option<String>,
    pub page_number: i32,
    pub metadata: serde_json::Value,
}
