//! S9 — Link/Video: extracción de enlaces del texto y anotaciones, limpieza,
//! resolución de redirects y dedupe de videos por id de plataforma.
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use url::Url;
use uuid::Uuid;

use krai_core::{ProcessingContext, Stage, StageError, StageProcessor, StageSuccess};
use krai_domain::{Link, Video, VideoPlatform};
use krai_persistence::ContentRepository;

use crate::pdf::PdfFile;

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s<>"')\]}]+"#).unwrap());
static YOUTUBE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/)([A-Za-z0-9_-]{6,20})").unwrap());
static VIMEO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"vimeo\.com/(\d+)").unwrap());
static BRIGHTCOVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"players\.brightcove\.net/(\d+)").unwrap());

/// Metadata de video vía API de plataforma (opcional, pluggable).
#[async_trait]
pub trait VideoMetadataClient: Send + Sync {
    async fn title_of(&self, platform: VideoPlatform, platform_id: &str) -> Result<Option<String>, StageError>;
}

pub struct LinkStage {
    content: ContentRepository,
    http: Option<reqwest::Client>,
    video_metadata: Option<Arc<dyn VideoMetadataClient>>,
}

impl LinkStage {
    pub fn new(content: ContentRepository, resolve_redirects: bool) -> Self {
        Self { content,
               http: resolve_redirects.then(reqwest::Client::new),
               video_metadata: None }
    }

    pub fn with_video_metadata(mut self, client: Arc<dyn VideoMetadataClient>) -> Self {
        self.video_metadata = Some(client);
        self
    }

    /// Limpia puntuación colgante típica de texto extraído ("...)." etc.).
    pub fn clean_url(raw: &str) -> Option<String> {
        let trimmed = raw.trim_end_matches(['.', ',', ';', ':', ')', ']', '}', '"', '\'', '>']);
        Url::parse(trimmed).ok().map(|u| u.to_string())
    }

    fn video_of(url: &str) -> Option<(VideoPlatform, String)> {
        if let Some(c) = YOUTUBE_RE.captures(url) {
            return Some((VideoPlatform::Youtube, c[1].to_string()));
        }
        if let Some(c) = VIMEO_RE.captures(url) {
            return Some((VideoPlatform::Vimeo, c[1].to_string()));
        }
        if let Some(c) = BRIGHTCOVE_RE.captures(url) {
            return Some((VideoPlatform::Brightcove, c[1].to_string()));
        }
        None
    }

    async fn resolve_redirect(&self, url: &str) -> Option<String> {
        let client = self.http.as_ref()?;
        match client.head(url).send().await {
            Ok(resp) => {
                let finalized = resp.url().to_string();
                if finalized != url {
                    debug!("link: {url} -> {finalized}");
                    Some(finalized)
                } else {
                    None
                }
            }
            Err(e) => {
                // La resolución es best-effort; el enlace original se guarda
                // igual.
                debug!("link: redirect resolution failed for {url}: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl StageProcessor for LinkStage {
    fn stage(&self) -> Stage {
        Stage::Link
    }

    fn service_name(&self) -> &str {
        "scrape"
    }

    fn context_fingerprint(&self, ctx: &ProcessingContext) -> serde_json::Value {
        json!({"file_hash": ctx.file_hash})
    }

    async fn process(&self, ctx: &mut ProcessingContext) -> Result<StageSuccess, StageError> {
        // 1. URLs del cuerpo del texto por página.
        let mut candidates: Vec<(i32, String, &'static str)> = Vec::new();
        for (&page, text) in &ctx.page_texts {
            for m in URL_RE.find_iter(text) {
                if let Some(url) = Self::clean_url(m.as_str()) {
                    candidates.push((page, url, "text"));
                }
            }
        }

        // 2. Anotaciones Link del PDF.
        if ctx.file_path.exists() {
            if let Ok(pdf) = PdfFile::open(&ctx.file_path) {
                for page in 1..=pdf.page_count() as u32 {
                    for raw in pdf.annotation_links(page) {
                        if let Some(url) = Self::clean_url(&raw) {
                            candidates.push((page as i32, url, "annotation"));
                        }
                    }
                }
            }
        }

        // 3. Dedupe (página, url) + separación de videos por plataforma.
        let mut seen: HashSet<(i32, String)> = HashSet::new();
        let mut links: Vec<Link> = Vec::new();
        let mut videos: Vec<Video> = Vec::new();
        let mut seen_videos: HashSet<(VideoPlatform, String)> = HashSet::new();

        for (page, url, kind) in candidates {
            if !seen.insert((page, url.clone())) {
                continue;
            }
            // Chunks de la misma página.
            let related: Vec<Uuid> = ctx.chunks.iter().filter(|c| c.page_number == page).map(|c| c.id).collect();

            if let Some((platform, platform_id)) = Self::video_of(&url) {
                if !seen_videos.insert((platform, platform_id.clone())) {
                    continue;
                }
                let title = match &self.video_metadata {
                    Some(client) => client.title_of(platform, &platform_id).await.unwrap_or_else(|e| {
                                                                               warn!("link: video metadata failed: {e}");
                                                                               None
                                                                           }),
                    None => None,
                };
                videos.push(Video { id: Uuid::new_v4(),
                                    document_id: ctx.document_id,
                                    url: url.clone(),
                                    platform,
                                    platform_id,
                                    title,
                                    page_number: page,
                                    metadata: json!({"source": kind}) });
                continue;
            }

            let mut link = Link::new(ctx.document_id, &url, page, kind);
            if let Some(resolved) = self.resolve_redirect(&url).await {
                link.metadata = json!({"resolved_url": resolved});
            }
            link.related_chunks = related;
            links.push(link);
        }

        // 4. Persistencia al final del stage.
        self.content.insert_links(&links).await.map_err(StageError::from)?;
        self.content.upsert_videos(&videos).await.map_err(StageError::from)?;

        info!("link: doc={} links={} videos={}", ctx.document_id, links.len(), videos.len());
        ctx.links = links;
        ctx.videos = videos;

        Ok(StageSuccess::Done(json!({
            "link_count": ctx.links.len(),
            "video_count": ctx.videos.len(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_punctuation_is_cleaned() {
        assert_eq!(LinkStage::clean_url("https://support.hp.com/manual)."),
                   Some("https://support.hp.com/manual".to_string()));
        assert_eq!(LinkStage::clean_url("https://example.com/a]."), Some("https://example.com/a".to_string()));
        assert_eq!(LinkStage::clean_url("nota url"), None);
    }

    #[test]
    fn video_platforms_detected_with_ids() {
        assert_eq!(LinkStage::video_of("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
                   Some((VideoPlatform::Youtube, "dQw4w9WgXcQ".to_string())));
        assert_eq!(LinkStage::video_of("https://youtu.be/abc123xyz"),
                   Some((VideoPlatform::Youtube, "abc123xyz".to_string())));
        assert_eq!(LinkStage::video_of("https://vimeo.com/12345678"),
                   Some((VideoPlatform::Vimeo, "12345678".to_string())));
        assert_eq!(LinkStage::video_of("https://example.com/page"), None);
    }
}
