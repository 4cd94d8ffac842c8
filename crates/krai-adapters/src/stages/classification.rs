//! S4 — Classification: detección de fabricante/serie/productos.
//!
//! Prioridad de detección de fabricante (gana el primer no-vacío):
//! 1. Prefijo del filename ("HP_", "KM_").
//! 2. Título del PDF.
//! 3. Escaneo de las primeras 3 + últimas 2 páginas (aliases con borde de
//!    palabra; los alias cortos sólo si están en whitelist).
//! 4. Clasificación por LLM sobre chunks muestreados.
//! 5. Parse del contenido del filename (regexes de modelo).
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use serde_json::json;

use krai_core::{ProcessingContext, Stage, StageError, StageProcessor, StageSuccess};
use krai_domain::Product;
use krai_persistence::{CatalogRepository, DocumentRepository};
use krai_providers::AiService;

use crate::patterns;

/// Descubrimiento de productos vía web (Perplexity/El buscador que sea),
/// pluggable y opcional; sus fallos jamás tiran el stage.
#[async_trait]
pub trait ProductDiscovery: Send + Sync {
    async fn discover(&self, manufacturer: &str, model: &str) -> Result<serde_json::Value, StageError>;
}

pub struct ClassificationStage {
    documents: DocumentRepository,
    catalog: CatalogRepository,
    ai: Option<Arc<dyn AiService>>,
    discovery: Option<Arc<dyn ProductDiscovery>>,
}

impl ClassificationStage {
    pub fn new(documents: DocumentRepository, catalog: CatalogRepository, ai: Option<Arc<dyn AiService>>) -> Self {
        Self { documents,
               catalog,
               ai,
               discovery: None }
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn ProductDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Texto combinado de las primeras 3 y últimas 2 páginas, en ese orden:
    /// lo primero que aparezca ahí define el fabricante.
    fn boundary_pages_text(ctx: &ProcessingContext) -> String {
        let pages: Vec<i32> = ctx.page_texts.keys().copied().collect();
        let mut selected: Vec<i32> = pages.iter().take(3).copied().collect();
        if pages.len() > 3 {
            let tail: Vec<i32> = pages.iter().rev().take(2).rev().copied().collect();
            for p in tail {
                if !selected.contains(&p) {
                    selected.push(p);
                }
            }
        }
        selected.iter()
                .filter_map(|p| ctx.page_texts.get(p))
                .cloned()
                .collect::<Vec<_>>()
                .join("\n")
    }

    async fn ai_manufacturer(&self, ctx: &ProcessingContext) -> Option<String> {
        let ai = self.ai.as_ref()?;
        // Muestra de chunks repartida por el documento.
        let sample: Vec<&str> = ctx.chunks
                                   .iter()
                                   .step_by((ctx.chunks.len() / 5).max(1))
                                   .take(5)
                                   .map(|c| c.text.as_str())
                                   .collect();
        if sample.is_empty() {
            return None;
        }
        let prompt = format!("Identify the office-equipment manufacturer of this service documentation. \
                              Answer with JSON: {{\"manufacturer\": \"<name or null>\"}}.\n\n{}",
                             sample.join("\n---\n"));
        match ai.complete(&prompt).await {
            Ok(answer) => serde_json::from_str::<serde_json::Value>(&answer).ok()
                                                                            .and_then(|v| v.get("manufacturer").and_then(|m| m.as_str()).map(String::from))
                                                                            .and_then(|name| patterns::manufacturer_in_text(&name).map(String::from)),
            Err(e) => {
                warn!("classification: ai fallback failed: {e}");
                None
            }
        }
    }

    fn detect_manufacturer_sync(ctx: &ProcessingContext) -> Option<String> {
        // 1. Prefijo de filename.
        if let Some(m) = patterns::manufacturer_from_filename_prefix(&ctx.original_filename) {
            return Some(m.to_string());
        }
        // 2. Título del PDF.
        if let Some(title) = &ctx.pdf_title {
            if let Some(m) = patterns::manufacturer_in_text(title) {
                return Some(m.to_string());
            }
        }
        // 3. Primeras 3 + últimas 2 páginas.
        let boundary = Self::boundary_pages_text(ctx);
        if let Some(m) = patterns::manufacturer_in_text(&boundary) {
            return Some(m.to_string());
        }
        None
    }
}

#[async_trait]
impl StageProcessor for ClassificationStage {
    fn stage(&self) -> Stage {
        Stage::Classification
    }

    fn service_name(&self) -> &str {
        "ollama"
    }

    fn context_fingerprint(&self, ctx: &ProcessingContext) -> serde_json::Value {
        json!({
            "file_hash": ctx.file_hash,
            "filename": ctx.original_filename,
        })
    }

    async fn process(&self, ctx: &mut ProcessingContext) -> Result<StageSuccess, StageError> {
        // Prioridades 1..3 (sin IO), 4 (LLM), 5 (filename content).
        let mut manufacturer = Self::detect_manufacturer_sync(ctx);
        if manufacturer.is_none() {
            manufacturer = self.ai_manufacturer(ctx).await;
        }
        if manufacturer.is_none() {
            manufacturer = patterns::manufacturer_in_text(&ctx.original_filename).map(String::from);
        }

        let Some(manufacturer) = manufacturer else {
            info!("classification: doc={} no manufacturer detected", ctx.document_id);
            return Ok(StageSuccess::Done(json!({"manufacturer": null, "products": 0})));
        };

        // Catálogo: upsert del fabricante con sus aliases conocidos.
        let aliases = patterns::aliases_of(&manufacturer);
        let manufacturer_id = self.catalog
                                  .upsert_manufacturer(&manufacturer, &aliases)
                                  .await
                                  .map_err(StageError::from)?;

        // Modelos en texto completo + filename; serie por detector.
        let full_text: String = ctx.page_texts.values().cloned().collect::<Vec<_>>().join("\n");
        let mut models = patterns::extract_models(&manufacturer, &full_text);
        for m in patterns::extract_models(&manufacturer, &ctx.original_filename) {
            if !models.contains(&m) {
                models.push(m);
            }
        }

        let mut series_id = None;
        let mut series_name = None;
        let mut product_count = 0usize;
        for model in &models {
            let series = patterns::detect_series(&manufacturer, model);
            let sid = match series {
                Some(name) => {
                    let id = self.catalog.get_or_create_series(manufacturer_id, name).await.map_err(StageError::from)?;
                    if series_id.is_none() {
                        series_id = Some(id);
                        series_name = Some(name.to_string());
                    }
                    Some(id)
                }
                None => None,
            };
            let mut product = Product::new(manufacturer_id, model, patterns::guess_product_type(&manufacturer, model))?;
            product.series_id = sid;
            let product_id = self.catalog.upsert_product(&product).await.map_err(StageError::from)?;
            product.id = product_id;
            product_count += 1;

            // Descubrimiento web opcional: enriquece metadata del producto;
            // cualquier fallo degrada con un warn.
            if let Some(discovery) = &self.discovery {
                match discovery.discover(&manufacturer, model).await {
                    Ok(specs) if !specs.is_null() => {
                        product.metadata = specs;
                        let _ = self.catalog.upsert_product(&product).await;
                    }
                    Ok(_) => {}
                    Err(e) => warn!("classification: product discovery failed for {model}: {e}"),
                }
            }
            ctx.products.push(product);
        }

        self.documents
            .set_classification(ctx.document_id, Some(manufacturer_id), series_id)
            .await
            .map_err(StageError::from)?;

        info!("classification: doc={} manufacturer={} models={}",
              ctx.document_id,
              manufacturer,
              models.len());
        ctx.manufacturer = Some(manufacturer.clone());
        ctx.manufacturer_id = Some(manufacturer_id);
        ctx.series_id = series_id;
        ctx.series_name = series_name.clone();

        Ok(StageSuccess::Done(json!({
            "manufacturer": manufacturer,
            "series": series_name,
            "products": product_count,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn ctx_with_pages(filename: &str, pages: &[(i32, &str)]) -> ProcessingContext {
        let mut ctx = ProcessingContext::new(Uuid::new_v4(), "req", PathBuf::from("/tmp/x.pdf"), filename);
        for (p, t) in pages {
            ctx.page_texts.insert(*p, t.to_string());
        }
        ctx
    }

    #[test]
    fn filename_prefix_wins_over_pages() {
        let ctx = ctx_with_pages("KM_C759_SM.pdf", &[(1, "HP Inc. all over this page")]);
        assert_eq!(ClassificationStage::detect_manufacturer_sync(&ctx).as_deref(),
                   Some("Konica Minolta"));
    }

    #[test]
    fn first_pages_beat_last_pages() {
        // Primera página dice HP, última Canon: gana HP por orden de armado
        // del texto de frontera.
        let pages: Vec<(i32, String)> = (1..=12).map(|p| {
                                                    let text = match p {
                                                        1 => "HP Inc. service documentation".to_string(),
                                                        12 => "Printed by Canon Ltd.".to_string(),
                                                        _ => format!("page {p} body"),
                                                    };
                                                    (p, text)
                                                })
                                                .collect();
        let refs: Vec<(i32, &str)> = pages.iter().map(|(p, t)| (*p, t.as_str())).collect();
        let ctx = ctx_with_pages("servicemanual.pdf", &refs);
        assert_eq!(ClassificationStage::detect_manufacturer_sync(&ctx).as_deref(), Some("HP"));
    }

    #[test]
    fn no_signal_yields_none() {
        let ctx = ctx_with_pages("servicemanual.pdf", &[(1, "generic text with no brands")]);
        assert_eq!(ClassificationStage::detect_manufacturer_sync(&ctx), None);
    }
}
