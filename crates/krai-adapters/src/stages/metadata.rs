//! S5 — Metadata: códigos de error, números de parte y versión del documento.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use serde_json::json;

use krai_core::{ProcessingContext, Stage, StageError, StageProcessor, StageSuccess};
use krai_domain::{Chunk, ErrorCode, Part};
use krai_persistence::{DocumentRepository, IntelligenceRepository, PartsRepository};

use crate::patterns;

pub struct MetadataStage {
    documents: DocumentRepository,
    intelligence: Arc<IntelligenceRepository>,
    parts: PartsRepository,
}

/// Ventana de contexto alrededor del match (caracteres hacia cada lado).
const CONTEXT_WINDOW: usize = 300;

impl MetadataStage {
    pub fn new(documents: DocumentRepository, intelligence: Arc<IntelligenceRepository>, parts: PartsRepository) -> Self {
        Self { documents,
               intelligence,
               parts }
    }

    /// Extrae códigos de error de los textos de página con los patrones del
    /// fabricante; el contexto circundante provee descripción y severidad.
    fn extract_error_codes(ctx: &ProcessingContext, manufacturer: &str) -> Vec<ErrorCode> {
        let mut found: HashMap<(String, i32), ErrorCode> = HashMap::new();
        for (&page, text) in &ctx.page_texts {
            for re in patterns::error_code_patterns(manufacturer) {
                for m in re.find_iter(text) {
                    let code = m.as_str().to_string();
                    if found.contains_key(&(code.clone(), page)) {
                        continue;
                    }
                    let context = window(text, m.start(), m.end(), CONTEXT_WINDOW);
                    // La descripción es el resto de la línea del código, o la
                    // línea siguiente si el código cierra la línea.
                    let description = description_near(text, m.end());
                    if description.trim().chars().count() < 10 || context.trim().chars().count() < 50 {
                        continue;
                    }
                    let severity = patterns::infer_severity(&context);
                    let confidence = 0.9_f32;
                    if let Ok(mut ec) = ErrorCode::new(ctx.document_id, &code, &description, &context, severity, confidence, page) {
                        ec.solution_text = solution_near(&context);
                        ec.chunk_id = chunk_for_page(&ctx.chunks, page);
                        found.insert((code, page), ec);
                    }
                }
            }
        }
        let mut out: Vec<ErrorCode> = found.into_values().collect();
        out.sort_by(|a, b| (a.page_number, a.code.clone()).cmp(&(b.page_number, b.code.clone())));
        out
    }

    /// Partes por patrones del fabricante; se enlazan a los códigos de error
    /// cuyo texto de solución las menciona.
    fn extract_parts(ctx: &ProcessingContext, manufacturer: &str, error_codes: &[ErrorCode]) -> Vec<Part> {
        let mut by_number: HashMap<String, Part> = HashMap::new();
        for text in ctx.page_texts.values() {
            for re in patterns::part_patterns(manufacturer) {
                for m in re.find_iter(text) {
                    let number = m.as_str().to_string();
                    if by_number.contains_key(&number) {
                        continue;
                    }
                    if let Ok(part) = Part::new(ctx.document_id, &number) {
                        by_number.insert(number, part);
                    }
                }
            }
        }
        for part in by_number.values_mut() {
            for ec in error_codes {
                let mentioned = ec.solution_text.as_deref().map(|s| s.contains(&part.part_number)).unwrap_or(false)
                                || ec.context_text.contains(&part.part_number);
                if mentioned {
                    part.linked_error_codes.push(ec.id);
                }
            }
        }
        let mut out: Vec<Part> = by_number.into_values().collect();
        out.sort_by(|a, b| a.part_number.cmp(&b.part_number));
        out
    }
}

/// Ventana de contexto byte-safe alrededor de [start, end).
fn window(text: &str, start: usize, end: usize, radius: usize) -> String {
    let mut from = start.saturating_sub(radius);
    while from > 0 && !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + radius).min(text.len());
    while to < text.len() && !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].trim().to_string()
}

/// Resto de la línea tras el código; si es corto, agrega la línea siguiente.
fn description_near(text: &str, code_end: usize) -> String {
    let tail = &text[code_end..];
    let mut lines = tail.lines();
    let mut description = lines.next().unwrap_or("").trim_matches([' ', ':', '-', '–']).to_string();
    if description.chars().count() < 10 {
        if let Some(next) = lines.next() {
            if !description.is_empty() {
                description.push(' ');
            }
            description.push_str(next.trim());
        }
    }
    description
}

/// Oraciones de acción dentro del contexto ("replace", "check", "clean"...).
fn solution_near(context: &str) -> Option<String> {
    let solution: Vec<&str> = context.split_inclusive('.')
                                     .filter(|s| {
                                         let l = s.to_lowercase();
                                         l.contains("replace") || l.contains("check") || l.contains("clean")
                                         || l.contains("reseat") || l.contains("reset") || l.contains("turn off")
                                     })
                                     .collect();
    if solution.is_empty() {
        None
    } else {
        Some(solution.join(" ").trim().to_string())
    }
}

/// Chunk de la misma página (proximidad simple por page_number).
fn chunk_for_page(chunks: &[Chunk], page: i32) -> Option<uuid::Uuid> {
    chunks.iter()
          .min_by_key(|c| (c.page_number - page).abs())
          .filter(|c| (c.page_number - page).abs() <= 1)
          .map(|c| c.id)
}

#[async_trait]
impl StageProcessor for MetadataStage {
    fn stage(&self) -> Stage {
        Stage::Metadata
    }

    fn service_name(&self) -> &str {
        "postgres"
    }

    fn context_fingerprint(&self, ctx: &ProcessingContext) -> serde_json::Value {
        json!({
            "file_hash": ctx.file_hash,
            "manufacturer": ctx.manufacturer,
        })
    }

    async fn process(&self, ctx: &mut ProcessingContext) -> Result<StageSuccess, StageError> {
        let manufacturer = ctx.manufacturer.clone().unwrap_or_default();

        let mut error_codes = Self::extract_error_codes(ctx, &manufacturer);
        let parts = Self::extract_parts(ctx, &manufacturer, &error_codes);

        // Cross-link inverso: error code → partes mencionadas en su solución.
        for ec in error_codes.iter_mut() {
            for part in &parts {
                if part.linked_error_codes.contains(&ec.id) {
                    ec.related_parts.push(part.id);
                }
            }
        }

        // Versión del documento en las primeras páginas.
        let first_pages: String = ctx.page_texts.iter().take(3).map(|(_, t)| t.as_str()).collect::<Vec<_>>().join("\n");
        let version = patterns::extract_version(&first_pages);

        // Persistencia parametrizada (::jsonb donde aplique) al final.
        self.intelligence.insert_error_codes(&error_codes).await.map_err(StageError::from)?;
        self.parts.upsert_parts(&parts).await.map_err(StageError::from)?;
        if let Some(v) = &version {
            self.documents.set_version(ctx.document_id, v).await.map_err(StageError::from)?;
        }

        info!("metadata: doc={} error_codes={} parts={} version={:?}",
              ctx.document_id,
              error_codes.len(),
              parts.len(),
              version);
        ctx.error_codes = error_codes;
        ctx.parts = parts;
        ctx.version = version.clone();

        Ok(StageSuccess::Done(json!({
            "error_code_count": ctx.error_codes.len(),
            "part_count": ctx.parts.len(),
            "version": version,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn ctx_with_page(text: &str) -> ProcessingContext {
        let mut ctx = ProcessingContext::new(Uuid::new_v4(), "req", PathBuf::from("/tmp/x.pdf"), "HP_X.pdf");
        ctx.manufacturer = Some("HP".to_string());
        ctx.page_texts.insert(4, text.to_string());
        ctx
    }

    #[test]
    fn hp_error_code_with_description_and_severity() {
        let text = "13.20.01 Paper jam in the duplexer area.\n\
                    Open the rear door and remove the jammed paper. Check the duplexer rollers \
                    and clean them if worn. If the error persists, replace the duplexer assembly.";
        let ctx = ctx_with_page(text);
        let codes = MetadataStage::extract_error_codes(&ctx, "HP");
        assert_eq!(codes.len(), 1);
        let ec = &codes[0];
        assert_eq!(ec.code, "13.20.01");
        assert!(ec.description.contains("Paper jam"));
        assert!(ec.context_text.chars().count() >= 50);
        assert!(ec.solution_text.as_deref().unwrap_or_default().contains("replace"));
        assert_eq!(ec.page_number, 4);
    }

    #[test]
    fn codes_without_enough_context_are_dropped() {
        let ctx = ctx_with_page("13.20.01 jam");
        let codes = MetadataStage::extract_error_codes(&ctx, "HP");
        assert!(codes.is_empty());
    }

    #[test]
    fn km_parts_link_to_error_codes_by_solution_text() {
        let text = "C2557 Developing unit drive failure detected by the main board sensor.\n\
                    Replace the developing unit A02ER72100 and reset the counter from the service mode.";
        let mut ctx = ctx_with_page(text);
        ctx.manufacturer = Some("Konica Minolta".to_string());
        let codes = MetadataStage::extract_error_codes(&ctx, "Konica Minolta");
        assert_eq!(codes.len(), 1);
        let parts = MetadataStage::extract_parts(&ctx, "Konica Minolta", &codes);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].part_number, "A02ER72100");
        assert_eq!(parts[0].linked_error_codes, vec![codes[0].id]);
    }
}
