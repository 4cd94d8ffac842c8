//! Chunker jerárquico.
//!
//! Reglas:
//! - Encabezados detectados por heurísticas: numeración ("3.", "4.2.1"),
//!   líneas ALL-CAPS, y marcadores conocidos ("Error Codes", "Troubleshooting").
//! - Los encabezados arman el `section_hierarchy` (camino de capítulo →
//!   sección → subsección) de los chunks siguientes.
//! - Ventana objetivo 500–1500 caracteres; nunca cortar a mitad de oración si
//!   hay un borde de oración dentro de la ventana.
//! - Chunks por debajo del mínimo se descartan salvo `allow_short`.
//! - Orden total por (página, offset): `chunk_index` y la cadena prev/next se
//!   asignan al final.
use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use krai_core::constants::{CHUNK_TARGET_MAX, CHUNK_TARGET_MIN, MIN_CHUNK_CHARS};
use krai_core::TableBlock;
use krai_domain::chunk::{link_chain, Chunk};

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub target_min: usize,
    pub target_max: usize,
    pub min_chars: usize,
    /// Flag de debug: conservar chunks cortos.
    pub allow_short: bool,
    /// Desactivable por entorno (ENABLE_HIERARCHICAL_CHUNKING).
    pub hierarchical: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        ChunkerConfig { target_min: CHUNK_TARGET_MIN,
                        target_max: CHUNK_TARGET_MAX,
                        min_chars: MIN_CHUNK_CHARS,
                        allow_short: false,
                        hierarchical: true }
    }
}

static NUMBERED_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)*)\.?\s+\S").unwrap());
static SECTION_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(error\s+codes?|troubleshooting|parts?\s+list|maintenance|specifications)\b").unwrap());

/// Nivel jerárquico del encabezado (1 = capítulo) o None si no es encabezado.
fn heading_level(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim();
    if trimmed.len() < 4 || trimmed.len() > 120 {
        return None;
    }
    if let Some(caps) = NUMBERED_HEADING.captures(trimmed) {
        let numbering = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let level = numbering.matches('.').count() + 1;
        return Some((level.min(5), trimmed.to_string()));
    }
    if SECTION_MARKERS.is_match(trimmed) {
        return Some((1, trimmed.to_string()));
    }
    // ALL-CAPS con al menos 4 letras y sin minúsculas.
    let letters: Vec<char> = trimmed.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() >= 4 && letters.iter().all(|c| c.is_uppercase()) {
        return Some((1, trimmed.to_string()));
    }
    None
}

/// Corta `text` en trozos ≤ max caracteres, prefiriendo bordes de oración.
fn split_block(text: &str, max: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = text.trim();
    while rest.chars().count() > max {
        // Borde byte-safe de la ventana de `max` caracteres.
        let window_end = rest.char_indices().nth(max).map(|(i, _)| i).unwrap_or(rest.len());
        let window = &rest[..window_end];
        // Última frontera de oración dentro de la ventana (si no está
        // demasiado cerca del inicio).
        let cut = window.rfind(". ")
                        .or_else(|| window.rfind(".\n"))
                        .map(|i| i + 1)
                        .filter(|&i| i > window.len() / 4)
                        .unwrap_or(window.len());
        let (head, tail) = rest.split_at(cut);
        out.push(head.trim().to_string());
        rest = tail.trim_start();
    }
    if !rest.is_empty() {
        out.push(rest.to_string());
    }
    out
}

/// Chunkea el texto completo de un documento en orden de página.
pub fn chunk_document(document_id: Uuid, page_texts: &BTreeMap<i32, String>, cfg: &ChunkerConfig) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut section_path: Vec<(usize, String)> = Vec::new();
    let mut buffer = String::new();
    let mut buffer_page = 1;

    let flush = |buffer: &mut String, page: i32, path: &[(usize, String)], chunks: &mut Vec<Chunk>| {
        let text = buffer.trim().to_string();
        buffer.clear();
        if text.is_empty() {
            return;
        }
        let hierarchy: Vec<String> = path.iter().map(|(_, h)| h.clone()).collect();
        for piece in split_block(&text, cfg.target_max) {
            if piece.chars().count() < cfg.min_chars && !cfg.allow_short {
                continue;
            }
            if let Ok(chunk) = Chunk::new(document_id, 0, page, &piece, hierarchy.clone()) {
                chunks.push(chunk);
            }
        }
    };

    for (&page, text) in page_texts {
        for line in text.lines() {
            if cfg.hierarchical {
                if let Some((level, heading)) = heading_level(line) {
                    // Un encabezado cierra el chunk en curso y ajusta el path.
                    flush(&mut buffer, buffer_page, &section_path, &mut chunks);
                    buffer_page = page;
                    section_path.retain(|(l, _)| *l < level);
                    section_path.push((level, heading));
                    continue;
                }
            }
            if buffer.is_empty() {
                buffer_page = page;
            }
            buffer.push_str(line);
            buffer.push('\n');
            // Preferir cortes en límites de sección, pero no acumular sin tope.
            if buffer.chars().count() >= cfg.target_max && buffer.chars().count() >= cfg.target_min {
                flush(&mut buffer, buffer_page, &section_path, &mut chunks);
                buffer_page = page;
            }
        }
    }
    flush(&mut buffer, buffer_page, &section_path, &mut chunks);

    // Orden total + cadena lineal.
    for (i, c) in chunks.iter_mut().enumerate() {
        c.chunk_index = i as i32;
    }
    link_chain(&mut chunks);
    chunks
}

/// Detecta bloques de tabla (líneas con pipes estilo markdown) y devuelve el
/// markdown con una línea de contexto previa.
pub fn detect_tables(page_texts: &BTreeMap<i32, String>) -> Vec<TableBlock> {
    let mut tables = Vec::new();
    for (&page, text) in page_texts {
        let lines: Vec<&str> = text.lines().collect();
        let mut i = 0;
        while i < lines.len() {
            if lines[i].matches('|').count() >= 2 {
                let start = i;
                while i < lines.len() && lines[i].matches('|').count() >= 2 {
                    i += 1;
                }
                if i - start >= 2 {
                    let context = if start > 0 { lines[start - 1].trim().to_string() } else { String::new() };
                    tables.push(TableBlock { page_number: page,
                                             markdown: lines[start..i].join("\n"),
                                             context });
                }
            } else {
                i += 1;
            }
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(entries: &[(i32, &str)]) -> BTreeMap<i32, String> {
        entries.iter().map(|(p, t)| (*p, t.to_string())).collect()
    }

    #[test]
    fn numbered_headings_build_hierarchy() {
        let body = "x".repeat(600);
        let text = format!("3. Troubleshooting\n{body}\n3.1 Error Codes\n{body}");
        let chunks = chunk_document(Uuid::new_v4(), &pages(&[(1, &text)]), &ChunkerConfig::default());
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].section_hierarchy, vec!["3. Troubleshooting".to_string()]);
        let last = chunks.last().unwrap();
        assert_eq!(last.section_hierarchy,
                   vec!["3. Troubleshooting".to_string(), "3.1 Error Codes".to_string()]);
    }

    #[test]
    fn chain_is_linear_and_indexed() {
        let body = "word ".repeat(700);
        let chunks = chunk_document(Uuid::new_v4(), &pages(&[(1, &body), (2, &body)]), &ChunkerConfig::default());
        assert!(chunks.len() > 2);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i32);
        }
        for w in chunks.windows(2) {
            assert_eq!(w[0].next_chunk_id, Some(w[1].id));
            assert_eq!(w[1].previous_chunk_id, Some(w[0].id));
        }
        assert!(chunks.first().unwrap().previous_chunk_id.is_none());
        assert!(chunks.last().unwrap().next_chunk_id.is_none());
    }

    #[test]
    fn short_chunks_skipped_unless_debug_flag() {
        let text = "ONLY A TITLE\ntiny";
        let strict = chunk_document(Uuid::new_v4(), &pages(&[(1, text)]), &ChunkerConfig::default());
        assert!(strict.is_empty());

        let cfg = ChunkerConfig { allow_short: true,
                                  ..ChunkerConfig::default() };
        let lax = chunk_document(Uuid::new_v4(), &pages(&[(1, text)]), &cfg);
        assert_eq!(lax.len(), 1);
        assert_eq!(lax[0].text, "tiny");
    }

    #[test]
    fn long_blocks_split_at_sentence_boundaries() {
        let sentence = "This is a complete sentence about the fuser unit. ";
        let text = sentence.repeat(80); // ~4000 chars
        let chunks = chunk_document(Uuid::new_v4(), &pages(&[(1, &text)]), &ChunkerConfig::default());
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.char_len() <= CHUNK_TARGET_MAX + 2);
            // nunca cortar a mitad de oración
            assert!(c.text.trim_end().ends_with('.'), "chunk cortado a mitad de oración");
        }
    }

    #[test]
    fn table_blocks_detected_with_context() {
        let text = "Toner coverage table\n| Model | Yield |\n| C759 | 30k |\n| C659 | 25k |\nafter";
        let tables = detect_tables(&pages(&[(4, text)]));
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].page_number, 4);
        assert_eq!(tables[0].context, "Toner coverage table");
        assert!(tables[0].markdown.contains("C759"));
    }
}
