//! Tablas de detección: fabricantes, series, modelos, códigos de error,
//! números de parte y versiones.
//!
//! Las tablas son estáticas y deterministas; el orden de prioridad de la
//! detección de fabricante vive en el stage de clasificación, no acá.
use once_cell::sync::Lazy;
use regex::Regex;

use krai_domain::{ProductType, Severity};

/// Fabricante canónico con sus aliases reconocibles en texto.
pub struct ManufacturerEntry {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
    /// Prefijos de filename ("HP_", "KM_").
    pub filename_prefixes: &'static [&'static str],
}

/// Catálogo de los 12 fabricantes soportados.
pub static MANUFACTURERS: &[ManufacturerEntry] = &[
    ManufacturerEntry { canonical: "HP",
                        aliases: &["HP", "HP Inc", "Hewlett-Packard", "Hewlett Packard", "LaserJet", "PageWide"],
                        filename_prefixes: &["HP_", "HP-"] },
    ManufacturerEntry { canonical: "Konica Minolta",
                        aliases: &["Konica Minolta", "Konica", "Minolta", "bizhub", "AccurioPress"],
                        filename_prefixes: &["KM_", "KM-", "BIZHUB_"] },
    ManufacturerEntry { canonical: "Canon",
                        aliases: &["Canon", "imageRUNNER", "imagePRESS", "imageCLASS"],
                        filename_prefixes: &["CANON_", "IR_"] },
    ManufacturerEntry { canonical: "Ricoh",
                        aliases: &["Ricoh", "Aficio", "Gestetner", "Lanier", "Savin"],
                        filename_prefixes: &["RICOH_"] },
    ManufacturerEntry { canonical: "Xerox",
                        aliases: &["Xerox", "WorkCentre", "VersaLink", "AltaLink", "Phaser"],
                        filename_prefixes: &["XEROX_", "XRX_"] },
    ManufacturerEntry { canonical: "Kyocera",
                        aliases: &["Kyocera", "ECOSYS", "TASKalfa", "Kyocera Mita"],
                        filename_prefixes: &["KYO_", "KYOCERA_"] },
    ManufacturerEntry { canonical: "Brother",
                        aliases: &["Brother"],
                        filename_prefixes: &["BRO_", "BROTHER_"] },
    ManufacturerEntry { canonical: "Epson",
                        aliases: &["Epson", "WorkForce", "EcoTank"],
                        filename_prefixes: &["EPSON_", "EPS_"] },
    ManufacturerEntry { canonical: "Sharp",
                        aliases: &["Sharp"],
                        filename_prefixes: &["SHARP_"] },
    ManufacturerEntry { canonical: "Lexmark",
                        aliases: &["Lexmark"],
                        filename_prefixes: &["LEX_", "LEXMARK_"] },
    ManufacturerEntry { canonical: "Toshiba",
                        aliases: &["Toshiba", "e-STUDIO"],
                        filename_prefixes: &["TOSHIBA_", "TOSH_"] },
    ManufacturerEntry { canonical: "OKI",
                        aliases: &["OKI", "Okidata"],
                        filename_prefixes: &["OKI_"] },
];

/// Aliases cortos (<3 chars o 2 letras) se ignoran en texto salvo whitelist:
/// "HP" es inequívoco; "KM" no (colisiona con unidades, iniciales, etc.).
pub static SHORT_ALIAS_WHITELIST: &[&str] = &["HP"];

/// Fabricante por prefijo de filename.
pub fn manufacturer_from_filename_prefix(filename: &str) -> Option<&'static str> {
    let upper = filename.to_uppercase();
    MANUFACTURERS.iter()
                 .find(|m| m.filename_prefixes.iter().any(|p| upper.starts_with(p)))
                 .map(|m| m.canonical)
}

/// Escaneo de alias con borde de palabra. Gana la PRIMERA aparición en el
/// texto (no el orden del catálogo): así "primeras páginas" le gana a
/// "últimas páginas" cuando el llamador concatena en ese orden.
pub fn manufacturer_in_text(text: &str) -> Option<&'static str> {
    let mut best: Option<(usize, &'static str)> = None;
    for entry in MANUFACTURERS {
        for alias in entry.aliases {
            if alias.len() < 3 && !SHORT_ALIAS_WHITELIST.contains(alias) {
                continue;
            }
            let pattern = format!(r"(?i)\b{}\b", regex::escape(alias));
            if let Ok(re) = Regex::new(&pattern) {
                if let Some(m) = re.find(text) {
                    if best.map(|(pos, _)| m.start() < pos).unwrap_or(true) {
                        best = Some((m.start(), entry.canonical));
                    }
                }
            }
        }
    }
    best.map(|(_, canonical)| canonical)
}

pub fn aliases_of(canonical: &str) -> Vec<String> {
    MANUFACTURERS.iter()
                 .find(|m| m.canonical == canonical)
                 .map(|m| m.aliases.iter().map(|s| s.to_string()).collect())
                 .unwrap_or_default()
}

// ── Modelos ──────────────────────────────────────────────────────────

/// Regexes de modelo por fabricante (grupo 1 = número de modelo).
pub fn model_patterns(canonical: &str) -> &'static [&'static Lazy<Regex>] {
    static HP: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\b(?:LaserJet|PageWide|OfficeJet|DesignJet)\s+(?:Managed\s+|Enterprise\s+|Pro\s+)?(?:MFP\s+|Flow\s+)?([EM]\d{3,5}[a-z]{0,3})\b").unwrap());
    static HP_E: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(E\d{5})\b").unwrap());
    static KM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bbizhub\s+(C?\d{3,4}[ei]?)\b").unwrap());
    static KM_PRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bAccurioPress\s+(C?\d{4})\b").unwrap());
    static CANON: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\bimageRUNNER\s+(?:ADVANCE\s+)?(?:DX\s+)?(C?\d{3,4}i?)\b").unwrap());
    static RICOH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(?:Aficio\s+)?(MP\s?C?\d{3,4})\b").unwrap());
    static XEROX: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\b(?:WorkCentre|VersaLink|AltaLink|Phaser)\s+([BC]?\d{3,4}i?)\b").unwrap());
    static KYOCERA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(?:TASKalfa|ECOSYS)\s+([MP]?\d{3,5}c?i?dn?w?)\b").unwrap());
    static TOSHIBA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\be-STUDIO\s*(\d{3,4}AC?)\b").unwrap());
    static GENERIC: [&Lazy<Regex>; 0] = [];

    static HP_SET: [&Lazy<Regex>; 2] = [&HP, &HP_E];
    static KM_SET: [&Lazy<Regex>; 2] = [&KM, &KM_PRESS];
    static CANON_SET: [&Lazy<Regex>; 1] = [&CANON];
    static RICOH_SET: [&Lazy<Regex>; 1] = [&RICOH];
    static XEROX_SET: [&Lazy<Regex>; 1] = [&XEROX];
    static KYOCERA_SET: [&Lazy<Regex>; 1] = [&KYOCERA];
    static TOSHIBA_SET: [&Lazy<Regex>; 1] = [&TOSHIBA];

    match canonical {
        "HP" => &HP_SET,
        "Konica Minolta" => &KM_SET,
        "Canon" => &CANON_SET,
        "Ricoh" => &RICOH_SET,
        "Xerox" => &XEROX_SET,
        "Kyocera" => &KYOCERA_SET,
        "Toshiba" => &TOSHIBA_SET,
        _ => &GENERIC,
    }
}

/// Modelos detectados en un texto para un fabricante, sin duplicados y en
/// orden de aparición.
pub fn extract_models(canonical: &str, text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for re in model_patterns(canonical) {
        for caps in re.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                let model = m.as_str().to_uppercase().replace(' ', "");
                if !seen.contains(&model) {
                    seen.push(model);
                }
            }
        }
    }
    seen
}

/// Serie canónica a partir de (fabricante, modelo). Tabla representativa del
/// detector completo de series.
pub fn detect_series(canonical: &str, model: &str) -> Option<&'static str> {
    let m = model.to_uppercase();
    let series = match canonical {
        "HP" => {
            if m.starts_with("E8") || m.starts_with("E7") {
                "LaserJet Managed"
            } else if m.starts_with("E5") || m.starts_with("E6") {
                "LaserJet Enterprise"
            } else if m.starts_with("M4") || m.starts_with("M3") {
                "LaserJet Pro"
            } else if m.starts_with('P') {
                "PageWide"
            } else {
                return None;
            }
        }
        "Konica Minolta" => {
            if m.starts_with('C') && m.len() <= 5 {
                "bizhub C"
            } else if m.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                "bizhub"
            } else {
                return None;
            }
        }
        "Canon" => {
            if m.starts_with('C') {
                "imageRUNNER ADVANCE C"
            } else {
                "imageRUNNER"
            }
        }
        "Xerox" => {
            if m.starts_with('B') {
                "VersaLink B"
            } else if m.starts_with('C') {
                "VersaLink C"
            } else {
                "WorkCentre"
            }
        }
        "Kyocera" => {
            if m.starts_with('M') || m.starts_with('P') {
                "ECOSYS"
            } else {
                "TASKalfa"
            }
        }
        "Toshiba" => "e-STUDIO",
        "Ricoh" => "MP",
        _ => return None,
    };
    Some(series)
}

/// Tipo de producto inferido del tipo de documento/modelo (heurística simple;
/// el catálogo completo distingue 77 tipos).
pub fn guess_product_type(canonical: &str, model: &str) -> ProductType {
    let m = model.to_uppercase();
    match canonical {
        "HP" if m.starts_with('E') => ProductType::A3Multifunction,
        "HP" => ProductType::LaserPrinter,
        "Konica Minolta" if m.starts_with('C') => ProductType::A3Multifunction,
        "Konica Minolta" => ProductType::LaserMultifunction,
        "Canon" => ProductType::LaserMultifunction,
        _ => ProductType::Unknown,
    }
}

// ── Códigos de error ─────────────────────────────────────────────────

/// Regexes de código de error por fabricante.
pub fn error_code_patterns(canonical: &str) -> &'static [&'static Lazy<Regex>] {
    static HP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{2}\.\d{2}(?:\.\d{2})?)\b").unwrap());
    static KM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(C\d{4})\b").unwrap());
    static CANON: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(E\d{3}(?:-\d{4})?)\b").unwrap());
    static RICOH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(SC\d{3}(?:-\d{2})?)\b").unwrap());
    static XEROX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{3}-\d{3})\b").unwrap());
    static KYOCERA: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(C\d{4})\b").unwrap());

    static HP_SET: [&Lazy<Regex>; 1] = [&HP];
    static KM_SET: [&Lazy<Regex>; 1] = [&KM];
    static CANON_SET: [&Lazy<Regex>; 1] = [&CANON];
    static RICOH_SET: [&Lazy<Regex>; 1] = [&RICOH];
    static XEROX_SET: [&Lazy<Regex>; 1] = [&XEROX];
    static KYOCERA_SET: [&Lazy<Regex>; 1] = [&KYOCERA];
    static EMPTY: [&Lazy<Regex>; 0] = [];

    match canonical {
        "HP" => &HP_SET,
        "Konica Minolta" => &KM_SET,
        "Canon" => &CANON_SET,
        "Ricoh" => &RICOH_SET,
        "Xerox" => &XEROX_SET,
        "Kyocera" => &KYOCERA_SET,
        _ => &EMPTY,
    }
}

/// Severidad inferida del texto de contexto del código.
pub fn infer_severity(context: &str) -> Severity {
    let lower = context.to_lowercase();
    if lower.contains("call service") || lower.contains("power off") || lower.contains("turn off the printer") {
        Severity::Critical
    } else if lower.contains("replace") || lower.contains("service required") {
        Severity::High
    } else if lower.contains("jam") || lower.contains("reset") || lower.contains("reseat") {
        Severity::Medium
    } else if lower.contains("note") || lower.contains("information") {
        Severity::Info
    } else {
        Severity::Medium
    }
}

// ── Números de parte ─────────────────────────────────────────────────

pub fn part_patterns(canonical: &str) -> &'static [&'static Lazy<Regex>] {
    // Konica Minolta: A + 9 alfanum (A02ER72100), V + 9 dígitos, numérico de
    // 10 dígitos sin cero inicial.
    static KM_A: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(A[0-9A-Z]{9})\b").unwrap());
    static KM_V: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(V\d{9})\b").unwrap());
    static KM_NUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([1-9]\d{9})\b").unwrap());
    // HP: kits RM1-1234(-000) y consumibles CE255A/CF226X/Q7553X.
    static HP_RM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(R[MGLCF]\d-\d{4}(?:-\d{3})?[A-Z]?)\b").unwrap());
    static HP_CART: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b((?:C[BEF]|Q)\d{3,4}[A-Z]{1,2})\b").unwrap());
    // Canon: FM/FC/FL + código.
    static CANON_P: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(F[MCL]\d?-[A-Z0-9]{4,5}(?:-\d{3})?)\b").unwrap());

    static KM_SET: [&Lazy<Regex>; 3] = [&KM_A, &KM_V, &KM_NUM];
    static HP_SET: [&Lazy<Regex>; 2] = [&HP_RM, &HP_CART];
    static CANON_SET: [&Lazy<Regex>; 1] = [&CANON_P];
    static EMPTY: [&Lazy<Regex>; 0] = [];

    match canonical {
        "Konica Minolta" => &KM_SET,
        "HP" => &HP_SET,
        "Canon" => &CANON_SET,
        _ => &EMPTY,
    }
}

// ── Versión del documento ────────────────────────────────────────────

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:version|ver\.?|rev\.?|revision|edition)\s*[:\-]?\s*(\d+(?:\.\d+)*[a-z]?)\b").unwrap());

/// Versión declarada en las primeras páginas, si existe.
pub fn extract_version(first_pages_text: &str) -> Option<String> {
    VERSION_RE.captures(first_pages_text).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_prefix_detection() {
        assert_eq!(manufacturer_from_filename_prefix("HP_E877_SM.pdf"), Some("HP"));
        assert_eq!(manufacturer_from_filename_prefix("km_c759_parts.pdf"), Some("Konica Minolta"));
        assert_eq!(manufacturer_from_filename_prefix("servicemanual.pdf"), None);
    }

    #[test]
    fn short_alias_whitelist_only_hp() {
        // "HP" matchea con borde de palabra; un fragmento interno no.
        assert_eq!(manufacturer_in_text("Copyright HP Inc. 2023"), Some("HP"));
        assert_eq!(manufacturer_in_text("CHIP defect"), None);
    }

    #[test]
    fn word_boundary_scan_finds_canonical() {
        assert_eq!(manufacturer_in_text("the bizhub C759 control board"), Some("Konica Minolta"));
        assert_eq!(manufacturer_in_text("imageRUNNER ADVANCE DX C5870i"), Some("Canon"));
    }

    #[test]
    fn hp_models_and_series() {
        let models = extract_models("HP", "HP LaserJet Managed MFP E87740z service manual, also E87750");
        assert!(models.contains(&"E87740Z".to_string()) || models.contains(&"E87740".to_string()));
        assert_eq!(detect_series("HP", "E87740"), Some("LaserJet Managed"));
        assert_eq!(detect_series("HP", "M455"), Some("LaserJet Pro"));
    }

    #[test]
    fn km_error_codes_and_parts() {
        let text = "If C2557 appears, replace the developing unit A02ER72100 or V123456789.";
        let codes: Vec<String> = error_code_patterns("Konica Minolta").iter()
                                                                      .flat_map(|re| re.captures_iter(text))
                                                                      .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                                                                      .collect();
        assert_eq!(codes, vec!["C2557"]);
        let parts: Vec<String> = part_patterns("Konica Minolta").iter()
                                                                .flat_map(|re| re.captures_iter(text))
                                                                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                                                                .collect();
        assert!(parts.contains(&"A02ER72100".to_string()));
        assert!(parts.contains(&"V123456789".to_string()));
    }

    #[test]
    fn severity_inference() {
        assert_eq!(infer_severity("Turn off the printer and call service."), Severity::Critical);
        assert_eq!(infer_severity("Replace the fuser unit."), Severity::High);
        assert_eq!(infer_severity("Paper jam in tray 2. Reset and retry."), Severity::Medium);
    }

    #[test]
    fn version_from_first_pages() {
        assert_eq!(extract_version("Service Manual\nEdition 4.2\nJanuary 2024").as_deref(), Some("4.2"));
        assert_eq!(extract_version("Rev: 1.0a applies"), Some("1.0a".to_string()));
        assert_eq!(extract_version("no marker here"), None);
    }
}
