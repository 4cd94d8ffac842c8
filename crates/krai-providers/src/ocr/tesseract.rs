//! OCR vía binario local `tesseract` (salida TSV para confianza por palabra).
use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use super::{OcrEngine, OcrResult};
use crate::error::ProviderError;

pub struct TesseractOcr {
    binary: String,
    language: String,
}

impl TesseractOcr {
    pub fn new(language: &str) -> Self {
        TesseractOcr { binary: "tesseract".to_string(),
                       language: language.to_string() }
    }

    pub fn with_binary(mut self, binary: &str) -> Self {
        self.binary = binary.to_string();
        self
    }

    /// Parsea la salida TSV de tesseract: columnas fijas, `conf` en la 11
    /// (0-based 10), texto en la 12. Las filas con conf == -1 son estructura
    /// (página/bloque), no palabras.
    fn parse_tsv(tsv: &str) -> OcrResult {
        let mut words: Vec<&str> = Vec::new();
        let mut confs: Vec<f32> = Vec::new();
        for line in tsv.lines().skip(1) {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 {
                continue;
            }
            let conf: f32 = cols[10].parse().unwrap_or(-1.0);
            let word = cols[11].trim();
            if conf >= 0.0 && !word.is_empty() {
                words.push(word);
                confs.push(conf);
            }
        }
        let confidence = if confs.is_empty() {
            None
        } else {
            Some(confs.iter().sum::<f32>() / confs.len() as f32 / 100.0)
        };
        OcrResult { text: words.join(" "),
                    confidence }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image: &[u8]) -> Result<OcrResult, ProviderError> {
        // tesseract no lee de stdin en todas las builds; archivo temporal con
        // nombre único (hay lotes concurrentes sobre el mismo directorio).
        static SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let dir = tempfile_dir()?;
        let input = dir.join(format!("ocr-input-{}", SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed)));
        tokio::fs::write(&input, image).await?;

        let output = Command::new(&self.binary).arg(&input)
                                               .arg("stdout")
                                               .arg("-l")
                                               .arg(&self.language)
                                               .arg("tsv")
                                               .output()
                                               .await?;
        let _ = tokio::fs::remove_file(&input).await;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::Io(format!("tesseract exited with {}: {stderr}", output.status)));
        }
        let tsv = String::from_utf8_lossy(&output.stdout);
        let result = Self::parse_tsv(&tsv);
        debug!("tesseract: {} chars, confidence {:?}", result.text.len(), result.confidence);
        Ok(result)
    }
}

fn tempfile_dir() -> Result<std::path::PathBuf, ProviderError> {
    let dir = std::env::temp_dir().join(format!("krai-ocr-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tsv_parse_averages_word_confidence() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                   1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t0\t0\t50\t20\t90\tError\n\
                   5\t1\t1\t1\t1\t2\t50\t0\t50\t20\t80\tCode\n";
        let r = TesseractOcr::parse_tsv(tsv);
        assert_eq!(r.text, "Error Code");
        let conf = r.confidence.unwrap();
        assert!((conf - 0.85).abs() < 1e-6);
    }

    #[test]
    fn tsv_parse_without_words_has_no_confidence() {
        let r = TesseractOcr::parse_tsv("header\n");
        assert!(r.text.is_empty());
        assert!(r.confidence.is_none());
    }
}
