//! S1 — Upload: dedupe por hash de contenido, metadata PDF y alta del
//! documento.
use async_trait::async_trait;
use log::info;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use krai_core::{ProcessingContext, Stage, StageError, StageProcessor, StageSuccess};
use krai_domain::{Document, DocumentType};
use krai_persistence::DocumentRepository;

use crate::pdf::PdfFile;

pub struct UploadStage {
    documents: DocumentRepository,
}

impl UploadStage {
    pub fn new(documents: DocumentRepository) -> Self {
        Self { documents }
    }

    /// SHA-256 de los bytes del archivo, en streaming (64 KiB por lectura;
    /// nunca el PDF completo en memoria para hashear). También lo usa la API
    /// para responder el dedupe antes de agendar el pipeline.
    pub async fn stream_file_hash(path: &std::path::Path) -> Result<String, StageError> {
        let mut file = tokio::fs::File::open(path).await
                                                  .map_err(|e| StageError::Io(format!("{}: {e}", path.display())))?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).await.map_err(|e| StageError::Io(e.to_string()))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Heurística de tipo de documento por filename y título PDF.
    fn detect_document_type(filename: &str, title: Option<&str>) -> DocumentType {
        let haystack = format!("{} {}", filename.to_lowercase(), title.unwrap_or_default().to_lowercase());
        if haystack.contains("service manual") || haystack.contains("_sm") || haystack.contains(" sm.") {
            DocumentType::ServiceManual
        } else if haystack.contains("parts") || haystack.contains("_pc") {
            DocumentType::PartsCatalog
        } else if haystack.contains("user guide") || haystack.contains("_ug") || haystack.contains("manual de usuario") {
            DocumentType::UserGuide
        } else if haystack.contains("bulletin") {
            DocumentType::TechnicalBulletin
        } else if haystack.contains("install") {
            DocumentType::InstallationGuide
        } else if haystack.contains("quick") {
            DocumentType::QuickReference
        } else if haystack.contains("firmware") {
            DocumentType::FirmwareNotes
        } else {
            DocumentType::Unknown
        }
    }
}

#[async_trait]
impl StageProcessor for UploadStage {
    fn stage(&self) -> Stage {
        Stage::Upload
    }

    fn service_name(&self) -> &str {
        "postgres"
    }

    fn context_fingerprint(&self, ctx: &ProcessingContext) -> serde_json::Value {
        json!({
            "file_path": ctx.file_path.display().to_string(),
            "original_filename": ctx.original_filename,
        })
    }

    async fn process(&self, ctx: &mut ProcessingContext) -> Result<StageSuccess, StageError> {
        // 1. Hash de contenido en streaming sobre los bytes subidos.
        let file_hash = Self::stream_file_hash(&ctx.file_path).await?;
        ctx.file_hash = Some(file_hash.clone());

        // 2. Dedupe: mismo hash ⇒ mismo documento, salvo `force`.
        if let Some(existing) = self.documents.find_by_hash(&file_hash).await.map_err(StageError::from)? {
            if !ctx.force {
                info!("upload: duplicate content, returning existing document {}", existing.id);
                ctx.duplicate_of = Some(existing.id);
                ctx.document_id = existing.id;
                ctx.page_count = Some(existing.page_count);
                ctx.document_type = Some(existing.document_type);
                return Ok(StageSuccess::SkippedDuplicate(json!({
                    "document_id": existing.id,
                    "file_hash": file_hash,
                })));
            }
        }

        // 3. Metadata del PDF (valida de paso que el archivo sea PDF/.pdfz).
        let pdf = PdfFile::open(&ctx.file_path)?;
        let page_count = pdf.page_count() as i32;
        let title = pdf.title();
        let author = pdf.author();
        let document_type = Self::detect_document_type(&ctx.original_filename, title.as_deref());

        // 4. Alta en krai_core.documents con el id pre-asignado del contexto.
        let mut doc = Document::new(&file_hash, &ctx.original_filename, page_count, document_type)?;
        doc.id = ctx.document_id;
        doc.original_filename = Some(ctx.original_filename.clone());
        doc.storage_path = Some(ctx.file_path.display().to_string());
        doc.metadata = json!({
            "pdf_title": title,
            "pdf_author": author,
        });
        self.documents.insert(&doc).await.map_err(StageError::from)?;

        ctx.page_count = Some(page_count);
        ctx.document_type = Some(document_type);
        ctx.pdf_title = title;
        ctx.pdf_author = author;

        Ok(StageSuccess::Done(json!({
            "document_id": ctx.document_id,
            "file_hash": file_hash,
            "page_count": page_count,
            "document_type": document_type,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_type_heuristics() {
        assert_eq!(UploadStage::detect_document_type("HP_E877_SM.pdf", None), DocumentType::ServiceManual);
        assert_eq!(UploadStage::detect_document_type("km_c759_parts.pdf", None), DocumentType::PartsCatalog);
        assert_eq!(UploadStage::detect_document_type("x.pdf", Some("User Guide for bizhub")),
                   DocumentType::UserGuide);
        assert_eq!(UploadStage::detect_document_type("x.pdf", None), DocumentType::Unknown);
    }
}
