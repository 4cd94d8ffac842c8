//! Contexto de procesamiento entregado a cada stage.
//!
//! El `ProcessingContext` es el acumulador por documento: cada stage lee los
//! artefactos de los anteriores y aporta los suyos en campos tipados (nada de
//! claves string ad-hoc). El Master Pipeline es dueño del contexto durante la
//! corrida; los artefactos pasan a ser propiedad de la base de datos cuando el
//! stage que los persiste termina con éxito.
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use krai_domain::{Chunk, Document, DocumentType, ErrorCode, ExtractedImage, Link, Part, Product, Video};

use crate::errors::StageError;

/// Tabla detectada en el texto (markdown) con su contexto circundante.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TableBlock {
    pub page_number: i32,
    pub markdown: String,
    pub context: String,
}

/// Acumulador por documento; crece stage a stage.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    pub document_id: Uuid,
    /// Correlation id raíz de la petición que originó la corrida.
    pub request_id: String,
    pub file_path: PathBuf,
    pub original_filename: String,
    /// Re-procesar aunque existan marcadores/duplicados.
    pub force: bool,
    /// Intento vigente (1-based); lo incrementa el orquestador de retries.
    pub retry_attempt: u32,
    /// Fila de pipeline_errors que originó este re-intento, si aplica.
    pub pipeline_error_id: Option<Uuid>,

    // ── Artefactos acumulados ───────────────────────────────────────
    pub file_hash: Option<String>,
    pub page_count: Option<i32>,
    pub document_type: Option<DocumentType>,
    pub pdf_title: Option<String>,
    pub pdf_author: Option<String>,
    /// Texto por página (1-based) preservando layout.
    pub page_texts: BTreeMap<i32, String>,
    pub chunks: Vec<Chunk>,
    pub images: Vec<ExtractedImage>,
    pub tables: Vec<TableBlock>,
    pub manufacturer: Option<String>,
    pub manufacturer_id: Option<Uuid>,
    pub series_name: Option<String>,
    pub series_id: Option<Uuid>,
    pub products: Vec<Product>,
    pub error_codes: Vec<ErrorCode>,
    pub parts: Vec<Part>,
    pub version: Option<String>,
    pub links: Vec<Link>,
    pub videos: Vec<Video>,
    /// Documento existente cuando la subida resultó duplicada.
    pub duplicate_of: Option<Uuid>,

    cancelled: Arc<AtomicBool>,
}

impl ProcessingContext {
    pub fn new(document_id: Uuid, request_id: &str, file_path: PathBuf, original_filename: &str) -> Self {
        ProcessingContext { document_id,
                            request_id: request_id.to_string(),
                            file_path,
                            original_filename: original_filename.to_string(),
                            force: false,
                            retry_attempt: 1,
                            pipeline_error_id: None,
                            file_hash: None,
                            page_count: None,
                            document_type: None,
                            pdf_title: None,
                            pdf_author: None,
                            page_texts: BTreeMap::new(),
                            chunks: Vec::new(),
                            images: Vec::new(),
                            tables: Vec::new(),
                            manufacturer: None,
                            manufacturer_id: None,
                            series_name: None,
                            series_id: None,
                            products: Vec::new(),
                            error_codes: Vec::new(),
                            parts: Vec::new(),
                            version: None,
                            links: Vec::new(),
                            videos: Vec::new(),
                            duplicate_of: None,
                            cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Reconstruye un contexto mínimo desde un documento persistido (retries
    /// y `run_single_stage`); los stages hidratan lo que necesiten desde DB.
    pub fn from_document(doc: &Document, request_id: &str) -> Self {
        let path = doc.storage_path.clone().unwrap_or_default();
        let mut ctx = Self::new(doc.id, request_id, PathBuf::from(path), &doc.filename);
        ctx.file_hash = Some(doc.file_hash.clone());
        ctx.page_count = Some(doc.page_count);
        ctx.document_type = Some(doc.document_type);
        ctx.manufacturer_id = doc.manufacturer_id;
        ctx.series_id = doc.series_id;
        ctx.version = doc.version.clone();
        ctx
    }

    /// Handle clonable para solicitar cancelación desde fuera.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Punto de fiscalización cooperativo: los stages deben llamarlo en
    /// iteraciones largas (por página, por lote).
    pub fn check_cancelled(&self) -> Result<(), StageError> {
        if self.cancelled.load(Ordering::Relaxed) {
            Err(StageError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_propagates_through_handle() {
        let ctx = ProcessingContext::new(Uuid::new_v4(), "req", PathBuf::from("/tmp/x.pdf"), "x.pdf");
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancel_handle().store(true, Ordering::Relaxed);
        assert!(matches!(ctx.check_cancelled(), Err(StageError::Cancelled)));
    }
}
