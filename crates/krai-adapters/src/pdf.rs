//! Acceso a PDF (lopdf): texto por página, imágenes embebidas, enlaces de
//! anotaciones y metadata del Info dict.
//!
//! Soporta `.pdfz` (PDF envuelto en gzip): la descompresión es transparente y
//! en memoria; el hash de dedupe se calcula SIEMPRE sobre los bytes subidos,
//! no sobre el PDF descomprimido.
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use lopdf::{Dictionary, Document as PdfDocument, Object, ObjectId};

use krai_core::StageError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Imagen cruda extraída de un XObject de página.
#[derive(Debug, Clone)]
pub struct RawPdfImage {
    pub page_number: i32,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub mime: String,
}

#[derive(Debug)]
pub struct PdfFile {
    doc: PdfDocument,
    pages: BTreeMap<u32, ObjectId>,
}

impl PdfFile {
    pub fn open(path: &Path) -> Result<Self, StageError> {
        let bytes = std::fs::read(path).map_err(|e| StageError::Io(format!("{}: {e}", path.display())))?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(mut bytes: Vec<u8>) -> Result<Self, StageError> {
        if bytes.starts_with(&GZIP_MAGIC) {
            bytes = gunzip(&bytes)?;
        }
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(StageError::InvalidFileType("missing %PDF- header".to_string()));
        }
        let doc = PdfDocument::load_mem(&bytes).map_err(|e| StageError::CorruptDocument(e.to_string()))?;
        let pages = doc.get_pages();
        Ok(PdfFile { doc, pages })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Texto de una página (1-based) preservando el orden del content stream.
    pub fn page_text(&self, page_number: u32) -> String {
        self.doc.extract_text(&[page_number]).unwrap_or_default()
    }

    /// Título del Info dict, si existe.
    pub fn title(&self) -> Option<String> {
        self.info_string(b"Title")
    }

    pub fn author(&self) -> Option<String> {
        self.info_string(b"Author")
    }

    fn info_string(&self, key: &[u8]) -> Option<String> {
        let info = self.doc.trailer.get(b"Info").ok()?;
        let dict = self.resolve_dict(info)?;
        match dict.get(key).ok()? {
            Object::String(bytes, _) => {
                let s = decode_pdf_string(bytes);
                if s.trim().is_empty() {
                    None
                } else {
                    Some(s)
                }
            }
            _ => None,
        }
    }

    fn resolve_dict<'a>(&'a self, obj: &'a Object) -> Option<&'a Dictionary> {
        match obj {
            Object::Dictionary(d) => Some(d),
            Object::Reference(id) => self.doc.get_object(*id).ok()?.as_dict().ok(),
            _ => None,
        }
    }

    fn resolve<'a>(&'a self, obj: &'a Object) -> &'a Object {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).unwrap_or(obj),
            other => other,
        }
    }

    /// Imágenes embebidas de una página (XObjects con Subtype Image).
    /// El bbox de colocación exacto requiere interpretar el content stream;
    /// se omite aquí y las heurísticas de filtrado trabajan sobre
    /// dimensiones y repetición entre páginas.
    pub fn page_images(&self, page_number: u32) -> Vec<RawPdfImage> {
        let Some(&page_id) = self.pages.get(&page_number) else { return Vec::new() };
        let Ok((resources, _resource_ids)) = self.doc.get_page_resources(page_id) else { return Vec::new() };
        let Some(resources) = resources else { return Vec::new() };
        let Some(xobjects) = resources.get(b"XObject").ok().and_then(|o| self.resolve_dict(o)) else {
            return Vec::new();
        };

        let mut images = Vec::new();
        for (_name, obj) in xobjects.iter() {
            let resolved = self.resolve(obj);
            let Object::Stream(stream) = resolved else { continue };
            let is_image = matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n.as_slice() == b"Image");
            if !is_image {
                continue;
            }
            let width = stream.dict.get(b"Width").and_then(|o| o.as_i64()).unwrap_or(0);
            let height = stream.dict.get(b"Height").and_then(|o| o.as_i64()).unwrap_or(0);
            if width <= 0 || height <= 0 {
                continue;
            }
            // DCTDecode deja JPEG tal cual en el stream; otros filtros se
            // descomprimen a raw.
            let data = match stream.decompressed_content() {
                Ok(d) => d,
                Err(_) => stream.content.clone(),
            };
            if data.is_empty() {
                continue;
            }
            let mime = infer::get(&data).map(|t| t.mime_type().to_string())
                                        .unwrap_or_else(|| "application/octet-stream".to_string());
            images.push(RawPdfImage { page_number: page_number as i32,
                                      data,
                                      width: width as u32,
                                      height: height as u32,
                                      mime });
        }
        images
    }

    /// URLs de anotaciones Link de una página.
    pub fn annotation_links(&self, page_number: u32) -> Vec<String> {
        let Some(&page_id) = self.pages.get(&page_number) else { return Vec::new() };
        let Ok(page_obj) = self.doc.get_object(page_id) else { return Vec::new() };
        let Ok(page_dict) = page_obj.as_dict() else { return Vec::new() };
        let Some(annots) = page_dict.get(b"Annots").ok().map(|o| self.resolve(o)) else {
            return Vec::new();
        };
        let Object::Array(items) = annots else { return Vec::new() };

        let mut urls = Vec::new();
        for item in items {
            let Some(annot) = self.resolve_dict(item) else { continue };
            let is_link = matches!(annot.get(b"Subtype"), Ok(Object::Name(n)) if n.as_slice() == b"Link");
            if !is_link {
                continue;
            }
            let Some(action) = annot.get(b"A").ok().and_then(|o| self.resolve_dict(o)) else { continue };
            if let Ok(Object::String(bytes, _)) = action.get(b"URI") {
                urls.push(decode_pdf_string(bytes));
            }
        }
        urls
    }
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, StageError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)
           .map_err(|e| StageError::InvalidFileType(format!("invalid gzip wrapper: {e}")))?;
    Ok(out)
}

/// Strings PDF pueden venir en Latin-1 o UTF-16BE con BOM.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..].chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
        String::from_utf16_lossy(&utf16)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_pdf_bytes_rejected_as_invalid_file_type() {
        let err = PdfFile::from_bytes(b"plain text pretending".to_vec()).unwrap_err();
        assert!(matches!(err, StageError::InvalidFileType(_)));
    }

    #[test]
    fn gzip_wrapped_non_pdf_rejected() {
        use flate2::write::GzEncoder;
        use std::io::Write;
        let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"not a pdf").unwrap();
        let gz = enc.finish().unwrap();
        let err = PdfFile::from_bytes(gz).unwrap_err();
        assert!(matches!(err, StageError::InvalidFileType(_)));
    }

    #[test]
    fn utf16_pdf_strings_decode() {
        let mut b = vec![0xFE, 0xFF];
        for ch in "HP".encode_utf16() {
            b.extend(ch.to_be_bytes());
        }
        assert_eq!(decode_pdf_string(&b), "HP");
        assert_eq!(decode_pdf_string(b"plain"), "plain");
    }
}
