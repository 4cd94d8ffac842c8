//! API de ingesta (axum).
//!
//! - `POST /upload` (multipart) → 202 {document_id}; el pipeline corre como
//!   tarea background.
//! - `POST /documents/{id}/stages/{stage}/retry` → re-corre un stage.
//! - `GET /documents/{id}/stages` → stage_status + overall_progress +
//!   can_retry.
//! - `GET /documents/{id}` → resumen del documento.
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use serde_json::json;
use uuid::Uuid;

use krai_adapters::stages::SearchStage;
use krai_core::constants::EMBEDDING_DIM;
use krai_core::{ProcessingContext, ProcessingResult, ProcessingStatus, Stage};
use krai_persistence::{DocumentRepository, IntelligenceRepository, StageTracker};
use krai_providers::AiService;

use crate::pipeline::MasterPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<MasterPipeline>,
    pub tracker: Arc<StageTracker>,
    pub documents: DocumentRepository,
    pub intelligence: Arc<IntelligenceRepository>,
    pub ai: Arc<dyn AiService>,
    pub upload_dir: PathBuf,
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/upload", post(upload))
                 .route("/documents/:id", get(document_summary))
                 .route("/documents/:id/stages", get(document_stages))
                 .route("/documents/:id/stages/:stage/retry", post(retry_stage))
                 .route("/search", get(search))
                 .with_state(state)
}

#[derive(serde::Deserialize)]
struct SearchParams {
    q: String,
    /// text_chunk (default), image o table.
    kind: Option<String>,
    limit: Option<i64>,
}

/// Búsqueda por similitud coseno sobre unified_embeddings; cada consulta deja
/// su fila de analytics (fire-and-forget).
async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Response {
    let kind = params.kind.unwrap_or_else(|| "text_chunk".to_string());
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    let started = std::time::Instant::now();

    let embedding = match state.ai.embed_text(&params.q).await {
        Ok(v) => {
            let mut v = v;
            v.resize(EMBEDDING_DIM, 0.0);
            v
        }
        Err(e) => {
            error!("search: query embedding failed: {e}");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };
    match state.intelligence.similarity_search(embedding, &kind, limit).await {
        Ok(hits) => {
            let duration_ms = started.elapsed().as_millis() as u64;
            SearchStage::record_query(Arc::clone(&state.intelligence),
                                      params.q.clone(),
                                      duration_ms,
                                      hits.len(),
                                      json!({"source_kind": kind, "limit": limit}));
            Json(json!({
                "query": params.q,
                "source_kind": kind,
                "duration_ms": duration_ms,
                "results": hits.iter().map(|(id, distance)| json!({"source_id": id, "distance": distance})).collect::<Vec<_>>(),
            })).into_response()
        }
        Err(e) => {
            error!("search: similarity query failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Envelope de error estándar de la API.
fn error_envelope(status: StatusCode, result: &ProcessingResult) -> Response {
    (status,
     Json(json!({
         "status": result.status,
         "error": {
             "category": result.error.as_ref().map(|e| e.error_category),
             "type": result.error.as_ref().map(|e| e.error_type.clone()),
             "message": result.error_message,
             "correlation_id": result.correlation_id,
         },
         "attempts": result.retry_attempt,
         "next_retry_at": result.next_attempt.map(|a| format!("attempt {a} scheduled")),
     }))).into_response()
}

async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    // Primer campo con filename = el archivo.
    let mut saved: Option<(PathBuf, String)> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let Some(filename) = field.file_name().map(String::from) else { continue };
        let data = match field.bytes().await {
            Ok(d) => d,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, Json(json!({"error": format!("multipart read: {e}")}))).into_response()
            }
        };
        if let Err(e) = tokio::fs::create_dir_all(&state.upload_dir).await {
            error!("upload: cannot create upload dir: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        let path = state.upload_dir.join(format!("{}-{}", Uuid::new_v4(), sanitize(&filename)));
        if let Err(e) = tokio::fs::write(&path, &data).await {
            error!("upload: write failed: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        saved = Some((path, filename));
        break;
    }
    let Some((path, filename)) = saved else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "no file field in multipart body"}))).into_response();
    };

    // Dedupe por contenido ANTES de responder: los mismos bytes devuelven el
    // document_id existente (sin nueva corrida).
    if let Ok(file_hash) = krai_adapters::stages::UploadStage::stream_file_hash(&path).await {
        if let Ok(Some(existing)) = state.documents.find_by_hash(&file_hash).await {
            let _ = tokio::fs::remove_file(&path).await;
            return (StatusCode::ACCEPTED,
                    Json(json!({"document_id": existing.id, "status": "skipped_duplicate"}))).into_response();
        }
    }

    let document_id = Uuid::new_v4();
    let request_id = format!("upload-{document_id}");
    let mut ctx = ProcessingContext::new(document_id, &request_id, path, &filename);

    // 202: el pipeline corre asincrónicamente; el estado se consulta por
    // /documents/{id}/stages.
    let pipeline = Arc::clone(&state.pipeline);
    tokio::spawn(async move {
        let summary = pipeline.process_document(&mut ctx).await;
        info!("pipeline finished: doc={} completed={:?} failed={:?} duplicate_of={:?}",
              summary.document_id,
              summary.completed_stages,
              summary.failed_stage,
              summary.duplicate_of);
    });

    (StatusCode::ACCEPTED, Json(json!({"document_id": document_id}))).into_response()
}

async fn retry_stage(State(state): State<AppState>, Path((id, stage)): Path<(Uuid, String)>) -> Response {
    let Some(stage) = Stage::parse(&stage) else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": format!("unknown stage {stage:?}")}))).into_response();
    };
    match state.pipeline.run_single_stage(stage, id, false, 1, None).await {
        Ok(result) => match result.status {
            ProcessingStatus::Failed => error_envelope(StatusCode::UNPROCESSABLE_ENTITY, &result),
            _ => Json(json!({
                     "status": result.status,
                     "correlation_id": result.correlation_id,
                     "processing_time_ms": result.processing_time_ms,
                     "data": result.data,
                 })).into_response(),
        },
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()}))).into_response(),
    }
}

async fn document_stages(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.tracker.read_status(id).await {
        Ok(Some(status)) => Json(json!({
                                "document_id": id,
                                "stage_status": status.stage_status,
                                "overall_progress": status.overall_progress,
                                "can_retry": status.can_retry,
                            })).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!("stages: read failed for {id}: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn document_summary(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.documents.get(id).await {
        Ok(Some(doc)) => Json(json!({
                             "id": doc.id,
                             "filename": doc.filename,
                             "file_hash": doc.file_hash,
                             "page_count": doc.page_count,
                             "document_type": doc.document_type,
                             "version": doc.version,
                             "manufacturer_id": doc.manufacturer_id,
                             "series_id": doc.series_id,
                             "created_at": doc.created_at,
                         })).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!("document: read failed for {id}: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Nombre de archivo seguro para el directorio de uploads.
fn sanitize(filename: &str) -> String {
    filename.chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_path_separators() {
        assert_eq!(sanitize("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize("HP_E877_SM.pdf"), "HP_E877_SM.pdf");
    }
}
