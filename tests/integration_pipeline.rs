//! Corrida end-to-end del pipeline contra Postgres con proveedores mock.
//! Se salta silenciosamente sin DATABASE_URL (mismo criterio que el resto de
//! los tests de integración).
use std::path::PathBuf;
use std::sync::Arc;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Object, Stream};
use uuid::Uuid;

use krai_adapters::chunking::ChunkerConfig;
use krai_adapters::stages::{ClassificationStage, EmbeddingStage, ImageStage, ImageStageConfig, LinkStage,
                            MetadataStage, SearchStage, StorageStage, StructuredStage, TextStage, UploadStage};
use krai_core::{PerformanceCollector, PipelineEngine, ProcessingContext, ProcessingStatus, StageProcessor};
use krai_persistence::{build_pool_from_env, CatalogRepository, ContentRepository, DocumentRepository,
                       IntelligenceRepository, PartsRepository, PgCompletionStore, PgErrorLog, PgRetryPolicyStore,
                       StageTracker};
use krai_providers::{InMemoryObjectStorage, MockAiService, MockOcr, MockVisualEmbedder, VisualEmbedder};
use krai_rust::pipeline::MasterPipeline;

/// PDF sintético de dos páginas con texto de manual de servicio HP. El `tag`
/// hace únicos los bytes por corrida: el dedupe por hash se prueba DENTRO de
/// una corrida, no contra corridas anteriores en la misma base.
fn build_test_pdf(path: &std::path::Path, tag: &str) {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let page1_lines = ["HP Inc. LaserJet Managed MFP E87740 Service Manual",
                       "Edition 2.1",
                       "3. Troubleshooting",
                       "This chapter describes the control panel error codes for the device.",
                       "Each error code identifies the failing assembly and the recommended service action.",
                       "Use the event log to confirm the error history before replacing any component.",
                       "The following sections assume the engine firmware is at the latest revision level.",
                       "Always power cycle the device once before starting a hardware diagnosis procedure.",
                       "13.20.01 Paper jam in the duplexer area of the print engine.",
                       "Open the rear door and remove the jammed paper carefully.",
                       "Check the duplexer rollers for wear and clean them with a lint-free cloth.",
                       "If the error persists after the inspection, replace the duplexer assembly RM2-6454-000."];
    let tag_line = format!("Internal build reference {tag}.");
    let page2_lines = ["4. Maintenance",
                       "Scheduled maintenance keeps the fuser and transfer components within specification.",
                       "Replace the maintenance kit when the counter reaches the published page threshold.",
                       "After replacing the kit, reset the maintenance counter from the service menu.",
                       "Additional procedures are published at https://support.hp.com/e87740/service.",
                       "Refer to the video walkthrough at https://www.youtube.com/watch?v=abc123defg0.",
                       tag_line.as_str()];

    let mut page_ids = Vec::new();
    for lines in [page1_lines.as_slice(), page2_lines.as_slice()] {
        let mut operations = vec![Operation::new("BT", vec![]),
                                  Operation::new("Tf", vec!["F1".into(), 11.into()]),
                                  Operation::new("Td", vec![40.into(), 760.into()])];
        for line in lines {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            operations.push(Operation::new("Td", vec![0.into(), (-14).into()]));
        }
        operations.push(Operation::new("ET", vec![]));
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        page_ids.push(page_id);
    }

    let kids: Vec<Object> = page_ids.iter().map(|&id| id.into()).collect();
    doc.objects.insert(pages_id,
                       Object::Dictionary(dictionary! {
                           "Type" => "Pages",
                           "Kids" => kids,
                           "Count" => page_ids.len() as i64,
                       }));
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("save test pdf");
}

fn build_pipeline(pool: sqlx::PgPool, store: Arc<InMemoryObjectStorage>) -> Arc<MasterPipeline> {
    let collector = Arc::new(PerformanceCollector::new());
    let documents = DocumentRepository::new(pool.clone());
    let intelligence = Arc::new(IntelligenceRepository::new(pool.clone()));
    let ai = Arc::new(MockAiService::default());
    let visual: Arc<dyn VisualEmbedder> = Arc::new(MockVisualEmbedder::new(1031));

    let processors: Vec<Arc<dyn StageProcessor>> =
        vec![Arc::new(UploadStage::new(documents.clone())),
             Arc::new(TextStage::new(Arc::clone(&intelligence), ChunkerConfig::default())),
             Arc::new(ImageStage::new(Some(Arc::new(MockOcr)), None, ImageStageConfig::default())),
             Arc::new(ClassificationStage::new(documents.clone(), CatalogRepository::new(pool.clone()), Some(ai.clone()))),
             Arc::new(MetadataStage::new(documents.clone(), Arc::clone(&intelligence), PartsRepository::new(pool.clone()))),
             Arc::new(StorageStage::new(ContentRepository::new(pool.clone()), store)),
             Arc::new(EmbeddingStage::new(Arc::clone(&intelligence), ai, Some(visual))),
             Arc::new(SearchStage::new(Arc::clone(&intelligence), Arc::clone(&collector))),
             Arc::new(LinkStage::new(ContentRepository::new(pool.clone()), false)),
             Arc::new(StructuredStage::new(Arc::clone(&intelligence)))];

    let engine = PipelineEngine::new(Arc::new(PgCompletionStore::new(pool.clone())),
                                     Arc::new(PgErrorLog::new(pool.clone())),
                                     Arc::new(PgRetryPolicyStore::new(pool.clone())),
                                     collector);
    let tracker = Arc::new(StageTracker::new(pool.clone()));
    Arc::new(MasterPipeline::new(engine, tracker, documents, processors))
}

async fn table_count(pool: &sqlx::PgPool, sql: &str, doc: Uuid) -> i64 {
    sqlx::query_scalar(sql).bind(doc).fetch_one(pool).await.expect("count query")
}

#[tokio::test]
async fn full_pipeline_run_is_idempotent() {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("skip full_pipeline_run_is_idempotent (no DATABASE_URL)");
        return;
    }
    let pool = build_pool_from_env().await.expect("pool");
    let store = Arc::new(InMemoryObjectStorage::new());
    let pipeline = build_pipeline(pool.clone(), Arc::clone(&store));

    let dir = tempfile::tempdir().expect("tempdir");
    let pdf_path: PathBuf = dir.path().join("HP_E87740_SM.pdf");
    build_test_pdf(&pdf_path, &Uuid::new_v4().to_string());

    // Primera corrida completa.
    let doc_id = Uuid::new_v4();
    let mut ctx = ProcessingContext::new(doc_id, "test-run-1", pdf_path.clone(), "HP_E87740_SM.pdf");
    let summary = pipeline.process_document(&mut ctx).await;
    assert!(summary.failed_stage.is_none(), "pipeline failed at {:?}", summary.failed_stage);
    assert!(summary.retrying_stage.is_none());
    assert_eq!(summary.completed_stages.len(), 10);

    // Artefactos: documento, chunks con embedding, metadata, stage_status.
    let chunks = table_count(&pool, "SELECT COUNT(*) FROM krai_intelligence.chunks WHERE document_id = $1", doc_id).await;
    assert!(chunks >= 1, "expected chunks, got {chunks}");
    let embeddings = table_count(&pool,
                                 "SELECT COUNT(*) FROM krai_intelligence.unified_embeddings WHERE metadata->>'document_id' = $1::text",
                                 doc_id).await;
    assert!(embeddings >= chunks, "expected >= {chunks} embeddings, got {embeddings}");
    let error_codes = table_count(&pool, "SELECT COUNT(*) FROM krai_intelligence.error_codes WHERE document_id = $1", doc_id).await;
    assert!(error_codes >= 1, "expected HP error code 13.20.01 extracted");
    let links = table_count(&pool, "SELECT COUNT(*) FROM krai_content.links WHERE document_id = $1", doc_id).await;
    assert!(links >= 1, "expected support link extracted");
    let videos = table_count(&pool, "SELECT COUNT(*) FROM krai_content.videos WHERE document_id = $1", doc_id).await;
    assert_eq!(videos, 1, "expected one deduped youtube video");

    let status = pipeline.tracker().read_status(doc_id).await.unwrap().expect("status");
    assert!((status.overall_progress - 1.0).abs() < 1e-9, "overall_progress={}", status.overall_progress);
    assert!(!status.can_retry);

    // Segunda corrida con los mismos bytes: dedupe en upload, cero filas
    // nuevas en cualquier tabla de contenido.
    let mut ctx2 = ProcessingContext::new(Uuid::new_v4(), "test-run-2", pdf_path, "HP_E87740_SM.pdf");
    let summary2 = pipeline.process_document(&mut ctx2).await;
    assert_eq!(summary2.duplicate_of, Some(doc_id));
    assert_eq!(ctx2.document_id, doc_id, "duplicate upload must return the existing document id");

    let chunks2 = table_count(&pool, "SELECT COUNT(*) FROM krai_intelligence.chunks WHERE document_id = $1", doc_id).await;
    assert_eq!(chunks2, chunks, "duplicate run must not add chunks");
    let embeddings2 = table_count(&pool,
                                  "SELECT COUNT(*) FROM krai_intelligence.unified_embeddings WHERE metadata->>'document_id' = $1::text",
                                  doc_id).await;
    assert_eq!(embeddings2, embeddings, "duplicate run must not add embeddings");
}

#[tokio::test]
async fn single_stage_rerun_is_skipped_when_completed() {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("skip single_stage_rerun_is_skipped_when_completed (no DATABASE_URL)");
        return;
    }
    let pool = build_pool_from_env().await.expect("pool");
    let store = Arc::new(InMemoryObjectStorage::new());
    let pipeline = build_pipeline(pool.clone(), store);

    let dir = tempfile::tempdir().expect("tempdir");
    let pdf_path: PathBuf = dir.path().join("KM_RERUN_SM.pdf");
    build_test_pdf(&pdf_path, &Uuid::new_v4().to_string());

    let doc_id = Uuid::new_v4();
    let mut ctx = ProcessingContext::new(doc_id, "test-rerun", pdf_path, "KM_RERUN_SM.pdf");
    let summary = pipeline.process_document(&mut ctx).await;
    assert!(summary.failed_stage.is_none());

    // Re-corrida del stage de embeddings sin force: marcador intacto ⇒ skip,
    // y el conteo de unified_embeddings no cambia.
    let before = table_count(&pool,
                             "SELECT COUNT(*) FROM krai_intelligence.unified_embeddings WHERE metadata->>'document_id' = $1::text",
                             ctx.document_id).await;
    let result = pipeline.run_single_stage(krai_core::Stage::Embedding, ctx.document_id, false, 1, None)
                         .await
                         .expect("run_single_stage");
    assert_eq!(result.status, ProcessingStatus::SkippedCompleted);
    let after = table_count(&pool,
                            "SELECT COUNT(*) FROM krai_intelligence.unified_embeddings WHERE metadata->>'document_id' = $1::text",
                            ctx.document_id).await;
    assert_eq!(before, after);
}
