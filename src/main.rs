//! Binario `krai-server`: arma el pipeline completo y sirve la API de
//! ingesta.
use std::sync::Arc;

use log::{info, warn};

use krai_adapters::chunking::ChunkerConfig;
use krai_adapters::stages::{ClassificationStage, EmbeddingStage, ImageStage, LinkStage, MetadataStage, SearchStage,
                            StorageStage, StructuredStage, TextStage, UploadStage};
use krai_adapters::stages::ImageStageConfig;
use krai_core::{PerformanceCollector, PipelineEngine, StageProcessor};
use krai_persistence::{build_pool, CatalogRepository, ContentRepository, DocumentRepository, IntelligenceRepository,
                       PartsRepository, PgCompletionStore, PgErrorLog, PgRetryPolicyStore, StageTracker};
use krai_providers::{AiService, HttpVisualEmbedder, InMemoryObjectStorage, ObjectStorage, OllamaProvider, S3Config,
                     S3ObjectStorage, TesseractOcr, VisualEmbedder};
use krai_rust::api::{self, AppState};
use krai_rust::config::CONFIG;
use krai_rust::pipeline::{MasterPipeline, RetryWorker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cfg = &*CONFIG;

    // 1. Pool único compartido + migraciones.
    let pool = build_pool(&cfg.database.url, cfg.database.min_connections, cfg.database.max_connections).await?;

    // 2. Colector de métricas inyectado explícitamente (sin singletons).
    let collector = Arc::new(PerformanceCollector::new());

    // 3. Repositorios.
    let documents = DocumentRepository::new(pool.clone()).with_collector(Arc::clone(&collector));
    let catalog = CatalogRepository::new(pool.clone());
    let content = ContentRepository::new(pool.clone());
    let intelligence = Arc::new(IntelligenceRepository::new(pool.clone()).with_collector(Arc::clone(&collector)));
    let parts = PartsRepository::new(pool.clone());
    let tracker = Arc::new(StageTracker::new(pool.clone()));

    // 4. Proveedores externos.
    let ai: Arc<dyn AiService> = Arc::new(OllamaProvider::new(&cfg.ai.ollama_url,
                                                              &cfg.ai.embedding_model,
                                                              &cfg.ai.completion_model,
                                                              &cfg.ai.vision_model,
                                                              krai_core::constants::EMBEDDING_DIM,
                                                              cfg.ai.embedding_max_prompt_chars));
    let object_store: Arc<dyn ObjectStorage> = if cfg.storage.upload_enabled && !cfg.storage.access_key.is_empty() {
        Arc::new(S3ObjectStorage::new(S3Config { endpoint: cfg.storage.endpoint.clone(),
                                                 access_key: cfg.storage.access_key.clone(),
                                                 secret_key: cfg.storage.secret_key.clone(),
                                                 bucket: cfg.storage.bucket_images.clone(),
                                                 public_url_base: cfg.storage.public_url_images.clone() })?)
    } else {
        warn!("object storage credentials missing or uploads disabled; using in-memory store");
        Arc::new(InMemoryObjectStorage::new())
    };
    let ocr = Arc::new(TesseractOcr::new("eng"));
    let visual: Option<Arc<dyn VisualEmbedder>> =
        cfg.ai.visual_embedding_endpoint
           .as_ref()
           .map(|ep| Arc::new(HttpVisualEmbedder::new(ep, &cfg.ai.visual_embedding_model)) as Arc<dyn VisualEmbedder>);

    // 5. Stages en orden canónico.
    let chunker = ChunkerConfig { hierarchical: cfg.pipeline.enable_hierarchical_chunking,
                                  allow_short: cfg.pipeline.allow_short_chunks,
                                  ..ChunkerConfig::default() };
    let image_cfg = ImageStageConfig { ocr_enabled: cfg.pipeline.ocr_enabled,
                                       vision_enabled: cfg.pipeline.vision_enabled,
                                       concurrency: cfg.pipeline.stage_concurrency,
                                       ..ImageStageConfig::default() };
    let processors: Vec<Arc<dyn StageProcessor>> =
        vec![Arc::new(UploadStage::new(documents.clone())),
             Arc::new(TextStage::new(Arc::clone(&intelligence), chunker)),
             Arc::new(ImageStage::new(Some(ocr), Some(Arc::clone(&ai)), image_cfg)),
             Arc::new(ClassificationStage::new(documents.clone(), catalog, Some(Arc::clone(&ai)))),
             Arc::new(MetadataStage::new(documents.clone(), Arc::clone(&intelligence), parts)),
             Arc::new(StorageStage::new(content.clone(), Arc::clone(&object_store))),
             Arc::new(EmbeddingStage::new(Arc::clone(&intelligence), Arc::clone(&ai), visual)),
             Arc::new(SearchStage::new(Arc::clone(&intelligence), Arc::clone(&collector))),
             Arc::new(LinkStage::new(content, true)),
             Arc::new(StructuredStage::new(Arc::clone(&intelligence)))];

    // 6. Engine + worker de retries (dependencia circular resuelta por bind).
    let errors = Arc::new(PgErrorLog::new(pool.clone()));
    let worker = Arc::new(RetryWorker::new(pool.clone(), Arc::clone(&errors)));
    let engine = PipelineEngine::new(Arc::new(PgCompletionStore::new(pool.clone())),
                                     errors,
                                     Arc::new(PgRetryPolicyStore::new(pool.clone())),
                                     Arc::clone(&collector)).with_scheduler(Arc::clone(&worker) as _);
    let pipeline = Arc::new(MasterPipeline::new(engine, Arc::clone(&tracker), documents.clone(), processors));
    worker.bind(Arc::clone(&pipeline));

    // 7. API.
    let state = AppState { pipeline,
                           tracker,
                           documents,
                           intelligence,
                           ai,
                           upload_dir: cfg.pipeline.upload_dir.clone().into() };
    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(&cfg.server.bind_addr).await?;
    info!("krai-server listening on {}", cfg.server.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
