use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use krai_core::{ErrorStatus, InMemoryCompletionStore, InMemoryErrorLog, PerformanceCollector, PipelineEngine,
                ProcessingContext, ProcessingStatus, RetryPolicy, RetryRequest, RetryScheduler, Stage, StageError,
                StageProcessor, StageSuccess, StaticRetryPolicies};

/// Stage que falla con 503 las primeras `failures` invocaciones y luego
/// responde bien.
struct FlakyStage {
    calls: AtomicU32,
    failures: u32,
}

impl FlakyStage {
    fn new(failures: u32) -> Self {
        Self { calls: AtomicU32::new(0),
               failures }
    }
}

#[async_trait]
impl StageProcessor for FlakyStage {
    fn stage(&self) -> Stage {
        Stage::Embedding
    }
    fn service_name(&self) -> &str {
        "ollama"
    }
    fn context_fingerprint(&self, ctx: &ProcessingContext) -> serde_json::Value {
        json!({"file_hash": ctx.file_hash})
    }
    async fn process(&self, _ctx: &mut ProcessingContext) -> Result<StageSuccess, StageError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            Err(StageError::Http { status: 503,
                                   message: "service unavailable".into() })
        } else {
            Ok(StageSuccess::Done(json!({"embedded": 12})))
        }
    }
}

struct BadInputStage;

#[async_trait]
impl StageProcessor for BadInputStage {
    fn stage(&self) -> Stage {
        Stage::Upload
    }
    fn context_fingerprint(&self, _ctx: &ProcessingContext) -> serde_json::Value {
        json!({})
    }
    async fn process(&self, _ctx: &mut ProcessingContext) -> Result<StageSuccess, StageError> {
        Err(StageError::InvalidFileType("text/plain".into()))
    }
}

/// Scheduler de prueba: sólo registra lo agendado.
#[derive(Default)]
struct RecordingScheduler {
    requests: Mutex<Vec<RetryRequest>>,
}

#[async_trait]
impl RetryScheduler for RecordingScheduler {
    async fn schedule(&self, request: RetryRequest) {
        self.requests.lock().await.push(request);
    }
}

fn fast_policies() -> StaticRetryPolicies {
    StaticRetryPolicies::new(vec![RetryPolicy { service_name: Some("ollama".into()),
                                                base_delay_seconds: 0.01,
                                                jitter_factor: 0.0,
                                                ..RetryPolicy::default() }])
}

fn engine_parts() -> (Arc<InMemoryCompletionStore>, Arc<InMemoryErrorLog>) {
    (Arc::new(InMemoryCompletionStore::new()), Arc::new(InMemoryErrorLog::new()))
}

fn ctx() -> ProcessingContext {
    let mut c = ProcessingContext::new(Uuid::new_v4(), "req-test", PathBuf::from("/tmp/doc.pdf"), "doc.pdf");
    c.file_hash = Some("aa".repeat(32));
    c
}

#[tokio::test]
async fn success_sets_marker_and_second_run_is_skipped() {
    let (markers, errors) = engine_parts();
    let engine = PipelineEngine::new(markers.clone(), errors.clone(), Arc::new(fast_policies()), Arc::new(PerformanceCollector::new()));
    let stage = FlakyStage::new(0);
    let mut c = ctx();

    let r1 = engine.safe_process(&stage, &mut c).await;
    assert_eq!(r1.status, ProcessingStatus::Completed);
    assert_eq!(markers.len(), 1);

    let r2 = engine.safe_process(&stage, &mut c).await;
    assert_eq!(r2.status, ProcessingStatus::SkippedCompleted);
    // sin segunda ejecución real
    assert_eq!(stage.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn changed_context_hash_re_runs_stage() {
    let (markers, errors) = engine_parts();
    let engine = PipelineEngine::new(markers, errors, Arc::new(fast_policies()), Arc::new(PerformanceCollector::new()));
    let stage = FlakyStage::new(0);
    let mut c = ctx();

    let _ = engine.safe_process(&stage, &mut c).await;
    c.file_hash = Some("bb".repeat(32));
    let r2 = engine.safe_process(&stage, &mut c).await;
    assert_eq!(r2.status, ProcessingStatus::Completed);
    assert_eq!(stage.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn transient_failure_schedules_background_retry() {
    let (markers, errors) = engine_parts();
    let scheduler = Arc::new(RecordingScheduler::default());
    let engine = PipelineEngine::new(markers.clone(), errors.clone(), Arc::new(fast_policies()), Arc::new(PerformanceCollector::new()))
        .with_scheduler(scheduler.clone());
    let stage = FlakyStage::new(1);
    let mut c = ctx();

    let r = engine.safe_process(&stage, &mut c).await;
    assert_eq!(r.status, ProcessingStatus::Retrying);
    assert_eq!(r.next_attempt, Some(2));

    let scheduled = scheduler.requests.lock().await;
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].attempt, 2);
    assert_eq!(scheduled[0].stage, Stage::Embedding);
    // correlation id del próximo intento difiere del actual
    assert_ne!(scheduled[0].correlation_id, r.correlation_id);

    let errs = errors.snapshot();
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].status, ErrorStatus::Retrying);
    assert_eq!(errs[0].attempt, 2);
    // sin marcador: el stage no completó
    assert!(markers.is_empty());
}

#[tokio::test]
async fn without_scheduler_falls_back_to_inline_retry() {
    let (markers, errors) = engine_parts();
    let engine = PipelineEngine::new(markers.clone(), errors.clone(), Arc::new(fast_policies()), Arc::new(PerformanceCollector::new()));
    let stage = FlakyStage::new(1);
    let mut c = ctx();

    let r = engine.safe_process(&stage, &mut c).await;
    assert_eq!(r.status, ProcessingStatus::Completed);
    assert_eq!(r.retry_attempt, 2);
    assert_eq!(stage.calls.load(Ordering::SeqCst), 2);
    assert_eq!(markers.len(), 1);
    // la fila transitoria quedó resuelta
    let errs = errors.snapshot();
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].status, ErrorStatus::Resolved);
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let (markers, errors) = engine_parts();
    let engine = PipelineEngine::new(markers.clone(), errors.clone(), Arc::new(fast_policies()), Arc::new(PerformanceCollector::new()));
    let mut c = ctx();

    let r = engine.safe_process(&BadInputStage, &mut c).await;
    assert_eq!(r.status, ProcessingStatus::Failed);
    let errs = errors.snapshot();
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].status, ErrorStatus::Failed);
    assert_eq!(errs[0].error_type, "invalid_file_type");
    assert!(markers.is_empty());
}

#[tokio::test]
async fn force_flag_re_runs_completed_stage() {
    let (markers, errors) = engine_parts();
    let engine = PipelineEngine::new(markers, errors, Arc::new(fast_policies()), Arc::new(PerformanceCollector::new()));
    let stage = FlakyStage::new(0);
    let mut c = ctx();

    let _ = engine.safe_process(&stage, &mut c).await;
    c.force = true;
    let r = engine.safe_process(&stage, &mut c).await;
    assert_eq!(r.status, ProcessingStatus::Completed);
    assert_eq!(stage.calls.load(Ordering::SeqCst), 2);
}
