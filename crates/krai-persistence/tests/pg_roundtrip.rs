use uuid::Uuid;

use krai_core::{advisory_lock_key, CompletionStore, RetryPolicySource, Stage};
use krai_domain::{Document, DocumentType};
use krai_persistence::{build_pool_from_env, AdvisoryLock, DocumentRepository, PgCompletionStore, PgRetryPolicyStore,
                       StageTracker};

fn hash_for(byte: u8) -> String {
    format!("{:02x}", byte).repeat(32)
}

#[tokio::test]
async fn markers_tracker_policies_and_locks_roundtrip() {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("skip markers_tracker_policies_and_locks_roundtrip (no DATABASE_URL)");
        return;
    }
    let pool = build_pool_from_env().await.expect("pool");

    // Documento base para las FKs.
    let docs = DocumentRepository::new(pool.clone());
    let mut doc = Document::new(&hash_for(0x5a), "KM_C759_SM.pdf", 42, DocumentType::ServiceManual).unwrap();
    doc.id = Uuid::new_v4();
    // hash único por corrida para no chocar con corridas previas
    doc.file_hash = krai_core::hash_str(&doc.id.to_string());
    docs.insert(&doc).await.expect("insert document");
    let found = docs.find_by_hash(&doc.file_hash).await.expect("find").expect("document by hash");
    assert_eq!(found.id, doc.id);

    // Marcadores: upsert + verificación por hash.
    let markers = PgCompletionStore::new(pool.clone());
    assert!(!markers.is_completed(doc.id, Stage::Text, "h1").await.unwrap());
    markers.set_marker(doc.id, Stage::Text, "h1").await.unwrap();
    assert!(markers.is_completed(doc.id, Stage::Text, "h1").await.unwrap());
    assert!(!markers.is_completed(doc.id, Stage::Text, "h2").await.unwrap());
    markers.set_marker(doc.id, Stage::Text, "h2").await.unwrap();
    assert!(markers.is_completed(doc.id, Stage::Text, "h2").await.unwrap());

    // Tracker: start → progress → complete; overall_progress derivado.
    let tracker = StageTracker::new(pool.clone());
    tracker.start_stage(doc.id, Stage::Upload).await.unwrap();
    tracker.update_progress(doc.id, Stage::Upload, 0.5).await.unwrap();
    tracker.complete_stage(doc.id, Stage::Upload, serde_json::json!({"pages": 42})).await.unwrap();
    tracker.fail_stage(doc.id, Stage::Image, "boom").await.unwrap();
    let status = tracker.read_status(doc.id).await.unwrap().expect("status");
    assert!((status.overall_progress - 0.1).abs() < 1e-9);
    assert!(status.can_retry);

    // Políticas: la semilla de migración para 'ollama' debe resolver.
    let policies = PgRetryPolicyStore::new(pool.clone());
    let p = policies.resolve("ollama", "embedding").await.unwrap();
    assert!(p.max_attempts >= 3);
    // segunda resolución sale del cache (mismo valor)
    let p2 = policies.resolve("ollama", "embedding").await.unwrap();
    assert_eq!(p.max_attempts, p2.max_attempts);

    // Advisory locks: la clave es determinista y excluyente entre sesiones.
    let key = advisory_lock_key(doc.id, "embedding");
    assert_eq!(key, advisory_lock_key(doc.id, "embedding"));
    let first = AdvisoryLock::try_acquire(&pool, key).await.unwrap().expect("first lock");
    let second = AdvisoryLock::try_acquire(&pool, key).await.unwrap();
    assert!(second.is_none(), "second session must not acquire the same key");
    first.release().await.unwrap();
    let third = AdvisoryLock::try_acquire(&pool, key).await.unwrap();
    assert!(third.is_some(), "released key must be acquirable again");
    third.unwrap().release().await.unwrap();
}
