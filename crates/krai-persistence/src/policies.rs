//! Store de políticas de reintento con cache TTL y single-flight por clave.
//!
//! - Cache key: `(service_name, stage_name)`, TTL 60 s.
//! - Un `fetch_lock` por clave evita el thundering-herd: llamadores
//!   concurrentes de la misma clave esperan un único fetch a DB
//!   (double-checked bajo el lock).
//! - Resolución más-específica-primero delegada al core
//!   (`resolve_most_specific`).
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, warn};
use sqlx::{PgPool, Row};
use tokio::sync::Mutex;

use krai_core::constants::RETRY_POLICY_CACHE_TTL_SECS;
use krai_core::retry::resolve_most_specific;
use krai_core::{RetryPolicy, RetryPolicySource, StageError};

use crate::error::PersistenceError;

type CacheKey = (String, String);

struct CacheEntry {
    resolved: RetryPolicy,
    fetched_at: Instant,
}

pub struct PgRetryPolicyStore {
    pool: PgPool,
    ttl: Duration,
    cache: Mutex<HashMap<CacheKey, CacheEntry>>,
    fetch_locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl PgRetryPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool,
               ttl: Duration::from_secs(RETRY_POLICY_CACHE_TTL_SECS),
               cache: Mutex::new(HashMap::new()),
               fetch_locks: Mutex::new(HashMap::new()) }
    }

    async fn cached(&self, key: &CacheKey) -> Option<RetryPolicy> {
        let cache = self.cache.lock().await;
        cache.get(key)
             .filter(|e| e.fetched_at.elapsed() < self.ttl)
             .map(|e| e.resolved.clone())
    }

    async fn fetch_lock_for(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self.fetch_locks.lock().await;
        locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Trae de DB todas las filas candidatas para (service, stage) y resuelve
    /// en memoria por especificidad.
    async fn fetch_resolved(&self, service_name: &str, stage_name: &str) -> Result<RetryPolicy, PersistenceError> {
        let rows = sqlx::query("SELECT service_name, stage_name, max_attempts, base_delay_seconds, max_delay_seconds, \
                                       backoff_multiplier, jitter_factor, priority \
                                FROM krai_system.retry_policies \
                                WHERE (service_name = $1 OR service_name IS NULL) \
                                  AND (stage_name = $2 OR stage_name IS NULL)")
            .bind(service_name)
            .bind(stage_name)
            .fetch_all(&self.pool)
            .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let max_attempts: i32 = row.try_get("max_attempts")?;
            candidates.push(RetryPolicy { service_name: row.try_get("service_name")?,
                                          stage_name: row.try_get("stage_name")?,
                                          max_attempts: max_attempts.max(1) as u32,
                                          base_delay_seconds: row.try_get("base_delay_seconds")?,
                                          max_delay_seconds: row.try_get("max_delay_seconds")?,
                                          backoff_multiplier: row.try_get("backoff_multiplier")?,
                                          jitter_factor: row.try_get("jitter_factor")?,
                                          priority: row.try_get("priority")? });
        }
        Ok(resolve_most_specific(&candidates, service_name, stage_name))
    }
}

#[async_trait]
impl RetryPolicySource for PgRetryPolicyStore {
    async fn resolve(&self, service_name: &str, stage_name: &str) -> Result<RetryPolicy, StageError> {
        let key = (service_name.to_string(), stage_name.to_string());

        // Camino rápido: cache vigente.
        if let Some(p) = self.cached(&key).await {
            return Ok(p);
        }

        // Single-flight: un solo fetch por clave; el resto espera.
        let flight = self.fetch_lock_for(&key).await;
        let _guard = flight.lock().await;

        // Double-check: otro caller pudo llenar el cache mientras esperábamos.
        if let Some(p) = self.cached(&key).await {
            return Ok(p);
        }

        match self.fetch_resolved(service_name, stage_name).await {
            Ok(resolved) => {
                debug!("retry policy resolved for ({service_name}, {stage_name}): max_attempts={}",
                       resolved.max_attempts);
                let mut cache = self.cache.lock().await;
                cache.insert(key,
                             CacheEntry { resolved: resolved.clone(),
                                          fetched_at: Instant::now() });
                Ok(resolved)
            }
            Err(e) => {
                warn!("retry policy fetch failed for ({service_name}, {stage_name}): {e}; using defaults");
                Ok(RetryPolicy::default())
            }
        }
    }
}
