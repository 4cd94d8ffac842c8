//! Tracker del JSONB `documents.stage_status`.
//!
//! Camino preferido: funciones RPC `krai_system.start_stage` /
//! `update_stage_progress` / `complete_stage` / `fail_stage` (toman el lock
//! de fila internamente). Si el despliegue no las tiene (SQLSTATE 42883), el
//! tracker se auto-deshabilita tras el primer fallo —con un único mensaje
//! accionable— y pasa a UPDATEs inline con `jsonb_set`.
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use sqlx::PgPool;
use uuid::Uuid;

use krai_core::{Stage, StageEntry, StageState};

use crate::error::PersistenceError;

pub struct StageTracker {
    pool: PgPool,
    rpc_disabled: AtomicBool,
}

/// Estado agregado devuelto por `read_status`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DocumentStageStatus {
    pub stage_status: serde_json::Value,
    /// Fracción de stages canónicos completados [0,1].
    pub overall_progress: f64,
    /// Hay al menos un stage failed (elegible para retry manual).
    pub can_retry: bool,
}

impl StageTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool,
               rpc_disabled: AtomicBool::new(false) }
    }

    fn rpc_enabled(&self) -> bool {
        !self.rpc_disabled.load(Ordering::Relaxed)
    }

    fn disable_rpc(&self, which: &str, e: &PersistenceError) {
        // Un solo aviso; después silencio (sin spam en cada stage).
        if !self.rpc_disabled.swap(true, Ordering::Relaxed) {
            warn!("stage RPC {which} missing ({e}); switching to inline jsonb_set updates. \
                   Run the krai_system migration set to restore RPC-based tracking.");
        }
    }

    pub async fn start_stage(&self, document_id: Uuid, stage: Stage) -> Result<(), PersistenceError> {
        if self.rpc_enabled() {
            let res = sqlx::query("SELECT krai_system.start_stage($1, $2)").bind(document_id)
                                                                           .bind(stage.as_str())
                                                                           .execute(&self.pool)
                                                                           .await
                                                                           .map_err(PersistenceError::from);
            match res {
                Ok(_) => return Ok(()),
                Err(e @ PersistenceError::MissingObject(_)) => self.disable_rpc("start_stage", &e),
                Err(e) => return Err(e),
            }
        }
        self.write_entry(document_id, stage, &StageEntry::started()).await
    }

    pub async fn update_progress(&self, document_id: Uuid, stage: Stage, progress: f64) -> Result<(), PersistenceError> {
        let clamped = progress.clamp(0.0, 1.0);
        if self.rpc_enabled() {
            let res = sqlx::query("SELECT krai_system.update_stage_progress($1, $2, $3)").bind(document_id)
                                                                                         .bind(stage.as_str())
                                                                                         .bind(clamped)
                                                                                         .execute(&self.pool)
                                                                                         .await
                                                                                         .map_err(PersistenceError::from);
            match res {
                Ok(_) => return Ok(()),
                Err(e @ PersistenceError::MissingObject(_)) => self.disable_rpc("update_stage_progress", &e),
                Err(e) => return Err(e),
            }
        }
        // Inline: sólo el campo progress.
        sqlx::query("UPDATE krai_core.documents \
                     SET stage_status = jsonb_set(COALESCE(stage_status, '{}'::jsonb), ARRAY[$2, 'progress'], to_jsonb($3::float8), true), \
                         updated_at = now() \
                     WHERE id = $1")
            .bind(document_id)
            .bind(stage.as_str())
            .bind(clamped)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn complete_stage(&self, document_id: Uuid, stage: Stage, metadata: serde_json::Value) -> Result<(), PersistenceError> {
        if self.rpc_enabled() {
            // JSONB como string + ::jsonb (contrato del driver async).
            let meta = serde_json::to_string(&metadata)?;
            let res = sqlx::query("SELECT krai_system.complete_stage($1, $2, $3::jsonb)").bind(document_id)
                                                                                         .bind(stage.as_str())
                                                                                         .bind(meta)
                                                                                         .execute(&self.pool)
                                                                                         .await
                                                                                         .map_err(PersistenceError::from);
            match res {
                Ok(_) => return Ok(()),
                Err(e @ PersistenceError::MissingObject(_)) => self.disable_rpc("complete_stage", &e),
                Err(e) => return Err(e),
            }
        }
        let entry = StageEntry { status: StageState::Completed,
                                 started_at: None,
                                 completed_at: Some(chrono::Utc::now()),
                                 progress: 1.0,
                                 error: None,
                                 metadata };
        self.write_entry(document_id, stage, &entry).await
    }

    pub async fn fail_stage(&self, document_id: Uuid, stage: Stage, error: &str) -> Result<(), PersistenceError> {
        if self.rpc_enabled() {
            let res = sqlx::query("SELECT krai_system.fail_stage($1, $2, $3)").bind(document_id)
                                                                              .bind(stage.as_str())
                                                                              .bind(error)
                                                                              .execute(&self.pool)
                                                                              .await
                                                                              .map_err(PersistenceError::from);
            match res {
                Ok(_) => return Ok(()),
                Err(e @ PersistenceError::MissingObject(_)) => self.disable_rpc("fail_stage", &e),
                Err(e) => return Err(e),
            }
        }
        let entry = StageEntry { status: StageState::Failed,
                                 started_at: None,
                                 completed_at: Some(chrono::Utc::now()),
                                 progress: 0.0,
                                 error: Some(error.to_string()),
                                 metadata: serde_json::Value::Null };
        self.write_entry(document_id, stage, &entry).await
    }

    async fn write_entry(&self, document_id: Uuid, stage: Stage, entry: &StageEntry) -> Result<(), PersistenceError> {
        let entry_json = serde_json::to_string(entry)?;
        sqlx::query("UPDATE krai_core.documents \
                     SET stage_status = jsonb_set(COALESCE(stage_status, '{}'::jsonb), ARRAY[$2], $3::jsonb, true), \
                         updated_at = now() \
                     WHERE id = $1")
            .bind(document_id)
            .bind(stage.as_str())
            .bind(entry_json)
            .execute(&self.pool)
            .await?;
        debug!("stage_status[{stage}] <- {} (doc={document_id})", entry.status.as_str());
        Ok(())
    }

    /// Lee el mapa completo y deriva overall_progress / can_retry.
    pub async fn read_status(&self, document_id: Uuid) -> Result<Option<DocumentStageStatus>, PersistenceError> {
        let status: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT stage_status FROM krai_core.documents WHERE id = $1")
                .bind(document_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(stage_status) = status else { return Ok(None) };
        Ok(Some(Self::derive(stage_status)))
    }

    fn derive(stage_status: serde_json::Value) -> DocumentStageStatus {
        let mut completed = 0usize;
        let mut can_retry = false;
        if let Some(map) = stage_status.as_object() {
            for stage in Stage::ALL {
                match map.get(stage.as_str()).and_then(|e| e.get("status")).and_then(|s| s.as_str()) {
                    Some("completed") => completed += 1,
                    Some("failed") => can_retry = true,
                    _ => {}
                }
            }
        }
        DocumentStageStatus { stage_status,
                              overall_progress: completed as f64 / Stage::ALL.len() as f64,
                              can_retry }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn derive_counts_completed_and_flags_failed() {
        let status = json!({
            "upload": {"status": "completed", "progress": 1.0},
            "text": {"status": "completed", "progress": 1.0},
            "image": {"status": "failed", "progress": 0.2, "error": "boom"},
        });
        let d = StageTracker::derive(status);
        assert!((d.overall_progress - 0.2).abs() < 1e-9);
        assert!(d.can_retry);
    }

    #[test]
    fn derive_empty_map() {
        let d = StageTracker::derive(json!({}));
        assert_eq!(d.overall_progress, 0.0);
        assert!(!d.can_retry);
    }
}
