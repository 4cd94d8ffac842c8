//! Errores de la capa de persistencia y su mapeo al pipeline.
use thiserror::Error;

use krai_core::StageError;

#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Errores de IO/pool considerados transitorios (reintentables).
    #[error("transient io: {0}")]
    TransientIo(String),

    /// Conflicto de serialización/deadlock (reintentable).
    #[error("serialization conflict")]
    SerializationConflict,

    /// Función o tabla ausente en el despliegue (SQLSTATE 42883/42P01).
    #[error("missing database object: {0}")]
    MissingObject(String),

    /// Violación de constraint (dato inválido; no reintentable).
    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("serde: {0}")]
    Serde(String),

    #[error("unknown: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for PersistenceError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                PersistenceError::TransientIo(e.to_string())
            }
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // 40001 serialization_failure, 40P01 deadlock_detected
                Some("40001") | Some("40P01") => PersistenceError::SerializationConflict,
                // 42883 undefined_function, 42P01 undefined_table
                Some("42883") | Some("42P01") => PersistenceError::MissingObject(db.message().to_string()),
                Some(code) if code.starts_with("23") => PersistenceError::Constraint(db.message().to_string()),
                _ => PersistenceError::Unknown(e.to_string()),
            },
            _ => PersistenceError::Unknown(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::Serde(e.to_string())
    }
}

impl From<PersistenceError> for StageError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::MissingObject(m) => StageError::MissingDependency(m),
            PersistenceError::Constraint(m) => StageError::Validation(m),
            PersistenceError::Serde(m) => StageError::Validation(m),
            // El clasificador detecta transitoriedad por el texto del mensaje.
            other => StageError::Database(other.to_string()),
        }
    }
}

/// Retry corto con backoff para la unidad de trabajo `f` (hasta 3 intentos,
/// 15/30/45 ms). Cubre los micro-cortes de pool/conexión y los conflictos de
/// serialización; los fallos sostenidos suben al retry clasificado del
/// engine.
pub async fn with_retry<T, F, Fut>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Fut,
          Fut: std::future::Future<Output = Result<T, PersistenceError>>
{
    let mut attempts = 0u32;
    loop {
        match f().await {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * (attempts + 1) as u64;
                log::warn!("retryable db error (attempt {}): {:?} -> sleeping {}ms", attempts + 1, e, delay_ms);
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Determina si conviene reintentar con backoff (conflictos de
/// serialización e IO transitorio de pool/conexión).
pub fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access due to concurrent update")
            || m.contains("connection closed")
            || m.contains("connection refused")
            || m.contains("timeout")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_conflict_are_retryable() {
        assert!(is_retryable(&PersistenceError::TransientIo("pool".into())));
        assert!(is_retryable(&PersistenceError::SerializationConflict));
        assert!(is_retryable(&PersistenceError::Unknown("deadlock detected".into())));
        assert!(!is_retryable(&PersistenceError::Constraint("dup".into())));
        assert!(!is_retryable(&PersistenceError::MissingObject("f()".into())));
    }
}
