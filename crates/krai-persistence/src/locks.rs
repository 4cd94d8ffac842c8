//! Advisory locks Postgres con sesión dedicada.
//!
//! El lock es de sesión: se toma y se libera sobre LA MISMA conexión. El
//! guard retiene la conexión del pool mientras el lock vive; `release`
//! desbloquea y devuelve la conexión. Si el guard se dropea sin liberar, la
//! conexión se separa del pool y se cierra, con lo que Postgres libera el
//! lock al morir la sesión (nunca puede quedar un lock colgado en una
//! conexión reciclada).
use log::warn;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};

use crate::error::PersistenceError;

pub struct AdvisoryLock {
    conn: Option<PoolConnection<Postgres>>,
    key: i64,
}

impl AdvisoryLock {
    /// `pg_try_advisory_lock`: devuelve `None` si otro proceso/worker ya lo
    /// tiene (no bloquea).
    pub async fn try_acquire(pool: &PgPool, key: i64) -> Result<Option<AdvisoryLock>, PersistenceError> {
        let mut conn = pool.acquire().await?;
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)").bind(key)
                                                                                  .fetch_one(&mut *conn)
                                                                                  .await?;
        if acquired {
            Ok(Some(AdvisoryLock { conn: Some(conn),
                                   key }))
        } else {
            Ok(None)
        }
    }

    pub fn key(&self) -> i64 {
        self.key
    }

    /// Libera el lock sobre la misma sesión y devuelve la conexión al pool.
    pub async fn release(mut self) -> Result<(), PersistenceError> {
        if let Some(mut conn) = self.conn.take() {
            let _: bool = sqlx::query_scalar("SELECT pg_advisory_unlock($1)").bind(self.key)
                                                                             .fetch_one(&mut *conn)
                                                                             .await?;
        }
        Ok(())
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            // Cerrar la sesión libera el lock del lado del servidor.
            warn!("advisory lock {} dropped without release; detaching connection", self.key);
            drop(conn.detach());
        }
    }
}
