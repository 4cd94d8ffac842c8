//! Configuración de conexión a la base de datos.
//!
//! `DATABASE_URL` manda; en su ausencia se arma la URL desde las variables
//! discretas `DATABASE_HOST/PORT/USER/PASSWORD/NAME`.
use std::env;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

/// Carga .env una sola vez (ignora ausencia del archivo).
pub fn init_dotenv() {
    let _ = dotenvy::dotenv();
}

impl DbConfig {
    pub fn from_env() -> Self {
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| {
                                              let host = env::var("DATABASE_HOST").unwrap_or_else(|_| "127.0.0.1".into());
                                              let port = env::var("DATABASE_PORT").unwrap_or_else(|_| "5432".into());
                                              let user = env::var("DATABASE_USER").unwrap_or_else(|_| "krai".into());
                                              let pass = env::var("DATABASE_PASSWORD").unwrap_or_default();
                                              let name = env::var("DATABASE_NAME").unwrap_or_else(|_| "krai".into());
                                              if pass.is_empty() {
                                                  format!("postgres://{user}@{host}:{port}/{name}")
                                              } else {
                                                  format!("postgres://{user}:{pass}@{host}:{port}/{name}")
                                              }
                                          });
        let min = env::var("DATABASE_MIN_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(2);
        let max = env::var("DATABASE_MAX_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(20);
        DbConfig { url,
                   min_connections: min,
                   max_connections: max.max(min) }
    }
}
