//! krai-rust: wiring de la aplicación (config, pipeline maestro, API).
//!
//! Los contratos del pipeline viven en `krai-core`; los stages concretos en
//! `krai-adapters`; la persistencia Postgres en `krai-persistence`; los
//! clientes externos en `krai-providers`. Este crate arma todo y expone el
//! binario `krai-server`.

pub mod api;
pub mod config;
pub mod pipeline;

pub use config::CONFIG;
pub use pipeline::{MasterPipeline, RetryWorker};
