//! Error de proveedor y su mapeo a la taxonomía del pipeline.
use thiserror::Error;

use krai_core::StageError;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("connection: {0}")]
    Connection(String),

    /// Prompt demasiado largo para la ventana del modelo (detectado en el
    /// cuerpo de un 500 estilo Ollama).
    #[error("context length exceeded for model {model}")]
    ContextLimit { model: String },

    #[error("decode: {0}")]
    Decode(String),

    #[error("io: {0}")]
    Io(String),

    #[error("storage: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout(e.to_string())
        } else if e.is_connect() {
            ProviderError::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::Http { status: status.as_u16(),
                                  body: e.to_string() }
        } else {
            ProviderError::Connection(e.to_string())
        }
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(e: std::io::Error) -> Self {
        ProviderError::Io(e.to_string())
    }
}

// El clasificador del core decide transitorio/permanente a partir de la
// variante resultante.
impl From<ProviderError> for StageError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Http { status, body } => StageError::Http { status,
                                                                      message: body },
            ProviderError::Timeout(m) => StageError::Timeout(m),
            ProviderError::Connection(m) => StageError::Connection(m),
            ProviderError::ContextLimit { model } => StageError::ContextLimit { model },
            ProviderError::Decode(m) => StageError::Validation(m),
            ProviderError::Io(m) => StageError::Io(m),
            ProviderError::Storage(m) => StageError::Http { status: 502,
                                                           message: m },
        }
    }
}
