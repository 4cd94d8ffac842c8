//! Etapas canónicas del pipeline y su estado persistible.
//!
//! El orden canónico es fijo; `documents.stage_status` guarda una entrada por
//! etapa con el shape de `StageEntry`.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Las diez etapas canónicas, en orden de ejecución.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Upload,
    Text,
    Image,
    Classification,
    Metadata,
    Storage,
    Embedding,
    Search,
    Link,
    StructuredExtraction,
}

impl Stage {
    /// Orden canónico completo.
    pub const ALL: [Stage; 10] = [Stage::Upload,
                                  Stage::Text,
                                  Stage::Image,
                                  Stage::Classification,
                                  Stage::Metadata,
                                  Stage::Storage,
                                  Stage::Embedding,
                                  Stage::Search,
                                  Stage::Link,
                                  Stage::StructuredExtraction];

    /// Nombre estable en minúsculas (clave JSONB y columna stage_name).
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Text => "text",
            Stage::Image => "image",
            Stage::Classification => "classification",
            Stage::Metadata => "metadata",
            Stage::Storage => "storage",
            Stage::Embedding => "embedding",
            Stage::Search => "search",
            Stage::Link => "link",
            Stage::StructuredExtraction => "structured_extraction",
        }
    }

    pub fn parse(s: &str) -> Option<Stage> {
        Stage::ALL.iter().copied().find(|st| st.as_str() == s)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estado persistible de una etapa dentro de `stage_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl StageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageState::Pending => "pending",
            StageState::Processing => "processing",
            StageState::Completed => "completed",
            StageState::Failed => "failed",
        }
    }
}

/// Entrada JSONB por etapa dentro de `documents.stage_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEntry {
    pub status: StageState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Progreso [0,1] reportado por el stage (1.0 al completar).
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl StageEntry {
    pub fn started() -> Self {
        StageEntry { status: StageState::Processing,
                     started_at: Some(Utc::now()),
                     completed_at: None,
                     progress: 0.0,
                     error: None,
                     metadata: serde_json::Value::Null }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip_all_stages() {
        for s in Stage::ALL {
            assert_eq!(Stage::parse(s.as_str()), Some(s));
        }
        assert_eq!(Stage::parse("nope"), None);
    }
}
