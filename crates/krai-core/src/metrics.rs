//! Colector de métricas de rendimiento por stage y por llamada externa.
//!
//! Se inyecta explícitamente por constructor (nada de singletons): el engine
//! registra duración por stage; los repositorios y clientes pueden registrar
//! sus llamadas con `record_call`.
use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub count: usize,
    pub mean_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
}

/// Muestras de duración por nombre lógico ("stage:text", "db:insert_chunks",
/// "api:ollama_embed").
#[derive(Default)]
pub struct PerformanceCollector {
    samples: DashMap<String, Vec<f64>>,
}

impl PerformanceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_stage(&self, stage: &str, duration: Duration) {
        self.record_call(&format!("stage:{stage}"), duration);
    }

    pub fn record_call(&self, name: &str, duration: Duration) {
        self.samples.entry(name.to_string()).or_default().push(duration.as_secs_f64() * 1000.0);
    }

    /// p95 por interpolación inferior (nearest-rank) sobre muestras ordenadas.
    pub fn summary(&self, name: &str) -> Option<MetricSummary> {
        let samples = self.samples.get(name)?;
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let idx = ((count as f64) * 0.95).ceil() as usize;
        let p95 = sorted[idx.saturating_sub(1).min(count - 1)];
        Some(MetricSummary { name: name.to_string(),
                             count,
                             mean_ms: mean,
                             p95_ms: p95,
                             max_ms: *sorted.last().unwrap() })
    }

    pub fn snapshot(&self) -> Vec<MetricSummary> {
        let mut names: Vec<String> = self.samples.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names.iter().filter_map(|n| self.summary(n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p95_over_uniform_samples() {
        let c = PerformanceCollector::new();
        for i in 1..=100u64 {
            c.record_call("db:q", Duration::from_millis(i));
        }
        let s = c.summary("db:q").unwrap();
        assert_eq!(s.count, 100);
        assert_eq!(s.p95_ms, 95.0);
        assert_eq!(s.max_ms, 100.0);
    }

    #[test]
    fn empty_name_returns_none() {
        let c = PerformanceCollector::new();
        assert!(c.summary("nada").is_none());
    }
}
