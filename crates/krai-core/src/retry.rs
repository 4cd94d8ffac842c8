//! Modelo de políticas de reintento y cálculo de backoff.
//!
//! La política se resuelve por especificidad: (service, stage) →
//! (service, NULL) → (NULL, stage) → defaults. La fuente concreta (tabla
//! `krai_system.retry_policies` con cache TTL) vive en la capa de
//! persistencia; aquí sólo el contrato y los defaults.
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::StageError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub service_name: Option<String>,
    pub stage_name: Option<String>,
    pub max_attempts: u32,
    pub base_delay_seconds: f64,
    pub max_delay_seconds: f64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
    /// Desempate cuando varias filas matchean con igual especificidad.
    pub priority: i32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy { service_name: None,
                      stage_name: None,
                      max_attempts: 3,
                      base_delay_seconds: 2.0,
                      max_delay_seconds: 60.0,
                      backoff_multiplier: 2.0,
                      jitter_factor: 0.1,
                      priority: 0 }
    }
}

impl RetryPolicy {
    /// Especificidad para el orden de resolución (mayor gana).
    pub fn specificity(&self) -> u8 {
        match (&self.service_name, &self.stage_name) {
            (Some(_), Some(_)) => 3,
            (Some(_), None) => 2,
            (None, Some(_)) => 1,
            (None, None) => 0,
        }
    }
}

/// Delay exponencial con jitter: `min(base·mult^(attempt−1), max)·(1 ± j)`.
/// `attempt` es 1-based (attempt=1 ⇒ base).
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = policy.base_delay_seconds * policy.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
    let capped = exp.min(policy.max_delay_seconds);
    let jitter = if policy.jitter_factor > 0.0 {
        let mut rng = rand::thread_rng();
        rng.gen_range(-policy.jitter_factor..=policy.jitter_factor)
    } else {
        0.0
    };
    Duration::from_secs_f64((capped * (1.0 + jitter)).max(0.0))
}

/// Fuente de políticas (service, stage) → política resuelta.
#[async_trait]
pub trait RetryPolicySource: Send + Sync {
    async fn resolve(&self, service_name: &str, stage_name: &str) -> Result<RetryPolicy, StageError>;
}

/// Fuente estática in-memory (tests y fallback sin DB): resuelve por
/// especificidad sobre una lista fija.
pub struct StaticRetryPolicies {
    policies: Vec<RetryPolicy>,
}

impl StaticRetryPolicies {
    pub fn new(policies: Vec<RetryPolicy>) -> Self {
        Self { policies }
    }

    pub fn empty() -> Self {
        Self { policies: Vec::new() }
    }
}

/// Selección más-específica-primero compartida entre fuentes.
pub fn resolve_most_specific(policies: &[RetryPolicy], service_name: &str, stage_name: &str) -> RetryPolicy {
    let matches = |p: &&RetryPolicy| {
        let svc_ok = p.service_name.as_deref().map(|s| s == service_name).unwrap_or(true);
        let stage_ok = p.stage_name.as_deref().map(|s| s == stage_name).unwrap_or(true);
        svc_ok && stage_ok
    };
    policies.iter()
            .filter(matches)
            .max_by_key(|p| (p.specificity(), p.priority))
            .cloned()
            .unwrap_or_default()
}

#[async_trait]
impl RetryPolicySource for StaticRetryPolicies {
    async fn resolve(&self, service_name: &str, stage_name: &str) -> Result<RetryPolicy, StageError> {
        Ok(resolve_most_specific(&self.policies, service_name, stage_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(svc: Option<&str>, stage: Option<&str>, max: u32) -> RetryPolicy {
        RetryPolicy { service_name: svc.map(String::from),
                      stage_name: stage.map(String::from),
                      max_attempts: max,
                      ..RetryPolicy::default() }
    }

    #[test]
    fn resolution_prefers_exact_pair() {
        let ps = vec![policy(Some("ollama"), None, 5),
                      policy(None, Some("embedding"), 7),
                      policy(Some("ollama"), Some("embedding"), 9)];
        let r = resolve_most_specific(&ps, "ollama", "embedding");
        assert_eq!(r.max_attempts, 9);
    }

    #[test]
    fn resolution_falls_back_to_service_then_stage_then_defaults() {
        let ps = vec![policy(Some("ollama"), None, 5), policy(None, Some("embedding"), 7)];
        assert_eq!(resolve_most_specific(&ps, "ollama", "text").max_attempts, 5);
        assert_eq!(resolve_most_specific(&ps, "minio", "embedding").max_attempts, 7);
        let d = resolve_most_specific(&ps, "minio", "text");
        assert_eq!(d.max_attempts, 3);
        assert_eq!(d.base_delay_seconds, 2.0);
        assert_eq!(d.max_delay_seconds, 60.0);
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let p = RetryPolicy { jitter_factor: 0.0,
                              ..RetryPolicy::default() };
        assert_eq!(backoff_delay(&p, 1).as_secs_f64(), 2.0);
        assert_eq!(backoff_delay(&p, 2).as_secs_f64(), 4.0);
        assert_eq!(backoff_delay(&p, 3).as_secs_f64(), 8.0);
        // attempt grande queda limitado por max_delay_seconds
        assert_eq!(backoff_delay(&p, 20).as_secs_f64(), 60.0);
    }

    #[test]
    fn jitter_stays_within_factor() {
        let p = RetryPolicy::default(); // jitter 0.1, base 2.0
        for _ in 0..50 {
            let d = backoff_delay(&p, 1).as_secs_f64();
            assert!((1.8..=2.2).contains(&d), "delay fuera de rango: {d}");
        }
    }
}
