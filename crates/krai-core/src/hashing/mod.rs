//! Canonicalización JSON y helpers de hash del pipeline.

pub mod canonical_json;
pub mod hash;

pub use canonical_json::to_canonical_json;
pub use hash::{advisory_lock_key, correlation_id, hash_str, hash_value};
