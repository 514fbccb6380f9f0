//! Idempotency key resolution.
//!
//! The key is the backend's deduplication identity for a submitted job:
//! identical HASH keys are treated as the same logical request, UNIQUE keys
//! never collide, and CUSTOM keys are the caller's responsibility.

use crate::step::{IdempotentStrategy, Step};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Prefix of keys derived by hashing.
pub const HASH_KEY_PREFIX: &str = "idem:";

/// Resolves the idempotency key for a step on behalf of a customer.
#[must_use]
pub fn resolve(step: &Step, customer_id: &str) -> String {
    match step.idempotent_strategy() {
        IdempotentStrategy::Custom => step.idempotent_key().unwrap_or_default().to_string(),
        IdempotentStrategy::Unique => unique_key(),
        IdempotentStrategy::Hash => {
            let target = step.target();
            hash_key(&target.url, &target.method, target.body_or_empty(), customer_id)
        }
    }
}

/// Derives a deterministic key from the (url, method, body, customer) tuple.
///
/// Each field is length-prefixed so that moving bytes between adjacent
/// fields changes the digest. The SHA-256 digest is truncated to 128 bits.
#[must_use]
pub fn hash_key(url: &str, method: &str, body: &str, customer_id: &str) -> String {
    let mut hasher = Sha256::new();
    for field in [url, method, body, customer_id] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    let digest = hasher.finalize();
    format!("{HASH_KEY_PREFIX}{}", hex::encode(&digest[..16]))
}

/// Generates a fresh random key.
#[must_use]
pub fn unique_key() -> String {
    Uuid::new_v4().to_string()
}
