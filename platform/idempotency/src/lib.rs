//! # Idempotency store
//!
//! Request-level idempotency keyed by `(merchant_id, client-supplied key)`, with a body-hash
//! guard, in-flight reservation, and finalized-response replay — the protocol the checkout
//! ingress handler drives in nine steps (see `modules/checkout/src/handlers.rs`).
//!
//! Two implementations share one trait, the same shape as `event_bus`'s `Publisher`/`Consumer`
//! split between a real backend and an in-memory fake:
//! - [`RedisIdempotencyStore`] — production, backed by Redis `SET ... NX EX` / `SET` / `GET`.
//! - [`InMemoryIdempotencyStore`] — test fake, a `tokio::sync::Mutex<HashMap<..>>`.

mod inmemory_store;
mod redis_store;

pub use inmemory_store::InMemoryIdempotencyStore;
pub use redis_store::RedisIdempotencyStore;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal/in-flight state of an idempotency record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdempotencyState {
    InProgress,
    Done,
    Error,
}

/// TTL applied on both `reserve` and `finalize`.
pub const TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub state: IdempotencyState,
    pub body_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    pub updated_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    #[error("idempotency store timed out: {0}")]
    Timeout(String),

    #[error("idempotency record serialization failed: {0}")]
    Serialization(String),

    #[error("idempotency store transport error: {0}")]
    Transport(String),
}

pub type IdempotencyResult<T> = Result<T, IdempotencyError>;

/// Reserve / load / finalize capability the checkout ingress handler depends on.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Set-if-absent of a record with `state = IN_PROGRESS`. Returns `true` iff the key did not
    /// already exist. Must be a single round trip (atomic `SETNX`-style operation).
    async fn reserve(
        &self,
        merchant_id: &str,
        key: &str,
        body_hash: &str,
        ttl: Duration,
    ) -> IdempotencyResult<bool>;

    /// Returns the current record, or `None` if absent (expired or never written).
    async fn load(&self, merchant_id: &str, key: &str) -> IdempotencyResult<Option<IdempotencyRecord>>;

    /// Unconditional overwrite with `state = DONE`, refreshing the TTL. No CAS: within a given
    /// key's TTL window, the handler that reserved it is the only writer.
    #[allow(clippy::too_many_arguments)]
    async fn finalize(
        &self,
        merchant_id: &str,
        key: &str,
        body_hash: &str,
        http_code: u16,
        payment_id: Option<String>,
        response: Option<Value>,
        ttl: Duration,
    ) -> IdempotencyResult<()>;
}

pub(crate) fn record_key(prefix: &str, merchant_id: &str, key: &str) -> String {
    format!("{prefix}{merchant_id}:{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_key_matches_prefix_merchant_colon_key_shape() {
        assert_eq!(record_key("idem:", "m_1", "k-1"), "idem:m_1:k-1");
    }
}
