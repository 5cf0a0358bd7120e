use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{record_key, IdempotencyRecord, IdempotencyResult, IdempotencyState, IdempotencyStore};

/// In-memory idempotency store for handler tests. TTL is tracked but never swept — tests run
/// well within the 24h window, so expiry is not simulated.
#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    records: Mutex<HashMap<String, IdempotencyRecord>>,
    prefix: String,
}

impl InMemoryIdempotencyStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            prefix: prefix.into(),
        }
    }
}

#[async_trait::async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn reserve(
        &self,
        merchant_id: &str,
        key: &str,
        body_hash: &str,
        _ttl: Duration,
    ) -> IdempotencyResult<bool> {
        let full_key = record_key(&self.prefix, merchant_id, key);
        let mut records = self.records.lock().await;
        if records.contains_key(&full_key) {
            return Ok(false);
        }
        records.insert(
            full_key,
            IdempotencyRecord {
                state: IdempotencyState::InProgress,
                body_hash: body_hash.to_string(),
                payment_id: None,
                http_code: None,
                response: None,
                updated_at: Utc::now().timestamp(),
            },
        );
        Ok(true)
    }

    async fn load(&self, merchant_id: &str, key: &str) -> IdempotencyResult<Option<IdempotencyRecord>> {
        let full_key = record_key(&self.prefix, merchant_id, key);
        Ok(self.records.lock().await.get(&full_key).cloned())
    }

    async fn finalize(
        &self,
        merchant_id: &str,
        key: &str,
        body_hash: &str,
        http_code: u16,
        payment_id: Option<String>,
        response: Option<Value>,
        _ttl: Duration,
    ) -> IdempotencyResult<()> {
        let full_key = record_key(&self.prefix, merchant_id, key);
        self.records.lock().await.insert(
            full_key,
            IdempotencyRecord {
                state: IdempotencyState::Done,
                body_hash: body_hash.to_string(),
                payment_id,
                http_code: Some(http_code),
                response,
                updated_at: Utc::now().timestamp(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TTL;

    #[tokio::test]
    async fn reserve_is_false_on_second_call_for_same_key() {
        let store = InMemoryIdempotencyStore::new("idem:");
        assert!(store.reserve("m_1", "k-1", "hash-a", TTL).await.unwrap());
        assert!(!store.reserve("m_1", "k-1", "hash-a", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn load_returns_none_for_unknown_key() {
        let store = InMemoryIdempotencyStore::new("idem:");
        assert!(store.load("m_1", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn finalize_transitions_state_to_done() {
        let store = InMemoryIdempotencyStore::new("idem:");
        store.reserve("m_1", "k-1", "hash-a", TTL).await.unwrap();
        store
            .finalize(
                "m_1",
                "k-1",
                "hash-a",
                201,
                Some("pay_1".into()),
                Some(serde_json::json!({"payment_id": "pay_1"})),
                TTL,
            )
            .await
            .unwrap();

        let rec = store.load("m_1", "k-1").await.unwrap().unwrap();
        assert_eq!(rec.state, IdempotencyState::Done);
        assert_eq!(rec.payment_id.as_deref(), Some("pay_1"));
    }
}
