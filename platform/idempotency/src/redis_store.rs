use std::time::Duration;

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;

use crate::{record_key, IdempotencyError, IdempotencyRecord, IdempotencyResult, IdempotencyState, IdempotencyStore};

/// Redis-backed idempotency store. Keys are namespaced by `prefix`, set by configuration
/// (`redis.prefix`); values are JSON-encoded [`IdempotencyRecord`]s.
#[derive(Clone)]
pub struct RedisIdempotencyStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisIdempotencyStore {
    pub async fn connect(addr: &str, prefix: &str) -> IdempotencyResult<Self> {
        let client = redis::Client::open(addr).map_err(|e| IdempotencyError::Transport(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| IdempotencyError::Transport(e.to_string()))?;
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    pub async fn ping(&self) -> IdempotencyResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| IdempotencyError::Transport(e.to_string()))
    }
}

#[async_trait::async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn reserve(
        &self,
        merchant_id: &str,
        key: &str,
        body_hash: &str,
        ttl: Duration,
    ) -> IdempotencyResult<bool> {
        let record = IdempotencyRecord {
            state: IdempotencyState::InProgress,
            body_hash: body_hash.to_string(),
            payment_id: None,
            http_code: None,
            response: None,
            updated_at: Utc::now().timestamp(),
        };
        let encoded = serde_json::to_string(&record)
            .map_err(|e| IdempotencyError::Serialization(e.to_string()))?;

        let mut conn = self.conn.clone();
        let created: bool = redis::cmd("SET")
            .arg(record_key(&self.prefix, merchant_id, key))
            .arg(encoded)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(map_redis_err)?
            .is_some();

        Ok(created)
    }

    async fn load(&self, merchant_id: &str, key: &str) -> IdempotencyResult<Option<IdempotencyRecord>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(record_key(&self.prefix, merchant_id, key))
            .await
            .map_err(map_redis_err)?;

        match raw {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| IdempotencyError::Serialization(e.to_string())),
        }
    }

    async fn finalize(
        &self,
        merchant_id: &str,
        key: &str,
        body_hash: &str,
        http_code: u16,
        payment_id: Option<String>,
        response: Option<Value>,
        ttl: Duration,
    ) -> IdempotencyResult<()> {
        let record = IdempotencyRecord {
            state: IdempotencyState::Done,
            body_hash: body_hash.to_string(),
            payment_id,
            http_code: Some(http_code),
            response,
            updated_at: Utc::now().timestamp(),
        };
        let encoded = serde_json::to_string(&record)
            .map_err(|e| IdempotencyError::Serialization(e.to_string()))?;

        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(record_key(&self.prefix, merchant_id, key), encoded, ttl.as_secs())
            .await
            .map_err(map_redis_err)?;
        Ok(())
    }
}

fn map_redis_err(e: redis::RedisError) -> IdempotencyError {
    if e.is_timeout() {
        IdempotencyError::Timeout(e.to_string())
    } else {
        IdempotencyError::Transport(e.to_string())
    }
}
