use async_trait::async_trait;
use health::ReadinessCheck;
use sqlx::PgPool;

pub struct DatabaseCheck {
    pool: PgPool,
}

impl DatabaseCheck {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadinessCheck for DatabaseCheck {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn check(&self) -> Result<(), String> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

pub struct RedisCheck {
    store: idempotency::RedisIdempotencyStore,
}

impl RedisCheck {
    pub fn new(store: idempotency::RedisIdempotencyStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReadinessCheck for RedisCheck {
    fn name(&self) -> &str {
        "redis"
    }

    async fn check(&self) -> Result<(), String> {
        self.store.ping().await.map_err(|e| e.to_string())
    }
}

pub struct KafkaCheck {
    publisher: event_bus::KafkaPublisher,
}

impl KafkaCheck {
    pub fn new(publisher: event_bus::KafkaPublisher) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl ReadinessCheck for KafkaCheck {
    fn name(&self) -> &str {
        "kafka"
    }

    async fn check(&self) -> Result<(), String> {
        self.publisher.fetch_metadata().await.map_err(|e| e.to_string())
    }
}
