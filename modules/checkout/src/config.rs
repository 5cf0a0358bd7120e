use std::env;
use std::time::Duration;

/// Checkout service configuration, assembled from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub http: Http,
    pub database: Database,
    pub redis: Redis,
    pub kafka: Kafka,
    pub outbox: Outbox,
}

#[derive(Debug, Clone)]
pub struct Http {
    pub addr: String,
    pub payment_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Redis {
    pub addr: String,
    pub prefix: String,
}

#[derive(Debug, Clone)]
pub struct Kafka {
    pub brokers: String,
    pub client_id: String,
    pub group_id: String,
    pub payment_created_topic: String,
    pub payments_processed_topic: String,
    pub payments_failed_topic: String,
}

#[derive(Debug, Clone)]
pub struct Outbox {
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub batch_size: i64,
    pub max_parallel: usize,
    pub reset_events_interval: Duration,
    pub reset_events_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let payment_timeout_ms: u64 = getenv("PAYMENT_TIMEOUT_MS", "10000")
            .parse()
            .map_err(|_| "PAYMENT_TIMEOUT_MS must be a valid u64".to_string())?;

        let poll_interval_ms: u64 = getenv("OUTBOX_POLL_INTERVAL_MS", "1000")
            .parse()
            .map_err(|_| "OUTBOX_POLL_INTERVAL_MS must be a valid u64".to_string())?;
        let poll_timeout_ms: u64 = getenv("OUTBOX_POLL_TIMEOUT_MS", "2000")
            .parse()
            .map_err(|_| "OUTBOX_POLL_TIMEOUT_MS must be a valid u64".to_string())?;
        let batch_size: i64 = getenv("OUTBOX_BATCH_SIZE", "50")
            .parse()
            .map_err(|_| "OUTBOX_BATCH_SIZE must be a valid i64".to_string())?;
        let max_parallel: usize = getenv("OUTBOX_MAX_PARALLEL", "8")
            .parse()
            .map_err(|_| "OUTBOX_MAX_PARALLEL must be a valid usize".to_string())?;
        let reset_interval_secs: u64 = getenv("OUTBOX_RESET_EVENTS_INTERVAL_SECS", "60")
            .parse()
            .map_err(|_| "OUTBOX_RESET_EVENTS_INTERVAL_SECS must be a valid u64".to_string())?;
        let reset_timeout_secs: u64 = getenv("OUTBOX_RESET_EVENTS_TIMEOUT_SECS", "5")
            .parse()
            .map_err(|_| "OUTBOX_RESET_EVENTS_TIMEOUT_SECS must be a valid u64".to_string())?;

        Ok(Config {
            http: Http {
                addr: getenv("HTTP_ADDR", "0.0.0.0:7081"),
                payment_timeout: Duration::from_millis(payment_timeout_ms),
            },
            database: Database { url: database_url },
            redis: Redis {
                addr: getenv("REDIS_ADDR", "redis://localhost:6379"),
                prefix: getenv("REDIS_IDEM_PREFIX", "idem:checkout:"),
            },
            kafka: Kafka {
                brokers: getenv("KAFKA_BROKERS", "localhost:9092"),
                client_id: getenv("KAFKA_CLIENT_ID", "checkout"),
                group_id: getenv("KAFKA_GROUP_ID", "checkout-outbox"),
                payment_created_topic: getenv("KAFKA_PAYMENT_CREATED_TOPIC", "payment.created"),
                payments_processed_topic: getenv("KAFKA_PAYMENTS_PROCESSED_TOPIC", "payments.processed"),
                payments_failed_topic: getenv("KAFKA_PAYMENTS_FAILED_TOPIC", "payments.failed"),
            },
            outbox: Outbox {
                poll_interval: Duration::from_millis(poll_interval_ms),
                poll_timeout: Duration::from_millis(poll_timeout_ms),
                batch_size,
                max_parallel,
                reset_events_interval: Duration::from_secs(reset_interval_secs),
                reset_events_timeout: Duration::from_secs(reset_timeout_secs),
            },
        })
    }
}

fn getenv(key: &str, fallback: &str) -> String {
    env::var(key).unwrap_or_else(|_| fallback.to_string())
}
