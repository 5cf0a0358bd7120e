//! # Event transport abstraction
//!
//! A platform-level abstraction over the partitioned log that carries events between the
//! checkout and provider services.
//!
//! ## Why this lives in Tier 1
//!
//! The transport is a **shared runtime capability** both services depend on. Placing it in
//! `platform/` allows each service to depend on it without depending on each other, and lets
//! tests swap the real Kafka backend for an in-memory fake without touching handler code.
//!
//! ## Implementations
//!
//! - **KafkaPublisher / KafkaConsumer**: production implementation on top of `rdkafka`.
//! - **InMemoryBus**: test/dev implementation, partitioned by a hash of the envelope key so
//!   ordering-per-key tests behave like the real broker.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{Envelope, Publisher, KafkaPublisher, Topics};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let topics = Topics {
//!     payment_created: "payments.initiated".into(),
//!     payment_processed: "payments.processed".into(),
//!     payment_failed: "payments.failed".into(),
//! };
//! let publisher = KafkaPublisher::new(&["localhost:9092".to_string()], "checkout", topics)?;
//! let envelope = Envelope::new("payment.created", "pay_123", b"{}".to_vec());
//! publisher.publish(&envelope).await?;
//! # Ok(())
//! # }
//! ```

mod envelope;
mod inmemory_bus;
mod kafka_bus;

pub mod consumer_retry;

pub use consumer_retry::{retry_from, retry_with_backoff, RetryConfig, RetryError, RetryOutcome};
pub use envelope::Envelope;
pub use inmemory_bus::{InMemoryBus, InMemoryConsumer, InMemoryPublisher};
pub use kafka_bus::{KafkaConsumer, KafkaPublisher};

use async_trait::async_trait;

/// Which topic each event type is routed to. Mirrors the `kafka.*_topic` configuration group.
#[derive(Debug, Clone)]
pub struct Topics {
    pub payment_created: String,
    pub payment_processed: String,
    pub payment_failed: String,
}

impl Topics {
    pub fn topic_for(&self, event_type: &str) -> &str {
        match event_type {
            "payment.created" => &self.payment_created,
            "payments.processed" => &self.payment_processed,
            "payments.failed" => &self.payment_failed,
            other => {
                tracing::warn!(event_type = other, "no topic mapping, using event_type as topic");
                other
            }
        }
    }
}

/// Errors that can occur when using the transport.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to consume message: {0}")]
    ConsumeError(String),

    #[error("failed to commit offset: {0}")]
    CommitError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("no message has been consumed yet, nothing to finalize")]
    NothingToFinalize,
}

pub type BusResult<T> = Result<T, BusError>;

/// Publishes envelopes onto the transport, partitioned by `envelope.key`.
///
/// `publish` blocks until the broker acknowledges the write (single in-sync-replica ack is
/// sufficient). Implementations must be `Send + Sync` and cheap to clone/share across tasks.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, envelope: &Envelope) -> BusResult<()>;
}

/// Pulls messages from one partition, in order, and commits progress one message at a time.
///
/// Exactly one outstanding un-finalized message is allowed per consumer instance: callers must
/// not call `consume_event` again before `finalize_event` has been called for the previous
/// message. This mirrors the per-partition single-flight invariant the provider handler relies
/// on — see `modules/provider/src/consumer`.
#[async_trait]
pub trait Consumer: Send {
    async fn consume_event(&mut self) -> BusResult<Envelope>;

    /// Commits the offset of the last message returned by `consume_event`.
    ///
    /// Must not be called without an intervening successful `consume_event`; implementations
    /// return `BusError::NothingToFinalize` if called out of order.
    async fn finalize_event(&mut self) -> BusResult<()>;
}
