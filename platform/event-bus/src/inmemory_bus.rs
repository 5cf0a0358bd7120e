//! In-memory, partition-aware fake of the Kafka transport, for tests and local development.
//!
//! Unlike a plain fan-out broadcast bus, this fake hash-partitions by `envelope.key` the same
//! way the real broker's default partitioner does, so tests that rely on per-payment ordering
//! (consume → finalize, strictly sequential within a partition) behave the same as they would
//! against Kafka.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::{BusError, BusResult, Consumer, Envelope, Publisher, Topics};

#[derive(Default)]
struct Hub {
    // (topic, partition) -> sender. Receivers are handed out once, to `InMemoryConsumer`s.
    lanes: Mutex<HashMap<(String, i32), mpsc::UnboundedSender<Envelope>>>,
    partition_count: i32,
}

/// Shared in-memory broker. Create one per test/process and hand out publishers/consumers from it.
#[derive(Clone)]
pub struct InMemoryBus {
    hub: Arc<Hub>,
}

impl InMemoryBus {
    pub fn new(partition_count: i32) -> Self {
        Self {
            hub: Arc::new(Hub {
                lanes: Mutex::new(HashMap::new()),
                partition_count,
            }),
        }
    }

    pub fn partition_for(&self, key: &str) -> i32 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.hub.partition_count as u64) as i32
    }

    pub fn publisher(&self, topics: Topics) -> InMemoryPublisher {
        InMemoryPublisher {
            hub: self.hub.clone(),
            topics,
        }
    }

    /// Registers (or re-registers) the receiving end for `(topic, partition)` and returns a
    /// consumer bound to it. Only one live consumer per `(topic, partition)` is meaningful —
    /// mirrors one `StreamConsumer` per assigned partition in the real transport.
    pub fn consumer(&self, topic: &str, partition: i32, event_type: &str) -> InMemoryConsumer {
        let (tx, rx) = mpsc::unbounded_channel();
        self.hub
            .lanes
            .lock()
            .unwrap()
            .insert((topic.to_string(), partition), tx);
        InMemoryConsumer {
            receiver: rx,
            event_type: event_type.to_string(),
            pending: false,
        }
    }
}

pub struct InMemoryPublisher {
    hub: Arc<Hub>,
    topics: Topics,
}

#[async_trait::async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(&self, envelope: &Envelope) -> BusResult<()> {
        let topic = self.topics.topic_for(&envelope.event_type).to_string();
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        envelope.key.hash(&mut hasher);
        let partition = (hasher.finish() % self.hub.partition_count.max(1) as u64) as i32;

        let lanes = self.hub.lanes.lock().unwrap();
        match lanes.get(&(topic.clone(), partition)) {
            Some(tx) => tx
                .send(envelope.clone())
                .map_err(|_| BusError::PublishError("no active consumer for partition".into())),
            None => {
                // No consumer has registered for this partition yet; the real broker would
                // still durably accept the write, so dropping it silently here would diverge.
                // Tests are expected to register consumers before publishing.
                Err(BusError::PublishError(format!(
                    "no consumer registered for topic={topic} partition={partition}"
                )))
            }
        }
    }
}

pub struct InMemoryConsumer {
    receiver: mpsc::UnboundedReceiver<Envelope>,
    event_type: String,
    pending: bool,
}

#[async_trait::async_trait]
impl Consumer for InMemoryConsumer {
    async fn consume_event(&mut self) -> BusResult<Envelope> {
        let mut envelope = self
            .receiver
            .recv()
            .await
            .ok_or_else(|| BusError::ConsumeError("channel closed".into()))?;
        envelope.event_type = self.event_type.clone();
        self.pending = true;
        Ok(envelope)
    }

    async fn finalize_event(&mut self) -> BusResult<()> {
        if !self.pending {
            return Err(BusError::NothingToFinalize);
        }
        self.pending = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics() -> Topics {
        Topics {
            payment_created: "payments.initiated".into(),
            payment_processed: "payments.processed".into(),
            payment_failed: "payments.failed".into(),
        }
    }

    #[tokio::test]
    async fn publish_then_consume_round_trips_payload_and_headers() {
        let bus = InMemoryBus::new(4);
        let partition = bus.partition_for("pay_1");
        let mut consumer = bus.consumer("payments.initiated", partition, "payment.created");
        let publisher = bus.publisher(topics());

        let envelope = Envelope::new("payment.created", "pay_1", b"{\"a\":1}".to_vec())
            .with_header("x-trace-id", "t-1");
        publisher.publish(&envelope).await.unwrap();

        let received = consumer.consume_event().await.unwrap();
        assert_eq!(received.key, "pay_1");
        assert_eq!(received.payload, b"{\"a\":1}");
        assert_eq!(received.headers.get("x-trace-id").unwrap(), "t-1");

        consumer.finalize_event().await.unwrap();
    }

    #[tokio::test]
    async fn finalize_without_consume_errors() {
        let bus = InMemoryBus::new(1);
        let mut consumer = bus.consumer("payments.initiated", 0, "payment.created");
        assert!(matches!(
            consumer.finalize_event().await,
            Err(BusError::NothingToFinalize)
        ));
    }

    #[tokio::test]
    async fn same_key_always_maps_to_same_partition() {
        let bus = InMemoryBus::new(8);
        let p1 = bus.partition_for("pay_abc");
        let p2 = bus.partition_for("pay_abc");
        assert_eq!(p1, p2);
    }
}
