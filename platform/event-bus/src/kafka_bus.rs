//! Kafka-backed `Publisher`/`Consumer` implementations on top of `rdkafka`.
//!
//! The consumer side manually assigns a single partition per instance (via the low-level
//! `assign()` API) rather than joining a consumer group, so the reader/processor task pair in
//! `modules/provider/src/consumer` can own an exclusive, ordered stream for that partition —
//! matching the source implementation's one-`Reader`-per-partition topology.

use std::collections::HashMap;
use std::time::Duration;

use rdkafka::consumer::{Consumer as _, StreamConsumer};
use rdkafka::message::{Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::client::Client as _;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};

use crate::{BusError, BusResult, Consumer, Envelope, Publisher, Topics};

/// Publishes envelopes via a shared `FutureProducer`. Cheap to clone; safe to share across tasks.
#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
    client_id: String,
    topics: Topics,
}

impl KafkaPublisher {
    pub fn new(brokers: &[String], client_id: &str, topics: Topics) -> BusResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers.join(","))
            .set("client.id", client_id)
            .set("message.timeout.ms", "10000")
            .create()
            .map_err(|e| BusError::ConnectionError(e.to_string()))?;

        Ok(Self {
            producer,
            client_id: client_id.to_string(),
            topics,
        })
    }
}

#[async_trait::async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, envelope: &Envelope) -> BusResult<()> {
        let topic = self.topics.topic_for(&envelope.event_type).to_string();

        let mut headers = OwnedHeaders::new();
        for (k, v) in &envelope.headers {
            headers = headers.insert(rdkafka::message::Header {
                key: k.as_str(),
                value: Some(v.as_bytes()),
            });
        }
        headers = headers.insert(rdkafka::message::Header {
            key: "client-id",
            value: Some(self.client_id.as_bytes()),
        });

        let record = FutureRecord::to(&topic)
            .key(&envelope.key)
            .payload(&envelope.payload)
            .headers(headers);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(err, _msg)| BusError::PublishError(err.to_string()))?;

        tracing::debug!(topic = %topic, key = %envelope.key, "published envelope");
        Ok(())
    }
}

impl KafkaPublisher {
    /// Fetches broker cluster metadata as a readiness probe — cheap and does not touch topics.
    /// `rdkafka::client::Client::fetch_metadata` is a blocking call, so it runs on a
    /// `spawn_blocking` thread rather than stalling whichever tokio worker polls `/readyz`.
    pub async fn fetch_metadata(&self) -> BusResult<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(None, Duration::from_secs(5))
                .map(|_| ())
                .map_err(|e| BusError::ConnectionError(e.to_string()))
        })
        .await
        .map_err(|e| BusError::ConnectionError(e.to_string()))?
    }
}

/// One partition's worth of a consumer. Wraps a `StreamConsumer` manually assigned to a single
/// `(topic, partition)` pair — `StreamConsumer::recv` is a genuine `Future`, so polling for the
/// next message never blocks the tokio runtime the reader task is scheduled on.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topic: String,
    partition: i32,
    event_type: String,
    pending_offset: Option<i64>,
}

impl KafkaConsumer {
    pub fn new(
        brokers: &[String],
        group_id: &str,
        topic: &str,
        partition: i32,
        event_type: &str,
    ) -> BusResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers.join(","))
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| BusError::ConnectionError(e.to_string()))?;

        let mut assignment = TopicPartitionList::new();
        assignment
            .add_partition_offset(topic, partition, Offset::Stored)
            .map_err(|e| BusError::ConnectionError(e.to_string()))?;
        consumer
            .assign(&assignment)
            .map_err(|e| BusError::ConnectionError(e.to_string()))?;

        Ok(Self {
            consumer,
            topic: topic.to_string(),
            partition,
            event_type: event_type.to_string(),
            pending_offset: None,
        })
    }
}

#[async_trait::async_trait]
impl Consumer for KafkaConsumer {
    async fn consume_event(&mut self) -> BusResult<Envelope> {
        // `StreamConsumer::recv` is a genuine future backed by rdkafka's tokio integration, so
        // awaiting it parks the reader task instead of occupying a worker thread while idling.
        let msg = self
            .consumer
            .recv()
            .await
            .map_err(|e| BusError::ConsumeError(e.to_string()))?;

        let key = msg
            .key()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();
        let payload = msg.payload().unwrap_or_default().to_vec();

        let mut headers = HashMap::new();
        if let Some(h) = msg.headers() {
            for header in h.iter() {
                if let Some(value) = header.value {
                    headers.insert(
                        header.key.to_string(),
                        String::from_utf8_lossy(value).into_owned(),
                    );
                }
            }
        }

        self.pending_offset = Some(msg.offset());

        Ok(Envelope {
            event_type: self.event_type.clone(),
            key,
            payload,
            headers,
        })
    }

    async fn finalize_event(&mut self) -> BusResult<()> {
        let offset = self.pending_offset.take().ok_or(BusError::NothingToFinalize)?;

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&self.topic, self.partition, Offset::Offset(offset + 1))
            .map_err(|e| BusError::CommitError(e.to_string()))?;

        self.consumer
            .commit(&tpl, rdkafka::consumer::CommitMode::Sync)
            .map_err(|e| BusError::CommitError(e.to_string()))
    }
}
