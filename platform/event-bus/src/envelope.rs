//! # Envelope
//!
//! Transport-neutral record of one event crossing the checkout/provider boundary.
//!
//! The envelope is intentionally a tagged record rather than a type hierarchy: `event_type`
//! is dispatched on only at the serialization boundary (building/parsing the JSON payload),
//! never inside the transport layer itself. The transport only ever sees `key`/`payload`/`headers`.

use std::collections::HashMap;

/// One event in flight between the outbox/publisher and a consumer.
///
/// `key` is the partition routing key — for every event type in this system it is the
/// `payment_id`, so all events about the same payment land on the same partition and are
/// delivered in order relative to one another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub event_type: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl Envelope {
    pub fn new(event_type: impl Into<String>, key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            event_type: event_type.into(),
            key: key.into(),
            payload,
            headers: HashMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_preserves_fields() {
        let env = Envelope::new("payment.created", "pay_1", b"{}".to_vec())
            .with_header("x-idempotency-key", "k-1");

        assert_eq!(env.event_type, "payment.created");
        assert_eq!(env.key, "pay_1");
        assert_eq!(env.headers.get("x-idempotency-key").unwrap(), "k-1");
    }
}
