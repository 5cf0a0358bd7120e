//! Per-partition reader/processor task pair.
//!
//! The reader owns the consumer's `consume_event` half, the processor owns `finalize_event`.
//! They share the consumer behind a mutex and hand off each message with an acknowledgement:
//! the reader does not poll for the next message until the processor has finalized the current
//! one, which is what the `Consumer` trait's single-outstanding-message contract requires.

use std::sync::Arc;

use event_bus::{retry_from, Consumer, Envelope, Publisher, RetryError};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::events::{build_failed_envelope, build_processed_envelope};
use crate::psp::PspSimulator;
use crate::repo::ProcessedEventsRepo;

const MAX_ATTEMPTS: u32 = 4;

/// Why [`PaymentHandler::provide_payment`] did not produce a PSP status.
enum ProvideError {
    /// Shutdown fired mid-retry; the message was never actually decided and must not be
    /// reported as `payments.failed` — its offset is left uncommitted so it is redelivered.
    Cancelled,
    Failed(String),
}

impl std::fmt::Display for ProvideError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvideError::Cancelled => write!(f, "cancelled"),
            ProvideError::Failed(msg) => write!(f, "{msg}"),
        }
    }
}

pub struct PaymentHandler<C> {
    consumer: Arc<Mutex<C>>,
    publisher: Arc<dyn Publisher>,
    repo: ProcessedEventsRepo,
    psp: Arc<PspSimulator>,
    log_prefix: String,
}

impl<C: Consumer + Send + 'static> PaymentHandler<C> {
    pub fn new(
        consumer: C,
        publisher: Arc<dyn Publisher>,
        repo: ProcessedEventsRepo,
        psp: Arc<PspSimulator>,
        log_prefix: impl Into<String>,
    ) -> Self {
        Self {
            consumer: Arc::new(Mutex::new(consumer)),
            publisher,
            repo,
            psp,
            log_prefix: log_prefix.into(),
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let (tx, rx) = mpsc::channel::<(Envelope, oneshot::Sender<()>)>(1);

        let reader = tokio::spawn(Self::read_events(
            self.consumer.clone(),
            tx,
            shutdown.clone(),
            self.log_prefix.clone(),
        ));
        let processor = tokio::spawn(Self::process_events(
            self.consumer.clone(),
            rx,
            self.publisher.clone(),
            self.repo.clone(),
            self.psp.clone(),
            shutdown.clone(),
            self.log_prefix.clone(),
        ));

        let _ = tokio::join!(reader, processor);
    }

    async fn read_events(
        consumer: Arc<Mutex<C>>,
        tx: mpsc::Sender<(Envelope, oneshot::Sender<()>)>,
        shutdown: CancellationToken,
        log_prefix: String,
    ) {
        tracing::info!(prefix = %log_prefix, "read events started");
        loop {
            let consumed = {
                let mut guard = consumer.lock().await;
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = guard.consume_event() => result,
                }
            };
            let envelope = match consumed {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!(prefix = %log_prefix, error = %e, "consumer error, stopping reader");
                    break;
                }
            };

            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.send((envelope, ack_tx)).await.is_err() {
                break;
            }
            if ack_rx.await.is_err() {
                break;
            }
        }
        tracing::info!(prefix = %log_prefix, "read events closed");
    }

    async fn process_events(
        consumer: Arc<Mutex<C>>,
        mut rx: mpsc::Receiver<(Envelope, oneshot::Sender<()>)>,
        publisher: Arc<dyn Publisher>,
        repo: ProcessedEventsRepo,
        psp: Arc<PspSimulator>,
        shutdown: CancellationToken,
        log_prefix: String,
    ) {
        tracing::info!(prefix = %log_prefix, "process events started");
        loop {
            let (envelope, ack_tx) = tokio::select! {
                _ = shutdown.cancelled() => break,
                item = rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            tracing::info!(prefix = %log_prefix, payment_id = %envelope.key, "consumed payment");

            match Self::provide_payment(&envelope, &publisher, &repo, &psp, &shutdown).await {
                Ok(status) => {
                    tracing::info!(
                        prefix = %log_prefix,
                        payment_id = %envelope.key,
                        status = %status,
                        "published payments.processed"
                    );
                }
                Err(ProvideError::Cancelled) => {
                    tracing::info!(
                        prefix = %log_prefix,
                        payment_id = %envelope.key,
                        "shutting down mid-retry, leaving offset uncommitted"
                    );
                    // Dropping ack_tx here closes the reader's handoff channel, unblocking it
                    // out of its `ack_rx.await` without committing this message's offset.
                    break;
                }
                Err(ProvideError::Failed(e)) => {
                    tracing::warn!(prefix = %log_prefix, payment_id = %envelope.key, error = %e, "payment not provided");
                    Self::publish_failed(&envelope, &publisher, &e, &log_prefix).await;
                }
            }

            {
                let mut guard = consumer.lock().await;
                if let Err(e) = guard.finalize_event().await {
                    tracing::warn!(prefix = %log_prefix, error = %e, "failed to finalize event");
                }
            }

            let _ = ack_tx.send(());
        }
        tracing::info!(prefix = %log_prefix, "process events closed");
    }

    /// Decides, persists and publishes the outcome for one `payment.created` envelope. Returns
    /// the PSP status string on success so the caller can log it without re-deciding.
    ///
    /// Both retry chains race against `shutdown` so a shutdown signal interrupts an in-flight
    /// backoff sleep or call instead of waiting for the full retry ladder to unwind.
    async fn provide_payment(
        envelope: &Envelope,
        publisher: &Arc<dyn Publisher>,
        repo: &ProcessedEventsRepo,
        psp: &PspSimulator,
        shutdown: &CancellationToken,
    ) -> Result<String, ProvideError> {
        let (status, psp_reference) = psp.decide();
        let status_str = status.to_string();

        let processed_envelope = build_processed_envelope(envelope, &status_str, psp_reference.as_deref())
            .map_err(|e| ProvideError::Failed(format!("invalid JSON: {e}")))?;

        let db_outcome = retry_from(
            0,
            MAX_ATTEMPTS,
            || repo.insert_processed_event(&envelope.key, &status_str, psp_reference.as_deref()),
            "insert_processed_event",
            shutdown,
        )
        .await
        .map_err(|e| match e {
            RetryError::Cancelled => ProvideError::Cancelled,
            RetryError::Failed(e) => ProvideError::Failed(format!("database error: {e}")),
        })?;

        retry_from(
            db_outcome.attempts_used,
            MAX_ATTEMPTS,
            || publisher.publish(&processed_envelope),
            "publish payments.processed",
            shutdown,
        )
        .await
        .map_err(|e| match e {
            RetryError::Cancelled => ProvideError::Cancelled,
            RetryError::Failed(e) => ProvideError::Failed(format!("publisher error: {e}")),
        })?;

        Ok(status_str)
    }

    async fn publish_failed(envelope: &Envelope, publisher: &Arc<dyn Publisher>, error_details: &str, log_prefix: &str) {
        match build_failed_envelope(envelope, error_details) {
            Ok(failed_envelope) => match publisher.publish(&failed_envelope).await {
                Ok(()) => tracing::info!(prefix = %log_prefix, payment_id = %envelope.key, "published payments.failed"),
                Err(e) => tracing::warn!(prefix = %log_prefix, error = %e, "failed to publish payments.failed"),
            },
            Err(e) => tracing::warn!(prefix = %log_prefix, error = %e, "failed to build payments.failed envelope"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::InMemoryBus;

    /// `publish_failed` must swallow a malformed-payload build error rather than propagate it —
    /// the caller has already committed to finalizing the source offset regardless.
    #[tokio::test]
    async fn publish_failed_does_not_panic_on_unparseable_source_payload() {
        let bus = InMemoryBus::new(1);
        let topics = event_bus::Topics {
            payment_created: "payment.created".to_string(),
            payment_processed: "payments.processed".to_string(),
            payment_failed: "payments.failed".to_string(),
        };
        let publisher: Arc<dyn Publisher> = Arc::new(bus.publisher(topics));
        let envelope = Envelope::new("payment.created", "pay_bad", b"not json".to_vec());

        PaymentHandler::<event_bus::InMemoryConsumer>::publish_failed(&envelope, &publisher, "boom", "test").await;
    }
}
