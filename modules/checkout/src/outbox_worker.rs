use std::sync::Arc;

use event_bus::Publisher;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::Outbox;
use crate::repo::{outbox_row_to_envelope, PaymentsRepo};

pub struct OutboxWorker {
    repo: PaymentsRepo,
    publisher: Arc<dyn Publisher>,
    cfg: Outbox,
}

impl OutboxWorker {
    pub fn new(repo: PaymentsRepo, publisher: Arc<dyn Publisher>, cfg: Outbox) -> Self {
        Self { repo, publisher, cfg }
    }

    /// Runs the poll/reset loop until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut poll_ticker = tokio::time::interval(self.cfg.poll_interval);
        let mut reset_ticker = tokio::time::interval(self.cfg.reset_events_interval);

        loop {
            tokio::select! {
                _ = poll_ticker.tick() => {
                    let _ = tokio::time::timeout(self.cfg.poll_timeout, self.poll_batch(shutdown.clone())).await;
                }
                _ = reset_ticker.tick() => {
                    let deadline = tokio::time::timeout(self.cfg.reset_events_timeout, self.repo.reset_events()).await;
                    match deadline {
                        Ok(Err(e)) => tracing::warn!(error = %e, "outbox worker: reset_events failed"),
                        Err(_) => tracing::warn!("outbox worker: reset_events timed out"),
                        Ok(Ok(())) => {}
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("outbox worker shutting down");
                    return;
                }
            }
        }
    }

    async fn poll_batch(&self, shutdown: CancellationToken) {
        let rows = tokio::select! {
            _ = shutdown.cancelled() => return,
            rows = self.repo.pick_batch(self.cfg.batch_size) => match rows {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::warn!(error = %e, "outbox worker: pick_batch failed");
                    return;
                }
            },
        };

        if rows.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(self.cfg.max_parallel));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let failed = Arc::new(Mutex::new(Vec::new()));

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let semaphore = semaphore.clone();
            let sent = sent.clone();
            let failed = failed.clone();
            let publisher = self.publisher.clone();
            let shutdown = shutdown.clone();

            tasks.push(tokio::spawn(async move {
                let permit = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    permit = semaphore.acquire() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };
                let envelope = outbox_row_to_envelope(&row);
                match publisher.publish(&envelope).await {
                    Ok(()) => {
                        tracing::info!(event_id = row.id, key = %row.key, "outbox: published");
                        sent.lock().await.push(row.id);
                    }
                    Err(e) => {
                        tracing::warn!(event_id = row.id, key = %row.key, error = %e, "outbox: publish failed");
                        failed.lock().await.push(row.id);
                    }
                }
                drop(permit);
            }));
        }

        for task in tasks {
            let _ = task.await;
        }

        let sent = sent.lock().await.clone();
        let failed = failed.lock().await.clone();

        if !sent.is_empty() {
            if let Err(e) = self.repo.mark_sent(&sent).await {
                tracing::warn!(error = %e, "outbox worker: mark_sent failed");
            }
        }
        if !failed.is_empty() {
            if let Err(e) = self.repo.mark_failed(&failed).await {
                tracing::warn!(error = %e, "outbox worker: mark_failed failed");
            }
        }
    }
}
