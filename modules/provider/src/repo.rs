use sqlx::PgPool;

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct Stats {
    pub processed: i64,
    pub authorized: i64,
    pub declined: i64,
}

#[derive(Clone)]
pub struct ProcessedEventsRepo {
    pool: PgPool,
}

impl ProcessedEventsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a processed-event row. Idempotent: a conflict on `payment_id` is absorbed
    /// silently, since re-delivery of the same `payment.created` message is expected.
    pub async fn insert_processed_event(
        &self,
        payment_id: &str,
        status: &str,
        psp_reference: Option<&str>,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO provider.processed_events (payment_id, status, psp_reference)
            VALUES ($1, $2, $3)
            ON CONFLICT (payment_id) DO NOTHING
            "#,
        )
        .bind(payment_id)
        .bind(status)
        .bind(psp_reference)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(payment_id, "duplicate processed event, row already present");
        }

        Ok(())
    }

    pub async fn stats(&self) -> Result<Stats, RepoError> {
        let row: (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                count(*) AS processed,
                count(*) FILTER (WHERE status = 'AUTHORIZED') AS authorized,
                count(*) FILTER (WHERE status = 'DECLINED') AS declined
            FROM provider.processed_events
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(Stats { processed: row.0, authorized: row.1, declined: row.2 })
    }
}
