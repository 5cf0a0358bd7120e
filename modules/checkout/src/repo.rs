use chrono::{DateTime, Utc};
use event_bus::Envelope;
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::Row;

use crate::models::{OutboxRow, OutboxStatus, Payment, PaymentStatus};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("payment already exists")]
    DuplicateBusinessKey,

    #[error("not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Clone)]
pub struct PaymentsRepo {
    pool: PgPool,
}

impl PaymentsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts the payment and its outbox envelope in one transaction. Fails with
    /// `DuplicateBusinessKey` on a `(merchant_id, order_id)` unique-constraint violation.
    pub async fn insert_payment(&self, payment: &Payment, envelope: &Envelope) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;

        let insert_payment = sqlx::query(
            r#"
            INSERT INTO checkout.payments
                (payment_id, merchant_id, order_id, amount, currency, method_token, status, psp_reference)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.merchant_id)
        .bind(&payment.order_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(&payment.method_token)
        .bind(payment.status.to_string())
        .bind(&payment.psp_reference)
        .execute(&mut *tx)
        .await;

        if let Err(sqlx::Error::Database(ref db_err)) = insert_payment {
            if db_err.is_unique_violation() {
                tx.rollback().await.ok();
                return Err(RepoError::DuplicateBusinessKey);
            }
        }
        insert_payment?;

        let headers_json = serde_json::to_value(&envelope.headers).unwrap_or_default();
        sqlx::query(
            r#"
            INSERT INTO checkout.outbox_events
                (aggregate_type, aggregate_id, event_type, key, payload, headers)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind("payment")
        .bind(&payment.id)
        .bind(&envelope.event_type)
        .bind(&envelope.key)
        .bind(&envelope.payload)
        .bind(headers_json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_payment_by_id(&self, id: &str) -> RepoResult<Payment> {
        let row = sqlx::query(
            r#"
            SELECT payment_id, merchant_id, order_id, amount, currency, method_token,
                   status, psp_reference, created_at, updated_at
            FROM checkout.payments
            WHERE payment_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepoError::NotFound)?;

        Ok(row_to_payment(&row))
    }

    pub async fn get_payment_by_uniq(&self, merchant_id: &str, order_id: &str) -> RepoResult<Payment> {
        let row = sqlx::query(
            r#"
            SELECT payment_id, merchant_id, order_id, amount, currency, method_token,
                   status, psp_reference, created_at, updated_at
            FROM checkout.payments
            WHERE merchant_id = $1 AND order_id = $2
            "#,
        )
        .bind(merchant_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepoError::NotFound)?;

        Ok(row_to_payment(&row))
    }

    /// Claims up to `count` eligible outbox rows: `NEW`/`FAILED`, due, oldest first, skipping
    /// rows locked by a concurrent claimant. Flips them to `IN_PROGRESS` as part of the claim.
    pub async fn pick_batch(&self, count: i64) -> RepoResult<Vec<OutboxRow>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
            WITH cte AS (
                SELECT id
                FROM checkout.outbox_events
                WHERE status IN ('NEW', 'FAILED') AND next_attempt_at <= now()
                ORDER BY id
                FOR UPDATE SKIP LOCKED
                LIMIT $1
            )
            UPDATE checkout.outbox_events o
            SET status = 'IN_PROGRESS', updated_at = now()
            FROM cte
            WHERE o.id = cte.id
            RETURNING o.id, o.aggregate_type, o.aggregate_id, o.event_type, o.key, o.payload, o.headers, o.attempt
            "#,
        )
        .bind(count)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(rows
            .into_iter()
            .map(|row| OutboxRow {
                id: row.get("id"),
                aggregate_type: row.get("aggregate_type"),
                aggregate_id: row.get("aggregate_id"),
                event_type: row.get("event_type"),
                key: row.get("key"),
                payload: row.get("payload"),
                headers: serde_json::from_value(row.get("headers")).unwrap_or_default(),
                status: OutboxStatus::InProgress,
                attempt: row.get("attempt"),
            })
            .collect())
    }

    pub async fn mark_sent(&self, ids: &[i64]) -> RepoResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"UPDATE checkout.outbox_events SET status = 'SENT', updated_at = now() WHERE id = ANY($1)"#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, ids: &[i64]) -> RepoResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"
            UPDATE checkout.outbox_events
            SET status = 'FAILED', attempt = attempt + 1, next_attempt_at = now() + interval '30 sec', updated_at = now()
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns stuck `IN_PROGRESS` rows (older than 5 minutes) to `FAILED` with a 30s back-off.
    pub async fn reset_events(&self) -> RepoResult<()> {
        sqlx::query(
            r#"
            UPDATE checkout.outbox_events
            SET status = 'FAILED', attempt = attempt + 1, next_attempt_at = now() + interval '30 sec', updated_at = now()
            WHERE updated_at < now() - interval '5 min' AND status = 'IN_PROGRESS'
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_payment(row: &sqlx::postgres::PgRow) -> Payment {
    let status_str: String = row.get("status");
    let created_at: DateTime<Utc> = row.get("created_at");
    let updated_at: DateTime<Utc> = row.get("updated_at");
    Payment {
        id: row.get("payment_id"),
        merchant_id: row.get("merchant_id"),
        order_id: row.get("order_id"),
        amount: row.get::<Decimal, _>("amount"),
        currency: row.get("currency"),
        method_token: row.get("method_token"),
        status: status_str.parse().unwrap_or(PaymentStatus::Pending),
        psp_reference: row.get("psp_reference"),
        created_at,
        updated_at,
    }
}

/// Rehydrates an `Envelope` from a claimed outbox row for publication.
pub fn outbox_row_to_envelope(row: &OutboxRow) -> Envelope {
    Envelope::new(row.event_type.clone(), row.key.clone(), row.payload.clone())
        .with_headers(row.headers.clone())
}
