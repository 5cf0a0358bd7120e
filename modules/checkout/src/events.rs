use chrono::Utc;
use event_bus::Envelope;
use serde::Serialize;

use crate::models::Payment;

#[derive(Debug, Serialize)]
struct PaymentCreatedV1 {
    event_type: &'static str,
    event_version: u32,
    payment_id: String,
    merchant_id: String,
    order_id: String,
    amount: String,
    currency: String,
    status: String,
    occurred_at: String,
}

/// Builds the `payment.created` v1 envelope, keyed by `payment_id` for per-payment ordering.
pub fn payment_created_envelope(payment: &Payment) -> Result<Envelope, serde_json::Error> {
    let payload = PaymentCreatedV1 {
        event_type: "payment.created",
        event_version: 1,
        payment_id: payment.id.clone(),
        merchant_id: payment.merchant_id.clone(),
        order_id: payment.order_id.clone(),
        amount: payment.amount.round_dp(2).to_string(),
        currency: payment.currency.clone(),
        status: payment.status.to_string(),
        occurred_at: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
    };

    let bytes = serde_json::to_vec(&payload)?;

    Ok(Envelope::new("payment.created", payment.id.clone(), bytes)
        .with_header("content-type", "application/json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentStatus;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn sample_payment() -> Payment {
        Payment {
            id: "pay_550e8400-e29b-41d4-a716-446655440000".to_string(),
            merchant_id: "m_1".to_string(),
            order_id: "o_1".to_string(),
            amount: Decimal::from_str("10.00").unwrap(),
            currency: "USD".to_string(),
            method_token: "tok_x".to_string(),
            status: PaymentStatus::Pending,
            psp_reference: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn envelope_is_keyed_by_payment_id_and_carries_expected_payload_fields() {
        let pay = sample_payment();
        let envelope = payment_created_envelope(&pay).unwrap();

        assert_eq!(envelope.key, pay.id);
        assert_eq!(envelope.event_type, "payment.created");

        let decoded: serde_json::Value = serde_json::from_slice(&envelope.payload).unwrap();
        assert_eq!(decoded["payment_id"], pay.id);
        assert_eq!(decoded["amount"], "10.00");
        assert_eq!(decoded["status"], "PENDING");
        assert_eq!(decoded["event_version"], 1);
    }
}
