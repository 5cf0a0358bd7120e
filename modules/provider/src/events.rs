use chrono::{SecondsFormat, Utc};
use event_bus::Envelope;
use serde::{Deserialize, Serialize};

/// Shape of the `payment.created` payload this service consumes. Only the fields carried
/// forward into the processed/failed payloads are named; unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct PaymentCreatedV1 {
    event_version: u32,
    payment_id: String,
    merchant_id: String,
    order_id: String,
    amount: String,
    currency: String,
}

#[derive(Debug, Serialize)]
struct PaymentProcessedV1 {
    event_type: &'static str,
    event_version: u32,
    payment_id: String,
    merchant_id: String,
    order_id: String,
    amount: String,
    currency: String,
    status: String,
    psp_reference: Option<String>,
    occurred_at: String,
}

#[derive(Debug, Serialize)]
struct PaymentFailedV1 {
    event_type: &'static str,
    event_version: u32,
    payment_id: String,
    merchant_id: String,
    order_id: String,
    amount: String,
    currency: String,
    occurred_at: String,
    error_details: String,
}

/// Rewrites a consumed `payment.created` envelope into a `payments.processed` one, overwriting
/// `event_type`, `status`, `psp_reference` and `occurred_at` while preserving the rest of the
/// payload fields and all transport headers.
pub fn build_processed_envelope(
    source: &Envelope,
    status: &str,
    psp_reference: Option<&str>,
) -> Result<Envelope, serde_json::Error> {
    let parsed: PaymentCreatedV1 = serde_json::from_slice(&source.payload)?;

    let payload = PaymentProcessedV1 {
        event_type: "payments.processed",
        event_version: parsed.event_version,
        payment_id: parsed.payment_id.clone(),
        merchant_id: parsed.merchant_id,
        order_id: parsed.order_id,
        amount: parsed.amount,
        currency: parsed.currency,
        status: status.to_string(),
        psp_reference: psp_reference.map(str::to_string),
        occurred_at: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
    };

    let bytes = serde_json::to_vec(&payload)?;

    Ok(Envelope::new("payments.processed", parsed.payment_id, bytes).with_headers(source.headers.clone()))
}

/// Rewrites a consumed `payment.created` envelope into a `payments.failed` one after an
/// unrecoverable error in the decide/persist/publish chain.
pub fn build_failed_envelope(source: &Envelope, error_details: &str) -> Result<Envelope, serde_json::Error> {
    let parsed: PaymentCreatedV1 = serde_json::from_slice(&source.payload)?;

    let payload = PaymentFailedV1 {
        event_type: "payments.failed",
        event_version: parsed.event_version,
        payment_id: parsed.payment_id.clone(),
        merchant_id: parsed.merchant_id,
        order_id: parsed.order_id,
        amount: parsed.amount,
        currency: parsed.currency,
        occurred_at: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
        error_details: error_details.to_string(),
    };

    let bytes = serde_json::to_vec(&payload)?;

    Ok(Envelope::new("payments.failed", parsed.payment_id, bytes).with_headers(source.headers.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created_envelope() -> Envelope {
        let payload = br#"{"event_type":"payment.created","event_version":1,"payment_id":"pay_1","merchant_id":"m_1","order_id":"o_1","amount":"10.00","currency":"USD","status":"PENDING","occurred_at":"2026-01-01T00:00:00.000000000Z"}"#;
        Envelope::new("payment.created", "pay_1", payload.to_vec()).with_header("x-trace-id", "t-1")
    }

    #[test]
    fn processed_envelope_preserves_identity_fields_and_overwrites_status() {
        let source = created_envelope();
        let envelope = build_processed_envelope(&source, "AUTHORIZED", Some("psp_abc")).unwrap();

        assert_eq!(envelope.key, "pay_1");
        assert_eq!(envelope.event_type, "payments.processed");
        assert_eq!(envelope.headers.get("x-trace-id").unwrap(), "t-1");

        let decoded: serde_json::Value = serde_json::from_slice(&envelope.payload).unwrap();
        assert_eq!(decoded["payment_id"], "pay_1");
        assert_eq!(decoded["merchant_id"], "m_1");
        assert_eq!(decoded["status"], "AUTHORIZED");
        assert_eq!(decoded["psp_reference"], "psp_abc");
    }

    #[test]
    fn declined_envelope_has_null_psp_reference() {
        let source = created_envelope();
        let envelope = build_processed_envelope(&source, "DECLINED", None).unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&envelope.payload).unwrap();
        assert_eq!(decoded["status"], "DECLINED");
        assert!(decoded["psp_reference"].is_null());
    }

    #[test]
    fn failed_envelope_carries_error_details_and_drops_status() {
        let source = created_envelope();
        let envelope = build_failed_envelope(&source, "db: connection refused").unwrap();

        assert_eq!(envelope.event_type, "payments.failed");
        let decoded: serde_json::Value = serde_json::from_slice(&envelope.payload).unwrap();
        assert_eq!(decoded["error_details"], "db: connection refused");
        assert!(decoded.get("status").is_none());
    }
}
