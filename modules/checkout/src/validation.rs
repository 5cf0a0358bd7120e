//! Validation for payment-creation requests.
//!
//! Every field is checked independently and all failures are collected into one list, rather
//! than failing fast on the first violation.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;

use crate::models::PaymentCreateRequest;

static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());

static ISO_4217: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["USD", "EUR", "RUB"].into_iter().collect());

static PAY_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^pay_[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});

/// Validates a payment-creation request, returning a human-readable error per violated rule.
pub fn validate_payment(req: &PaymentCreateRequest) -> Vec<String> {
    let mut errs = Vec::new();

    if !validate_string(&req.order_id) {
        errs.push("invalid order_id".to_string());
    }
    if !validate_string(&req.method_token) {
        errs.push("invalid method_token".to_string());
    }
    if !validate_string(&req.merchant_id) {
        errs.push("invalid merchant_id".to_string());
    }
    if !validate_decimal(&req.amount) {
        errs.push("invalid amount".to_string());
    }
    if !validate_currency(&req.currency) {
        errs.push("invalid currency".to_string());
    }

    errs
}

/// Idempotency-Key header rule: 1-64 runes after trimming.
pub fn validate_idempotency_key(key: &str) -> Result<(), String> {
    let trimmed = key.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > 64 {
        return Err("idempotency key must have at least 1 symbol and less than 65".to_string());
    }
    Ok(())
}

pub fn validate_currency(code: &str) -> bool {
    CURRENCY_RE.is_match(code) && ISO_4217.contains(code)
}

fn validate_string(s: &str) -> bool {
    let trimmed = s.trim();
    let len = trimmed.chars().count();
    len > 0 && len <= 128
}

pub fn validate_decimal(raw: &str) -> bool {
    match Decimal::from_str(raw) {
        Ok(d) => d > Decimal::ZERO && d.scale() <= 2,
        Err(_) => false,
    }
}

pub fn validate_pay_id(id: &str) -> bool {
    PAY_ID_RE.is_match(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> PaymentCreateRequest {
        PaymentCreateRequest {
            merchant_id: "m_1".to_string(),
            order_id: "o_1".to_string(),
            amount: "10.00".to_string(),
            currency: "USD".to_string(),
            method_token: "tok_x".to_string(),
        }
    }

    #[test]
    fn valid_request_has_no_errors() {
        assert!(validate_payment(&valid_request()).is_empty());
    }

    #[test]
    fn rejects_lowercase_currency() {
        let mut req = valid_request();
        req.currency = "usd".to_string();
        assert!(validate_payment(&req).contains(&"invalid currency".to_string()));
    }

    #[test]
    fn rejects_currency_outside_allow_list() {
        let mut req = valid_request();
        req.currency = "GBP".to_string();
        assert!(validate_payment(&req).contains(&"invalid currency".to_string()));
    }

    #[test]
    fn rejects_zero_amount() {
        let mut req = valid_request();
        req.amount = "0".to_string();
        assert!(validate_payment(&req).contains(&"invalid amount".to_string()));
    }

    #[test]
    fn rejects_amount_with_more_than_two_fraction_digits() {
        let mut req = valid_request();
        req.amount = "10.001".to_string();
        assert!(validate_payment(&req).contains(&"invalid amount".to_string()));
    }

    #[test]
    fn rejects_empty_merchant_id() {
        let mut req = valid_request();
        req.merchant_id = "   ".to_string();
        assert!(validate_payment(&req).contains(&"invalid merchant_id".to_string()));
    }

    #[test]
    fn rejects_overlong_order_id() {
        let mut req = valid_request();
        req.order_id = "o".repeat(129);
        assert!(validate_payment(&req).contains(&"invalid order_id".to_string()));
    }

    #[test]
    fn idempotency_key_rejects_empty_and_overlong() {
        assert!(validate_idempotency_key("").is_err());
        assert!(validate_idempotency_key(&"k".repeat(65)).is_err());
        assert!(validate_idempotency_key("k-1").is_ok());
    }

    #[test]
    fn pay_id_requires_prefix_and_uuid() {
        assert!(validate_pay_id("pay_550e8400-e29b-41d4-a716-446655440000"));
        assert!(!validate_pay_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!validate_pay_id("pay_not-a-uuid"));
    }
}
