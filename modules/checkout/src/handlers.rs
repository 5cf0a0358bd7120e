use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use event_bus::Publisher;
use idempotency::{IdempotencyError, IdempotencyState, IdempotencyStore};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;
use crate::events::payment_created_envelope;
use crate::models::{
    ErrorResponse, Payment, PaymentCreateRequest, PaymentCreateResponse, PaymentResponse,
    PaymentStatus, ValidationErrorResponse,
};
use crate::repo::{PaymentsRepo, RepoError};
use crate::validation::{validate_idempotency_key, validate_pay_id, validate_payment};

#[derive(Clone)]
pub struct AppState {
    pub repo: PaymentsRepo,
    pub idem_store: Arc<dyn IdempotencyStore>,
    pub publisher: Arc<dyn Publisher>,
    pub config: Arc<Config>,
}

enum ApiError {
    Validation(Vec<String>),
    BadRequest(String),
    Conflict(String),
    Unprocessable(String),
    NotFound(String),
    Timeout(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errs) => {
                (StatusCode::BAD_REQUEST, Json(ValidationErrorResponse { errors: errs })).into_response()
            }
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: msg })).into_response()
            }
            ApiError::Conflict(msg) => {
                (StatusCode::CONFLICT, Json(ErrorResponse { error: msg })).into_response()
            }
            ApiError::Unprocessable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorResponse { error: msg })).into_response()
            }
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { error: msg })).into_response()
            }
            ApiError::Timeout(msg) => {
                (StatusCode::GATEWAY_TIMEOUT, Json(ErrorResponse { error: msg })).into_response()
            }
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: msg })).into_response()
            }
        }
    }
}

/// Hashes the request body in its declared field order, matching the source's behavior of
/// hashing the freshly-decoded struct rather than a re-normalized map.
fn canonical_hash(req: &PaymentCreateRequest) -> String {
    let bytes = serde_json::to_vec(req).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

fn idem_err_to_api(err: IdempotencyError) -> ApiError {
    match err {
        IdempotencyError::Timeout(msg) => ApiError::Timeout(msg),
        _ => ApiError::Internal(String::new()),
    }
}

pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PaymentCreateRequest>,
) -> Response {
    let deadline = state.config.http.payment_timeout.max(Duration::from_secs(1));
    match tokio::time::timeout(deadline, create_payment_inner(state, headers, req)).await {
        Ok(response) => response,
        Err(_) => ApiError::Timeout("request timed out".to_string()).into_response(),
    }
}

async fn create_payment_inner(state: AppState, headers: HeaderMap, req: PaymentCreateRequest) -> Response {
    let idem_key = match headers.get("Idempotency-Key").and_then(|v| v.to_str().ok()) {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => return ApiError::BadRequest("idempotency key required".to_string()).into_response(),
    };

    if let Err(msg) = validate_idempotency_key(&idem_key) {
        return ApiError::BadRequest(msg).into_response();
    }

    let errs = validate_payment(&req);
    if !errs.is_empty() {
        return ApiError::Validation(errs).into_response();
    }

    let body_hash = canonical_hash(&req);
    let ttl = idempotency::TTL;

    let created = match state.idem_store.reserve(&req.merchant_id, &idem_key, &body_hash, ttl).await {
        Ok(created) => created,
        Err(e) => return idem_err_to_api(e).into_response(),
    };

    if !created {
        return handle_existing_reservation(&state, &req, &idem_key, &body_hash, ttl).await;
    }

    tracing::info!(merchant_id = %req.merchant_id, idempotency_key = %idem_key, "idempotency: value reserved");

    let payment_id = format!("pay_{}", Uuid::new_v4());
    let amount: rust_decimal::Decimal = match req.amount.parse() {
        Ok(a) => a,
        Err(_) => return ApiError::Validation(vec!["invalid amount".to_string()]).into_response(),
    };

    let now = chrono::Utc::now();
    let payment = Payment {
        id: payment_id.clone(),
        merchant_id: req.merchant_id.clone(),
        order_id: req.order_id.clone(),
        amount,
        currency: req.currency.clone(),
        method_token: req.method_token.clone(),
        status: PaymentStatus::Pending,
        psp_reference: None,
        created_at: now,
        updated_at: now,
    };

    let envelope = match payment_created_envelope(&payment) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!(error = %e, "failed to build payment.created envelope");
            return ApiError::Internal(String::new()).into_response();
        }
    };

    if let Err(e) = state.repo.insert_payment(&payment, &envelope).await {
        return match e {
            RepoError::DuplicateBusinessKey => {
                ApiError::Conflict("payment already exists".to_string()).into_response()
            }
            RepoError::Database(_) | RepoError::NotFound => ApiError::Internal(String::new()).into_response(),
        };
    }

    tracing::info!(payment_id = %payment_id, "db: row added");

    let response = PaymentCreateResponse {
        payment_id: payment_id.clone(),
        status: payment.status.to_string(),
    };
    let response_json = serde_json::json!({"payment_id": response.payment_id, "status": response.status});

    if let Err(e) = state
        .idem_store
        .finalize(&req.merchant_id, &idem_key, &body_hash, 201, Some(payment_id.clone()), Some(response_json), ttl)
        .await
    {
        return idem_err_to_api(e).into_response();
    }

    tracing::info!(payment_id = %payment_id, "idempotency: value finalized");

    let mut publish_envelope = envelope;
    publish_envelope = publish_envelope
        .with_header("x-idempotency-key", idem_key.clone())
        .with_header("x-trace-id", Uuid::new_v4().to_string());

    match state.publisher.publish(&publish_envelope).await {
        Ok(()) => tracing::info!(payment_id = %payment_id, "kafka: published"),
        Err(e) => tracing::warn!(payment_id = %payment_id, error = %e, "kafka: publish failed"),
    }

    (StatusCode::CREATED, Json(response)).into_response()
}

async fn handle_existing_reservation(
    state: &AppState,
    req: &PaymentCreateRequest,
    idem_key: &str,
    body_hash: &str,
    ttl: Duration,
) -> Response {
    let record = match state.idem_store.load(&req.merchant_id, idem_key).await {
        Ok(Some(record)) => record,
        Ok(None) => return ApiError::Internal(String::new()).into_response(),
        Err(e) => return idem_err_to_api(e).into_response(),
    };

    if record.body_hash != body_hash {
        return ApiError::Unprocessable("idempotency key reused with different payload".to_string()).into_response();
    }

    match record.state {
        IdempotencyState::InProgress => {
            match state.repo.get_payment_by_uniq(&req.merchant_id, &req.order_id).await {
                Ok(existing) => {
                    let response = PaymentCreateResponse {
                        payment_id: existing.id.clone(),
                        status: existing.status.to_string(),
                    };
                    let response_json =
                        serde_json::json!({"payment_id": response.payment_id, "status": response.status});
                    if let Err(e) = state
                        .idem_store
                        .finalize(&req.merchant_id, idem_key, body_hash, 201, Some(existing.id), Some(response_json), ttl)
                        .await
                    {
                        return idem_err_to_api(e).into_response();
                    }
                    tracing::info!("idempotency: value finalized");
                    (StatusCode::CREATED, Json(response)).into_response()
                }
                Err(RepoError::NotFound) => {
                    (StatusCode::ACCEPTED, Json(serde_json::json!({"status": "PROCESSING"}))).into_response()
                }
                Err(_) => ApiError::Internal(String::new()).into_response(),
            }
        }
        IdempotencyState::Done => {
            let code = record.http_code.unwrap_or(200);
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::OK);
            (status, Json(record.response.unwrap_or(serde_json::Value::Null))).into_response()
        }
        IdempotencyState::Error => ApiError::Internal("previous attempt failed".to_string()).into_response(),
    }
}

pub async fn get_payment(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if !validate_pay_id(&id) {
        return ApiError::BadRequest("wrong id".to_string()).into_response();
    }

    let deadline = state.config.http.payment_timeout;
    let result = tokio::time::timeout(deadline, state.repo.get_payment_by_id(&id)).await;

    match result {
        Ok(Ok(payment)) => (StatusCode::OK, Json(PaymentResponse::from(payment))).into_response(),
        Ok(Err(RepoError::NotFound)) => ApiError::NotFound("not found".to_string()).into_response(),
        Ok(Err(_)) => ApiError::Internal(String::new()).into_response(),
        Err(_) => ApiError::Timeout("request timed out".to_string()).into_response(),
    }
}
