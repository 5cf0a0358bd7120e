use axum::routing::{get, post};
use axum::{Json, Router};
use health::{healthz, readyz, version_handler, ReadinessState};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{create_payment, get_payment, AppState};

const MAX_BODY_BYTES: usize = 16 * 1024;

pub fn build_router(state: AppState, readiness: ReadinessState) -> Router {
    let payments_router = Router::new()
        .route("/v1/payments", post(create_payment))
        .route("/v1/payments/{id}", get(get_payment))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state);

    let ops_router = Router::new()
        .route("/healthz", get(healthz))
        .route("/version", get(|| async { Json(version_handler("checkout-rs", env!("CARGO_PKG_VERSION"))) }))
        .route("/readyz", get(readyz))
        .with_state(readiness);

    payments_router.merge(ops_router).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    )
}
