use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use health::{healthz, readyz, version_handler, ReadinessState};
use tower_http::cors::CorsLayer;

use crate::repo::{ProcessedEventsRepo, Stats};

async fn stats(State(repo): State<ProcessedEventsRepo>) -> Result<Json<Stats>, axum::http::StatusCode> {
    repo.stats()
        .await
        .map(Json)
        .map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn build_router(repo: ProcessedEventsRepo, readiness: ReadinessState) -> Router {
    let stats_router = Router::new().route("/stats", get(stats)).with_state(repo);

    let ops_router = Router::new()
        .route("/healthz", get(healthz))
        .route("/version", get(|| async { Json(version_handler("provider-rs", env!("CARGO_PKG_VERSION"))) }))
        .route("/readyz", get(readyz))
        .with_state(readiness);

    stats_router.merge(ops_router).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    )
}
