//! Shared health, readiness and version endpoints for both services.
//!
//! `healthz` always answers `ok` — it reflects process liveness, not dependency health.
//! `readyz` pings every injected dependency via [`ReadinessCheck`] and reports the first
//! failure. `version` echoes the crate's build version so deployments can be correlated to
//! a running process.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

/// One dependency a service wants `/readyz` to ping (Postgres pool, Redis client, Kafka
/// producer metadata fetch, ...).
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    /// Short name used in the readiness report, e.g. `"postgres"`, `"redis"`, `"kafka"`.
    fn name(&self) -> &str;

    /// Returns `Ok(())` if the dependency is reachable, `Err(message)` otherwise.
    async fn check(&self) -> Result<(), String>;
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub service: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub checks: Vec<ReadyCheckResult>,
}

#[derive(Debug, Serialize)]
pub struct ReadyCheckResult {
    pub name: String,
    pub ok: bool,
    pub error: Option<String>,
}

pub async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub fn version_handler(service: &'static str, version: &'static str) -> VersionResponse {
    VersionResponse {
        service: service.to_string(),
        version: version.to_string(),
    }
}

/// Shared state for the `/readyz` route: the set of dependencies to ping.
#[derive(Clone)]
pub struct ReadinessState {
    checks: Arc<Vec<Arc<dyn ReadinessCheck>>>,
}

impl ReadinessState {
    pub fn new(checks: Vec<Arc<dyn ReadinessCheck>>) -> Self {
        Self {
            checks: Arc::new(checks),
        }
    }
}

pub async fn readyz(
    State(state): State<ReadinessState>,
) -> (StatusCode, Json<ReadyResponse>) {
    let mut results = Vec::with_capacity(state.checks.len());
    let mut all_ok = true;

    for check in state.checks.iter() {
        match check.check().await {
            Ok(()) => results.push(ReadyCheckResult {
                name: check.name().to_string(),
                ok: true,
                error: None,
            }),
            Err(e) => {
                all_ok = false;
                results.push(ReadyCheckResult {
                    name: check.name().to_string(),
                    ok: false,
                    error: Some(e),
                });
            }
        }
    }

    let status_code = if all_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let status = if all_ok { "ok" } else { "degraded" };

    (status_code, Json(ReadyResponse { status, checks: results }))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysOk;

    #[async_trait]
    impl ReadinessCheck for AlwaysOk {
        fn name(&self) -> &str {
            "fake"
        }

        async fn check(&self) -> Result<(), String> {
            Ok(())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl ReadinessCheck for AlwaysFails {
        fn name(&self) -> &str {
            "broken"
        }

        async fn check(&self) -> Result<(), String> {
            Err("unreachable".to_string())
        }
    }

    #[tokio::test]
    async fn readyz_reports_ok_when_all_checks_pass() {
        let state = ReadinessState::new(vec![Arc::new(AlwaysOk)]);
        let (status, Json(body)) = readyz(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert!(body.checks[0].ok);
    }

    #[tokio::test]
    async fn readyz_reports_degraded_when_a_check_fails() {
        let state = ReadinessState::new(vec![Arc::new(AlwaysOk), Arc::new(AlwaysFails)]);
        let (status, Json(body)) = readyz(State(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
        assert!(body.checks.iter().any(|c| !c.ok && c.name == "broken"));
    }

    #[tokio::test]
    async fn healthz_is_always_ok() {
        let Json(body) = healthz().await;
        assert_eq!(body.status, "ok");
    }
}
