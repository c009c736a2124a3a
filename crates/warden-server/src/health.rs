//! Health endpoints.
//!
//! `GET /health` answers as long as the process runs. `GET /v1/health/detailed`
//! also pings the session store and reports `CRIT` when it is unreachable.

use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;

use crate::backend::Backend;

const SERVICE_NAME: &str = "warden";
const SERVICE_DESCRIPTION: &str = "OAuth 2.0 authorization core";

fn revision() -> &'static str {
    option_env!("WARDEN_BUILD_REVISION").unwrap_or("dev")
}

#[derive(Clone)]
pub struct HealthState {
    backend: Backend,
    started_at: Instant,
}

impl HealthState {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    revision: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedHealthResponse {
    status: &'static str,
    version: &'static str,
    revision: &'static str,
    name: &'static str,
    description: &'static str,
    /// Seconds since the server started.
    uptime: u64,
    host: String,
    dependencies: Vec<DependencyHealth>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyHealth {
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
    state: DependencyState,
    /// Milliseconds the check took.
    response_time: u64,
}

#[derive(Debug, Serialize)]
pub struct DependencyState {
    status: &'static str,
    details: String,
}

pub fn routes(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/health/detailed", get(health_detailed))
        .with_state(state)
}

pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "OK",
        version: env!("CARGO_PKG_VERSION"),
        revision: revision(),
    })
}

pub async fn health_detailed(State(state): State<HealthState>) -> impl IntoResponse {
    let started = Instant::now();
    let check = state.backend.ping().await;
    let response_time = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let (status, details) = match check {
        Ok(()) => ("OK", "reachable".to_string()),
        Err(err) => {
            tracing::warn!(error = %err, backend = %state.backend.name, "Storage health check failed");
            ("CRIT", err.to_string())
        }
    };

    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_default();

    let body = DetailedHealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        revision: revision(),
        name: SERVICE_NAME,
        description: SERVICE_DESCRIPTION,
        uptime: state.started_at.elapsed().as_secs(),
        host,
        dependencies: vec![DependencyHealth {
            name: format!("Database ({})", state.backend.name),
            kind: "internal",
            state: DependencyState { status, details },
            response_time,
        }],
    };

    let code = if status == "OK" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}
