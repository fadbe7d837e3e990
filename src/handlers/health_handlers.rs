//! Health & readiness handlers.
//!
//! - GET /health  -> load-balancer probe: `OK` when the write target answers
//! - GET /readyz  -> per-dependency report (primary, replica, object store)

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::BTreeMap;

/// `GET /health`
///
/// Runs `SELECT 1` against the write target. 200 `OK` or 500 `DOWN`.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.records.backend().ping_write().await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(err) => {
            tracing::warn!(error = %err, "health check failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "DOWN")
        }
    }
}

/// `GET /readyz`
///
/// Checks the write target, the read target and the object store.
/// HTTP 200 when all checks pass, HTTP 503 when any check fails.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let backend = state.records.backend();
    let objects = state.records.objects();

    let (primary, replica, store) = tokio::join!(
        backend.ping_write(),
        backend.ping_read(),
        objects.probe()
    );

    let mut checks = BTreeMap::new();
    checks.insert("primary", CheckStatus::from_result(primary));
    checks.insert("replica", CheckStatus::from_result(replica));
    checks.insert("objects", CheckStatus::from_result(store));

    let overall_ok = checks.values().all(|check| check.ok);
    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        backend: backend.kind(),
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    backend: &'static str,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn from_result<E: std::fmt::Display>(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self {
                ok: true,
                error: None,
            },
            Err(err) => Self {
                ok: false,
                error: Some(err.to_string()),
            },
        }
    }
}
