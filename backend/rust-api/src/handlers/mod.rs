use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::metrics;
use crate::services::AppState;

const DEFAULT_METRICS_AUTH: &str = "admin:changeme";

#[derive(Debug, Serialize)]
struct DependencyHealth {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl DependencyHealth {
    fn healthy(message: &str) -> Self {
        Self {
            status: "healthy",
            message: Some(message.to_string()),
            error: None,
        }
    }

    fn unhealthy(error: String) -> Self {
        Self {
            status: "unhealthy",
            message: None,
            error: Some(error),
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let dataset = check_dataset(&state).await;
    let session_store = check_session_store(&state).await;
    let all_healthy = dataset.is_healthy() && session_store.is_healthy();

    let (status_code, status) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "sqlquest-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": {
                "dataset": dataset,
                "session_store": session_store,
            }
        })),
    )
}

async fn check_dataset(state: &AppState) -> DependencyHealth {
    match tokio::time::timeout(std::time::Duration::from_secs(1), state.executor.ping()).await {
        Ok(Ok(())) => DependencyHealth::healthy("Sample dataset reachable"),
        Ok(Err(e)) => DependencyHealth::unhealthy(format!("Dataset error: {}", e)),
        Err(_) => DependencyHealth::unhealthy("Dataset timeout after 1s".to_string()),
    }
}

async fn check_session_store(state: &AppState) -> DependencyHealth {
    match state.store.ping().await {
        Ok(()) => DependencyHealth::healthy("Session store reachable"),
        Err(e) => DependencyHealth::unhealthy(e.to_string()),
    }
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// Protects /metrics with HTTP Basic auth (`user:password` from config).
pub async fn metrics_auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let encoded = auth_header
        .strip_prefix("Basic ")
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let expected = state
        .config
        .metrics_auth
        .as_deref()
        .unwrap_or(DEFAULT_METRICS_AUTH);

    if credentials != expected {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

pub mod query;
pub mod teams;
