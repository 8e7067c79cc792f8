use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use std::sync::Arc;

use crate::models::query::{ExecuteQueryRequest, ExecuteQueryResponse};
use crate::services::query_executor::QueryError;
use crate::services::AppState;

pub const METHOD_NOT_ALLOWED_MESSAGE: &str =
    "Method not allowed. Only POST requests are accepted.";

/// `POST /api/execute-query`. Engine-level failures still answer 200 with
/// `success: false`; only malformed requests get a 4xx.
pub async fn execute_query(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ExecuteQueryRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!("Rejected execute-query body: {}", rejection);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ExecuteQueryResponse::error(format!(
                    "Server error: {}",
                    rejection.body_text()
                ))),
            );
        }
    };

    let query = match request.query {
        None | Some(Value::Null) | Some(Value::Bool(false)) => {
            return bad_request("Query parameter is required")
        }
        Some(Value::String(query)) if query.is_empty() => {
            return bad_request("Query parameter is required")
        }
        Some(Value::String(query)) => query,
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => {
            return bad_request("Query parameter is required")
        }
        Some(_) => return bad_request("Query must be a string"),
    };

    if query.trim().is_empty() {
        return bad_request("Query cannot be empty");
    }

    let timeout = state.config.query_deadline();
    let result = match tokio::time::timeout(timeout, state.executor.execute(&query)).await {
        Ok(result) => result,
        Err(_) => Err(QueryError::Timeout(timeout)),
    };

    match result {
        Ok(rows) => {
            tracing::debug!("Query returned {} row(s)", rows.rows.len());
            (StatusCode::OK, Json(ExecuteQueryResponse::rows(rows)))
        }
        Err(e) => {
            tracing::info!("Query rejected: {}", e);
            (StatusCode::OK, Json(ExecuteQueryResponse::error(e.to_string())))
        }
    }
}

pub async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ExecuteQueryResponse::error(METHOD_NOT_ALLOWED_MESSAGE)),
    )
}

fn bad_request(message: &str) -> (StatusCode, Json<ExecuteQueryResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ExecuteQueryResponse::error(message)),
    )
}
