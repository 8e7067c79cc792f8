use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::extractors::{AppJson, ValidatedJson};
use crate::models::game::{EstablishTeamRequest, SubmitQueryRequest};
use crate::models::QuestionId;
use crate::services::game_session::GameError;
use crate::services::AppState;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
}

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        let message = err.to_string();
        match err {
            GameError::TeamRequired | GameError::UnknownQuestion(_) => ApiError::NotFound(message),
            GameError::EmptyQuery => ApiError::BadRequest(message),
            GameError::QuestionSolved(_)
            | GameError::QuestionLocked(_)
            | GameError::SubmissionInFlight(_)
            | GameError::StaleSubmission => ApiError::Conflict(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
        };

        (
            status,
            Json(json!({ "message": message, "status": status.as_u16() })),
        )
            .into_response()
    }
}

pub async fn list_question_sets(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.game.bank().list())
}

pub async fn establish_team(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<EstablishTeamRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Establishing team {}", req.team_id);
    let view = state.game.establish_team(&req.team_id).await?;
    Ok((StatusCode::OK, Json(view)))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(team): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.game.session_view(&team).await?))
}

pub async fn select_question(
    State(state): State<Arc<AppState>>,
    Path((team, question_id)): Path<(String, QuestionId)>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Team {} selecting question {}", team, question_id);
    Ok(Json(state.game.select_question(&team, question_id).await?))
}

pub async fn submit_query(
    State(state): State<Arc<AppState>>,
    Path((team, question_id)): Path<(String, QuestionId)>,
    AppJson(req): AppJson<SubmitQueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Team {} submitting query for question {}", team, question_id);
    let response = state
        .game
        .submit_query(&team, question_id, &req.query)
        .await?;
    Ok(Json(response))
}

pub async fn toggle_hint(
    State(state): State<Arc<AppState>>,
    Path((team, question_id)): Path<(String, QuestionId)>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.game.toggle_hint(&team, question_id).await?))
}

pub async fn finish_session(
    State(state): State<Arc<AppState>>,
    Path(team): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Team {} finishing", team);
    Ok(Json(state.game.finish_session(&team).await?))
}

pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Path(team): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.game.summary(&team).await?))
}

pub async fn reset_session(
    State(state): State<Arc<AppState>>,
    Path(team): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Team {} resetting", team);
    Ok(Json(state.game.reset_session(&team).await?))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Path(team): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.game.logout(&team).await?;
    Ok(StatusCode::NO_CONTENT)
}
