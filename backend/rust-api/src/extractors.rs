use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use validator::Validate;

fn reject(message: String) -> Response {
    tracing::warn!("{}", message);
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "message": message, "status": 400 })),
    )
        .into_response()
}

/// JSON body whose rejections use the API's `{message, status}` error shape.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(reject(format!(
                "Failed to parse JSON request body: {}",
                rejection
            ))),
        }
    }
}

/// Like [`AppJson`], then runs the body's `validator` rules.
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let AppJson(value) = AppJson::<T>::from_request(req, state).await?;
        value
            .validate()
            .map_err(|errors| reject(format!("Invalid request: {}", errors)))?;
        Ok(ValidatedJson(value))
    }
}
