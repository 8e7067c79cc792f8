use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; \
             script-src 'self' 'unsafe-inline'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data: https:; \
             connect-src 'self'",
        ),
    );
    response
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler).layer(middleware::from_fn_with_state(
                app_state.clone(),
                handlers::metrics_auth_middleware,
            )),
        )
        .route(
            "/api/execute-query",
            post(handlers::query::execute_query).fallback(handlers::query::method_not_allowed),
        )
        .route(
            "/api/question-sets",
            get(handlers::teams::list_question_sets),
        )
        .nest("/api/v1/teams", team_routes())
        .layer(cors)
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn team_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(handlers::teams::establish_team))
        .route("/{team}/session", get(handlers::teams::get_session))
        .route(
            "/{team}/questions/{id}/select",
            post(handlers::teams::select_question),
        )
        .route(
            "/{team}/questions/{id}/submit",
            post(handlers::teams::submit_query),
        )
        .route(
            "/{team}/questions/{id}/hint",
            post(handlers::teams::toggle_hint),
        )
        .route("/{team}/finish", post(handlers::teams::finish_session))
        .route("/{team}/summary", get(handlers::teams::get_summary))
        .route("/{team}/reset", post(handlers::teams::reset_session))
        .route("/{team}/logout", post(handlers::teams::logout))
}
