use crate::handlers;
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Leaves headroom over the 5M-character quiz text cap so oversized text is
/// reported by payload validation rather than a bare 413.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:5173"),
            HeaderValue::from_static("http://127.0.0.1:5173"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static("x-request-id"),
        ]);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/sessions", post(handlers::create_session))
        .route(
            "/api/v1/sessions/:id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/api/v1/sessions/:id/load", post(handlers::load_session))
        .route(
            "/api/v1/sessions/:id/questions/:question_id/select",
            post(handlers::select_option),
        )
        .route(
            "/api/v1/sessions/:id/questions/:question_id/check",
            post(handlers::check_answer),
        )
        .route("/api/v1/sessions/:id/finish-intent", get(handlers::finish_intent))
        .route("/api/v1/sessions/:id/finish", post(handlers::finish))
        .route("/api/v1/sessions/:id/result", get(handlers::get_result))
        .route("/api/v1/sessions/:id/restart", post(handlers::restart_session))
        .route("/api/v1/sessions/:id/reset", post(handlers::reset_session))
        .route("/ws/sessions/:id", get(handlers::ws_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
