// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{attempt, stats},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Every route requires a Bearer token (the user id comes from its claims).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (attempt service, config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let attempt_routes = Router::new()
        .route("/", post(attempt::start_attempt))
        .route(
            "/{attempt_id}",
            get(attempt::get_attempt).put(attempt::save_progress),
        )
        .route("/{attempt_id}/complete", post(attempt::complete_attempt));

    let exam_routes = Router::new().route("/{exam_id}/stats", get(stats::get_exam_stats));

    Router::new()
        .nest("/api/attempts", attempt_routes)
        .nest("/api/exams", exam_routes)
        // Only matched routes require a token; unknown paths still answer 404.
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
