use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{make_span_with_request_id, request_id_middleware};

use super::handlers;
use super::AppState;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        // request id first, so the trace span already sees it
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        // Favorites
        .route("/users/:username/favorites", get(handlers::get_favorites))
        // POST takes a title, DELETE a movie id
        .route(
            "/users/:username/favorites/:movie",
            post(handlers::add_favorite).delete(handlers::remove_favorite),
        )
        // Watch history
        .route("/users/:username/history", get(handlers::get_history))
        .route(
            "/users/:username/history/:title",
            post(handlers::add_to_history),
        )
        // Recommendations
        .route(
            "/users/:username/recommendations",
            get(handlers::get_recommendations).put(handlers::set_recommendations),
        )
        .route(
            "/users/:username/recommendations/refresh",
            post(handlers::refresh_recommendations),
        )
        // Candidate pool
        .route("/candidates", get(handlers::get_candidates))
}
