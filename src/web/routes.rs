use std::sync::Arc;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::state::AppState;

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Also answers the OPTIONS pre-flight for /offer: 200 with
    // allow-methods POST and allow-headers content-type.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/offer", post(handlers::offer))
        .route("/health", get(handlers::health))
        .route("/sessions", get(handlers::list_sessions))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
