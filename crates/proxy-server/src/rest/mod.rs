pub mod auth;
pub mod controllers;

use std::time::Duration;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/messages", post(controllers::messages::create_message))
        .route("/v1/models", get(controllers::models::list_models))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_bearer_token))
        .route("/health", get(controllers::health::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(300)))
        .with_state(state)
}
