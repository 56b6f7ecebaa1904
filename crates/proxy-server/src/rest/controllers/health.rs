use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

const TRACKED_MODELS: &[&str] = &["claude-opus-4-1-20250805", "claude-sonnet-4-5-20250929", "gemini-3-pro"];

#[derive(Debug, Serialize)]
pub struct ModelAvailability {
    pub model: String,
    pub available_accounts: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub pool_size: usize,
    pub models: Vec<ModelAvailability>,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let pool = &state.dispatch.pool;
    let models = TRACKED_MODELS
        .iter()
        .map(|model| ModelAvailability {
            model: model.to_string(),
            available_accounts: pool.available_for(model).len(),
        })
        .collect();

    Json(HealthResponse { pool_size: pool.total_count(), models })
}
