use axum::Json;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub max_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub data: Vec<ModelInfo>,
}

const MODELS: &[ModelInfo] = &[
    ModelInfo { id: "claude-opus-4-1-20250805", max_tokens: 32_000 },
    ModelInfo { id: "claude-sonnet-4-5-20250929", max_tokens: 64_000 },
    ModelInfo { id: "gemini-3-pro", max_tokens: 16_384 },
    ModelInfo { id: "gemini-3-flash", max_tokens: 16_384 },
];

/// GET /v1/models
pub async fn list_models() -> Json<ModelsResponse> {
    Json(ModelsResponse { data: MODELS.to_vec() })
}
