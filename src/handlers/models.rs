use axum::{extract::Extension, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::services::LlmService;
use crate::utils::error::ApiError;

#[derive(Serialize)]
pub struct ModelListResponse {
    pub models: Vec<String>,
}

pub async fn list_models_handler(
    Extension(llm_service): Extension<Arc<LlmService>>,
) -> Result<Json<ModelListResponse>, ApiError> {
    let models = llm_service.list_models(false).await?;
    Ok(Json(ModelListResponse {
        models: models.into_iter().map(|m| m.id).collect(),
    }))
}

/// Drop the cached model list/selection and re-query the backend.
pub async fn refresh_models_handler(
    Extension(llm_service): Extension<Arc<LlmService>>,
) -> Result<Json<ModelListResponse>, ApiError> {
    llm_service.refresh().await;
    let models = llm_service.list_models(true).await?;
    Ok(Json(ModelListResponse {
        models: models.into_iter().map(|m| m.id).collect(),
    }))
}
