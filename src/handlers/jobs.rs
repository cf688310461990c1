use axum::{
    body::Body,
    extract::{Extension, Path},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::job::{JobStatusResponse, SummaryResponse};
use crate::models::JobStage;
use crate::services::JobRegistry;
use crate::utils::error::ApiError;

pub async fn job_status_handler(
    Extension(registry): Extension<Arc<JobRegistry>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let record = registry
        .get(job_id)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown job: {}", job_id)))?;

    Ok(Json(JobStatusResponse {
        job_id: record.id,
        mode: record.mode,
        stage: record.stage,
        progress: record.progress,
        message: record.message,
        error: record.error,
        deck_ready: record.deck.is_some(),
        summary_ready: record.summary.is_some(),
    }))
}

/// Download the finished deck as a JSON attachment. 404 until the job is
/// complete.
pub async fn download_deck_handler(
    Extension(registry): Extension<Arc<JobRegistry>>,
    Path(job_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let record = registry
        .get(job_id)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown job: {}", job_id)))?;

    if record.stage != JobStage::Completed {
        return Err(ApiError::NotFound(format!(
            "Job {} is not complete (stage: {:?})",
            job_id, record.stage
        )));
    }

    let deck = record
        .deck
        .ok_or_else(|| ApiError::NotFound(format!("Job {} produced no deck", job_id)))?;

    let body = serde_json::to_string_pretty(&deck)
        .map_err(|e| ApiError::InternalError(format!("Failed to serialize deck: {}", e)))?;

    let filename: String = deck
        .name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.json\"", filename),
        )
        .body(Body::from(body))
        .map_err(|e| ApiError::InternalError(format!("Failed to build response: {}", e)))
}

pub async fn job_summary_handler(
    Extension(registry): Extension<Arc<JobRegistry>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let record = registry
        .get(job_id)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown job: {}", job_id)))?;

    let summary = record
        .summary
        .ok_or_else(|| ApiError::NotFound(format!("Job {} has no summary yet", job_id)))?;

    Ok(Json(SummaryResponse {
        job_id: record.id,
        summary,
    }))
}
