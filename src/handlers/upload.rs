use axum::{
    extract::{Extension, Multipart},
    Json,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::document::DocumentParser;
use crate::models::job::UploadResponse;
use crate::models::{JobMode, Source};
use crate::services::{FlashcardPipeline, JobRegistry};
use crate::utils::error::ApiError;

/// Accept a document upload, register a job, and process it in the
/// background. The response carries the job id for status polling.
pub async fn upload_handler(
    Extension(pipeline): Extension<Arc<FlashcardPipeline>>,
    Extension(registry): Extension<Arc<JobRegistry>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    info!("File upload request received");

    let mut file_data: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut deck_name: Option<String> = None;
    let mut mode = JobMode::Cards;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "file" => {
                filename = field.file_name().map(|s| s.to_string());
                file_data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?
                        .to_vec(),
                );
            }
            "deck_name" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid deck_name: {}", e)))?;
                if !text.trim().is_empty() {
                    deck_name = Some(text.trim().to_string());
                }
            }
            "mode" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid mode: {}", e)))?;
                if text.trim().eq_ignore_ascii_case("summary") {
                    mode = JobMode::Summary;
                }
            }
            _ => {}
        }
    }

    let file_data = file_data.ok_or_else(|| ApiError::BadRequest("file required".to_string()))?;
    let filename = filename.ok_or_else(|| ApiError::BadRequest("filename required".to_string()))?;

    info!("Processing upload: {} ({} bytes)", filename, file_data.len());

    // Parse synchronously so a broken document fails the request itself,
    // not a job the client has to poll to see die.
    let parsed = DocumentParser::parse_bytes(&file_data, &filename)
        .map_err(|e| ApiError::BadRequest(format!("Failed to parse document: {}", e)))?;

    if parsed.content.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "No text content found in document".to_string(),
        ));
    }

    let title = std::path::Path::new(&filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&filename)
        .to_string();
    let mut source = Source::new(title, parsed.metadata.source_type).with_content(parsed.content);
    source.file_path = Some(filename.clone());

    let job_id = registry.create(mode);
    info!("Created job {} for {} ({:?})", job_id, filename, mode);

    tokio::spawn(run_job(pipeline, registry.clone(), job_id, source, deck_name, mode));

    Ok(Json(UploadResponse {
        success: true,
        message: "Document accepted for processing".to_string(),
        job_id,
    }))
}

async fn run_job(
    pipeline: Arc<FlashcardPipeline>,
    registry: Arc<JobRegistry>,
    job_id: uuid::Uuid,
    source: Source,
    deck_name: Option<String>,
    mode: JobMode,
) {
    let progress_registry = registry.clone();
    let on_progress = move |stage, progress, message: &str| {
        progress_registry.update(job_id, stage, progress, message);
    };

    match mode {
        JobMode::Cards => match pipeline.generate_deck(&source, deck_name, on_progress).await {
            Ok((deck, stats)) => {
                info!(
                    "Job {} complete: {} cards ({} chunks)",
                    job_id,
                    deck.card_count(),
                    stats.chunks_created
                );
                registry.complete_with_deck(job_id, deck);
            }
            Err(e) => {
                error!("Job {} failed: {}", job_id, e);
                registry.fail(job_id, e.to_string());
            }
        },
        JobMode::Summary => match pipeline.summarize(&source, on_progress).await {
            Ok(summary) => {
                info!("Job {} complete: {} char summary", job_id, summary.len());
                registry.complete_with_summary(job_id, summary);
            }
            Err(e) => {
                error!("Job {} failed: {}", job_id, e);
                registry.fail(job_id, e.to_string());
            }
        },
    }
}
