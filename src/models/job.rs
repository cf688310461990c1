use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::card::Deck;

/// What a job should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    #[default]
    Cards,
    Summary,
}

/// Processing stage reported to the front end while a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    Queued,
    Parsing,
    Cleaning,
    Chunking,
    Generating,
    Validating,
    Combining,
    Completed,
    Failed,
}

/// Mutable status record for one upload job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub mode: JobMode,
    pub stage: JobStage,
    pub progress: f32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub deck: Option<Deck>,
    #[serde(skip)]
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(mode: JobMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            stage: JobStage::Queued,
            progress: 0.0,
            message: "Queued".to_string(),
            error: None,
            deck: None,
            summary: None,
            created_at: Utc::now(),
        }
    }
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub job_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub mode: JobMode,
    pub stage: JobStage,
    pub progress: f32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub deck_ready: bool,
    pub summary_ready: bool,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub job_id: Uuid,
    pub summary: String,
}
