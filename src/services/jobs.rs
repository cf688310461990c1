use dashmap::DashMap;
use uuid::Uuid;

use crate::models::{Deck, JobMode, JobRecord, JobStage};

/// In-memory registry of upload jobs, shared across handlers. Jobs live
/// for the process lifetime; the front end polls by id.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<Uuid, JobRecord>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, mode: JobMode) -> Uuid {
        let record = JobRecord::new(mode);
        let id = record.id;
        self.jobs.insert(id, record);
        id
    }

    pub fn update(&self, id: Uuid, stage: JobStage, progress: f32, message: &str) {
        if let Some(mut record) = self.jobs.get_mut(&id) {
            record.stage = stage;
            record.progress = progress;
            record.message = message.to_string();
        }
    }

    pub fn complete_with_deck(&self, id: Uuid, deck: Deck) {
        if let Some(mut record) = self.jobs.get_mut(&id) {
            record.stage = JobStage::Completed;
            record.progress = 1.0;
            record.message = "Processing completed".to_string();
            record.deck = Some(deck);
        }
    }

    pub fn complete_with_summary(&self, id: Uuid, summary: String) {
        if let Some(mut record) = self.jobs.get_mut(&id) {
            record.stage = JobStage::Completed;
            record.progress = 1.0;
            record.message = "Processing completed".to_string();
            record.summary = Some(summary);
        }
    }

    pub fn fail(&self, id: Uuid, error: String) {
        if let Some(mut record) = self.jobs.get_mut(&id) {
            record.stage = JobStage::Failed;
            record.message = "Processing failed".to_string();
            record.error = Some(error);
        }
    }

    pub fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.jobs.get(&id).map(|record| record.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Deck;

    #[test]
    fn test_job_lifecycle() {
        let registry = JobRegistry::new();
        let id = registry.create(JobMode::Cards);

        assert_eq!(registry.get(id).unwrap().stage, JobStage::Queued);

        registry.update(id, JobStage::Generating, 0.4, "Generating flashcards...");
        let record = registry.get(id).unwrap();
        assert_eq!(record.stage, JobStage::Generating);
        assert_eq!(record.progress, 0.4);

        registry.complete_with_deck(id, Deck::new("done"));
        let record = registry.get(id).unwrap();
        assert_eq!(record.stage, JobStage::Completed);
        assert!(record.deck.is_some());
    }

    #[test]
    fn test_failed_job_keeps_error() {
        let registry = JobRegistry::new();
        let id = registry.create(JobMode::Summary);
        registry.fail(id, "backend unreachable".to_string());

        let record = registry.get(id).unwrap();
        assert_eq!(record.stage, JobStage::Failed);
        assert_eq!(record.error.as_deref(), Some("backend unreachable"));
    }

    #[test]
    fn test_unknown_job_is_none() {
        let registry = JobRegistry::new();
        assert!(registry.get(Uuid::new_v4()).is_none());
    }
}
