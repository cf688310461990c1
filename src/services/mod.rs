pub mod generation;
pub mod jobs;
pub mod llm_service;
pub mod pipeline;
pub mod prompts;
pub mod recovery;
pub mod summary;

pub use generation::FlashcardGenerator;
pub use jobs::JobRegistry;
pub use llm_service::{LlmProvider, LlmService};
pub use pipeline::FlashcardPipeline;
pub use summary::{SummaryCombiner, SummaryGenerator};
