use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::config::{Settings, TokenEstimatorKind};
use crate::document::{ChunkMethod, TextChunker, TextCleaner};
use crate::models::{Chunk, Deck, JobStage, ProcessingStats, Source};
use crate::services::generation::{validate_cards, FlashcardGenerator};
use crate::services::llm_service::LlmProvider;
use crate::services::summary::{SummaryCombiner, SummaryGenerator};
use crate::utils::error::ApiError;
use crate::utils::token_estimator::GraphemeEstimator;

/// Wires clean → chunk → generate → validate → dedup for one source.
/// One pipeline instance is shared across jobs; it holds no per-document
/// state.
pub struct FlashcardPipeline {
    cleaner: TextCleaner,
    chunker: TextChunker,
    generator: FlashcardGenerator,
    summarizer: SummaryGenerator,
    combiner: SummaryCombiner,
    target_words: usize,
}

impl FlashcardPipeline {
    pub fn new(settings: &Settings, provider: Arc<dyn LlmProvider>) -> Self {
        let chunker = TextChunker::new(settings.text_processing.clone());
        let chunker = match settings.text_processing.token_estimator {
            TokenEstimatorKind::Words => chunker,
            TokenEstimatorKind::Graphemes => chunker.with_estimator(Box::new(GraphemeEstimator)),
        };
        Self {
            cleaner: TextCleaner::new(settings.text_processing.clone()),
            chunker,
            generator: FlashcardGenerator::new(
                provider.clone(),
                settings.generation.clone(),
                &settings.llm,
                &settings.prompts.qa_template_path,
            ),
            summarizer: SummaryGenerator::new(
                provider.clone(),
                settings.llm.temperature,
                settings.llm.max_tokens,
                settings.summary.batch_pause_ms,
                &settings.prompts.summary_template_path,
            ),
            combiner: SummaryCombiner::new(provider),
            target_words: settings.summary.target_words,
        }
    }

    /// Clean the source text and split it into chunks.
    fn prepare_chunks(&self, source: &Source) -> Result<Vec<Chunk>, ApiError> {
        let content = source
            .content
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("Source has no content".to_string()))?;

        let (cleaned, cleaning_stats) = self.cleaner.clean(content);
        info!(
            "Cleaned source {}: {} -> {} chars",
            source.title, cleaning_stats.original_length, cleaning_stats.cleaned_length
        );

        let chunks = self
            .chunker
            .chunk(&cleaned, source.id, ChunkMethod::Paragraph);

        if chunks.is_empty() {
            return Err(ApiError::BadRequest(
                "No usable text content found in document".to_string(),
            ));
        }
        Ok(chunks)
    }

    /// Run the full card pipeline for one source. Per-chunk failures are
    /// already absorbed by the generator; only an unusable source errors.
    pub async fn generate_deck<F>(
        &self,
        source: &Source,
        deck_name: Option<String>,
        on_progress: F,
    ) -> Result<(Deck, ProcessingStats), ApiError>
    where
        F: Fn(JobStage, f32, &str),
    {
        let started = Instant::now();
        let mut stats = ProcessingStats::default();

        on_progress(JobStage::Cleaning, 0.2, "Cleaning text...");
        on_progress(JobStage::Chunking, 0.3, "Chunking text...");
        let chunks = self.prepare_chunks(source)?;
        stats.chunks_created = chunks.len();

        on_progress(JobStage::Generating, 0.4, "Generating flashcards...");
        let cards = self.generator.generate_cards(&chunks).await;
        stats.cards_generated = cards.len();

        on_progress(JobStage::Validating, 0.9, "Validating cards...");
        let valid = validate_cards(cards);
        stats.cards_filtered = stats.cards_generated - valid.len();

        let mut deck = Deck::new(
            deck_name.unwrap_or_else(|| format!("Flashcards from {}", source.title)),
        );
        deck.description = Some(format!(
            "Generated from {} document: {}",
            source.source_type.as_str(),
            source.title
        ));
        deck.add_cards(valid);
        stats.duplicates_removed = deck.remove_duplicates();

        stats.sources_processed = 1;
        stats.processing_time_secs = started.elapsed().as_secs_f64();

        info!(
            "Pipeline complete: {} cards from {} ({} filtered, {} duplicates removed)",
            deck.card_count(),
            source.title,
            stats.cards_filtered,
            stats.duplicates_removed
        );
        Ok((deck, stats))
    }

    /// Run the summary pipeline: per-chunk summaries, then combination.
    pub async fn summarize<F>(&self, source: &Source, on_progress: F) -> Result<String, ApiError>
    where
        F: Fn(JobStage, f32, &str),
    {
        on_progress(JobStage::Cleaning, 0.2, "Cleaning text...");
        on_progress(JobStage::Chunking, 0.3, "Chunking text...");
        let chunks = self.prepare_chunks(source)?;

        on_progress(JobStage::Generating, 0.4, "Summarizing chunks...");
        let summaries = self.summarizer.generate_summaries(&chunks).await;

        on_progress(JobStage::Combining, 0.9, "Combining summaries...");
        Ok(self.combiner.combine(&summaries, self.target_words).await)
    }
}
