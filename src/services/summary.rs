use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::models::{ChatMessage, Chunk};
use crate::services::llm_service::LlmProvider;
use crate::services::prompts::{PromptTemplate, DEFAULT_SUMMARY_TEMPLATE};

/// Sentinel returned when there is nothing to combine at all.
pub const NO_SUMMARIES: &str = "No summaries to combine.";
/// Sentinel returned when every input summary was blank.
pub const NO_VALID_SUMMARIES: &str = "No valid summaries found.";

/// Above this many summaries a single merge prompt would blow the context
/// window; switch to hierarchical combination.
const DIRECT_COMBINE_LIMIT: usize = 20;
/// Group size for one hierarchical merge pass.
const GROUP_SIZE: usize = 8;
/// Keep merging until this few intermediates remain.
const INTERMEDIATE_TARGET: usize = 5;
/// AI results shorter than this are treated as failed.
const MIN_AI_RESULT_CHARS: usize = 30;
/// Chunks summarized concurrently per batch.
const SUMMARY_BATCH_SIZE: usize = 5;
/// Token budget for one intermediate merge.
const INTERMEDIATE_MAX_TOKENS: usize = 400;

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}").unwrap()
});

/// Generates one summary per chunk.
pub struct SummaryGenerator {
    provider: Arc<dyn LlmProvider>,
    temperature: f32,
    max_tokens: usize,
    batch_pause_ms: u64,
    template: PromptTemplate,
}

impl SummaryGenerator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        temperature: f32,
        max_tokens: usize,
        batch_pause_ms: u64,
        template_path: &str,
    ) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
            batch_pause_ms,
            template: PromptTemplate::load(template_path, DEFAULT_SUMMARY_TEMPLATE),
        }
    }

    /// Summarize one chunk; any failure becomes None.
    pub async fn generate_summary_from_chunk(&self, chunk: &Chunk) -> Option<String> {
        let prompt = self.template.render(&[
            ("text", chunk.text.as_str()),
            ("chunk_id", &chunk.id.to_string()),
        ]);
        let messages = vec![ChatMessage::user(prompt)];

        match self
            .provider
            .complete(messages, self.temperature, self.max_tokens)
            .await
        {
            Ok(content) if !content.trim().is_empty() => {
                let summary = content.trim().to_string();
                debug!(
                    "Generated summary for chunk {}: {} characters",
                    chunk.index,
                    summary.len()
                );
                Some(summary)
            }
            Ok(_) => {
                warn!("Empty summary response for chunk {}", chunk.index);
                None
            }
            Err(e) => {
                error!("Error generating summary for chunk {}: {}", chunk.index, e);
                None
            }
        }
    }

    /// Summarize all chunks, batched for throttling. The returned vec is
    /// positionally aligned with `chunks`: failed generations are empty
    /// strings, never dropped, so index correspondence survives.
    pub async fn generate_summaries(&self, chunks: &[Chunk]) -> Vec<String> {
        if chunks.is_empty() {
            warn!("No chunks provided for summary generation");
            return Vec::new();
        }

        let batch_size = SUMMARY_BATCH_SIZE.min(chunks.len());
        info!(
            "Generating summaries for {} chunks (batch size {})",
            chunks.len(),
            batch_size
        );

        let mut summaries = Vec::with_capacity(chunks.len());
        for (batch_index, batch) in chunks.chunks(batch_size).enumerate() {
            if batch_index > 0 && self.batch_pause_ms > 0 {
                sleep(Duration::from_millis(self.batch_pause_ms)).await;
            }

            let tasks = batch.iter().map(|chunk| self.generate_summary_from_chunk(chunk));
            let results = futures::future::join_all(tasks).await;
            summaries.extend(results.into_iter().map(Option::unwrap_or_default));
        }

        let successful = summaries.iter().filter(|s| !s.trim().is_empty()).count();
        info!(
            "Summary generation complete: {}/{} successful",
            successful,
            chunks.len()
        );
        summaries
    }
}

/// Merges chunk summaries into one bounded-length document summary,
/// choosing direct or hierarchical combination by volume, with a lossless
/// concatenation fallback that cannot itself fail.
pub struct SummaryCombiner {
    provider: Arc<dyn LlmProvider>,
}

impl SummaryCombiner {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    pub async fn combine(&self, summaries: &[String], target_words: usize) -> String {
        if summaries.is_empty() {
            return NO_SUMMARIES.to_string();
        }

        let valid: Vec<String> = summaries
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if valid.is_empty() {
            return NO_VALID_SUMMARIES.to_string();
        }
        if valid.len() == 1 {
            return valid[0].clone();
        }

        match self.ai_combine(&valid, target_words).await {
            Some(result) if result.trim().chars().count() >= MIN_AI_RESULT_CHARS => {
                info!("AI combination successful");
                result
            }
            _ => {
                warn!("AI combination failed or produced insufficient content, using concatenation fallback");
                dedup_concat(&valid)
            }
        }
    }

    async fn ai_combine(&self, summaries: &[String], target_words: usize) -> Option<String> {
        let mut level: Vec<String> = summaries
            .iter()
            .map(|s| clean_summary(s))
            .filter(|s| s.chars().count() > 10)
            .collect();

        if level.is_empty() {
            return None;
        }
        if level.len() == 1 {
            return Some(level.remove(0));
        }

        if level.len() > DIRECT_COMBINE_LIMIT {
            info!(
                "Large document ({} summaries), using hierarchical combination",
                level.len()
            );
            while level.len() > INTERMEDIATE_TARGET {
                level = self.merge_groups(&level).await;
            }
            if level.len() == 1 {
                return Some(level.remove(0));
            }
        }

        self.direct_combine(&level, target_words).await
    }

    /// One hierarchical pass: merge groups of GROUP_SIZE into intermediate
    /// summaries. A failed group degrades to its own concatenation rather
    /// than losing content.
    async fn merge_groups(&self, summaries: &[String]) -> Vec<String> {
        let group_count = summaries.len().div_ceil(GROUP_SIZE);
        info!("Creating {} intermediate summaries", group_count);

        let mut intermediates = Vec::with_capacity(group_count);
        for group in summaries.chunks(GROUP_SIZE) {
            let group_text = group
                .iter()
                .enumerate()
                .map(|(i, s)| format!("Part {}: {}", i + 1, s))
                .collect::<Vec<_>>()
                .join("\n\n");

            let prompt = format!(
                "Combine these {} summaries into one cohesive summary. Maintain key \
                 information and write in the same language as the source text:\n\n{}\n\nCohesive Summary:",
                group.len(),
                group_text
            );

            let messages = vec![ChatMessage::user(prompt)];
            match self
                .provider
                .complete(messages, 0.3, INTERMEDIATE_MAX_TOKENS)
                .await
            {
                Ok(content) if !content.trim().is_empty() => {
                    intermediates.push(content.trim().to_string());
                }
                Ok(_) | Err(_) => {
                    warn!("Intermediate combination failed, concatenating group");
                    intermediates.push(group.join(". "));
                }
            }

            sleep(Duration::from_millis(500)).await;
        }
        intermediates
    }

    async fn direct_combine(&self, summaries: &[String], target_words: usize) -> Option<String> {
        let summaries_text = summaries
            .iter()
            .enumerate()
            .map(|(i, s)| format!("Section {}: {}", i + 1, s))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "I have {count} partial summaries from different sections of a document. \
             Please combine them into ONE coherent, comprehensive final summary of \
             approximately {target} words.\n\n\
             CRITICAL: Write the final summary in the SAME LANGUAGE as the partial \
             summaries. Do not translate or change the language.\n\n\
             Your task:\n\
             1. Remove redundancy and repetition between sections\n\
             2. Maintain all key information and important details\n\
             3. Create a flowing, cohesive narrative (not numbered sections)\n\
             4. Aim for about {target} words\n\n\
             Partial summaries to combine:\n{summaries}\n\nCombined Final Summary:",
            count = summaries.len(),
            target = target_words,
            summaries = summaries_text
        );

        let messages = vec![ChatMessage::user(prompt)];
        match self.provider.complete(messages, 0.3, target_words * 3).await {
            Ok(content) => {
                let result = content
                    .trim()
                    .trim_start_matches("Combined Final Summary:")
                    .trim_start_matches("Final Summary:")
                    .trim()
                    .to_string();
                if result.is_empty() {
                    None
                } else {
                    Some(result)
                }
            }
            Err(e) => {
                error!("Error in AI combination: {}", e);
                None
            }
        }
    }
}

/// Strip formatting and chunk-id references that leak from per-chunk
/// prompts before summaries are merged.
fn clean_summary(summary: &str) -> String {
    let cleaned = summary
        .replace("### Summary", "")
        .replace("**Chunk ID:**", "")
        .replace("Chunk ID:", "");
    UUID_RE.replace_all(&cleaned, "").trim().to_string()
}

/// Lossless fallback: join everything, then drop sentences that are
/// case-insensitive substrings of an already-kept sentence, preserving
/// first-seen order. Never empty when at least one summary is non-empty.
fn dedup_concat(summaries: &[String]) -> String {
    let combined = summaries.join(" ");
    let sentences: Vec<&str> = combined
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let mut unique: Vec<&str> = Vec::new();
    for sentence in sentences {
        let lower = sentence.to_lowercase();
        let already_kept = unique
            .iter()
            .any(|kept| kept.to_lowercase().contains(&lower));
        if !already_kept {
            unique.push(sentence);
        }
    }

    if unique.is_empty() {
        return combined;
    }
    format!("{}.", unique.join(". "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm_service::MockLlmProvider;
    use uuid::Uuid;

    fn chunk(text: &str) -> Chunk {
        Chunk::new(Uuid::new_v4(), text, 10, 12, 0, 0, text.len().max(1)).unwrap()
    }

    fn combiner(provider: MockLlmProvider) -> SummaryCombiner {
        SummaryCombiner::new(Arc::new(provider))
    }

    fn summaries(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("Summary number {} covering a distinct part of the document", i))
            .collect()
    }

    const LONG_MERGED: &str =
        "A merged summary that is comfortably longer than the thirty character floor.";

    #[tokio::test]
    async fn test_combine_empty_returns_sentinel() {
        let result = combiner(MockLlmProvider::new()).combine(&[], 300).await;
        assert_eq!(result, NO_SUMMARIES);
    }

    #[tokio::test]
    async fn test_combine_all_blank_returns_sentinel() {
        let inputs = vec!["".to_string(), "   ".to_string()];
        let result = combiner(MockLlmProvider::new()).combine(&inputs, 300).await;
        assert_eq!(result, NO_VALID_SUMMARIES);
    }

    #[tokio::test]
    async fn test_combine_single_summary_verbatim_without_llm() {
        // No expectation set: any provider call would panic the test.
        let inputs = vec!["only one summary here".to_string()];
        let result = combiner(MockLlmProvider::new()).combine(&inputs, 300).await;
        assert_eq!(result, "only one summary here");
    }

    #[tokio::test]
    async fn test_combine_few_summaries_uses_single_direct_call() {
        let mut provider = MockLlmProvider::new();
        provider
            .expect_complete()
            .times(1)
            .returning(|_, _, _| Ok(LONG_MERGED.to_string()));

        let result = combiner(provider).combine(&summaries(3), 300).await;
        assert_eq!(result, LONG_MERGED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_combine_25_summaries_goes_hierarchical() {
        // 25 inputs -> 4 groups of 8 -> 4 intermediate calls, then one
        // final direct combination: 5 provider calls total.
        let mut provider = MockLlmProvider::new();
        provider
            .expect_complete()
            .times(5)
            .returning(|_, _, _| Ok(LONG_MERGED.to_string()));

        let result = combiner(provider).combine(&summaries(25), 300).await;
        assert_eq!(result, LONG_MERGED);
    }

    #[tokio::test]
    async fn test_combine_falls_back_on_llm_failure() {
        let mut provider = MockLlmProvider::new();
        provider
            .expect_complete()
            .returning(|_, _, _| Err(anyhow::anyhow!("connection refused")));

        let inputs = vec![
            "The first part explains chunking.".to_string(),
            "The second part explains recovery.".to_string(),
        ];
        let result = combiner(provider).combine(&inputs, 300).await;
        assert!(result.contains("first part"));
        assert!(result.contains("second part"));
        assert!(!result.is_empty());
    }

    #[tokio::test]
    async fn test_combine_falls_back_on_too_short_result() {
        let mut provider = MockLlmProvider::new();
        provider
            .expect_complete()
            .returning(|_, _, _| Ok("Too short.".to_string()));

        let result = combiner(provider).combine(&summaries(2), 300).await;
        assert!(result.contains("Summary number 0"));
        assert!(result.contains("Summary number 1"));
    }

    #[test]
    fn test_dedup_concat_removes_substring_sentences() {
        let inputs = vec![
            "The chunker splits text. Overlap preserves context.".to_string(),
            "overlap preserves context. A new fact appears.".to_string(),
        ];
        let result = dedup_concat(&inputs);
        assert_eq!(
            result,
            "The chunker splits text. Overlap preserves context. A new fact appears."
        );
    }

    #[test]
    fn test_clean_summary_strips_chunk_references() {
        let input = "### Summary Chunk ID: 123e4567-e89b-12d3-a456-426614174000 the real content";
        assert_eq!(clean_summary(input), "the real content");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_generation_keeps_positional_placeholder() {
        let mut provider = MockLlmProvider::new();
        provider.expect_complete().returning(|messages, _, _| {
            if messages[0].content.contains("broken") {
                Err(anyhow::anyhow!("timeout"))
            } else {
                Ok("A perfectly good summary.".to_string())
            }
        });

        let generator = SummaryGenerator::new(
            Arc::new(provider),
            0.2,
            512,
            1000,
            "/nonexistent/summary.md",
        );
        let chunks = vec![chunk("good text"), chunk("broken text"), chunk("more good text")];
        let summaries = generator.generate_summaries(&chunks).await;

        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0], "A perfectly good summary.");
        assert_eq!(summaries[1], "");
        assert_eq!(summaries[2], "A perfectly good summary.");
    }
}
