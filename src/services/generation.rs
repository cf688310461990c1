use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::config::{GenerationConfig, GenerationMode, LlmConfig};
use crate::models::{Card, Chunk, Difficulty};
use crate::services::llm_service::LlmProvider;
use crate::services::prompts::{PromptTemplate, DEFAULT_QA_TEMPLATE};
use crate::services::recovery;

/// Fronts starting with these stems mean the model lost the subject of the
/// chunk ("What is this?" with no antecedent).
const GENERIC_STEMS: &[&str] = &[
    "what is this",
    "what are these",
    "explain this",
    "describe this",
    "what does this mean",
];

const MIN_FRONT_CHARS: usize = 10;
const MIN_BACK_CHARS: usize = 5;

/// Generates flashcards from chunks via the configured LLM provider.
pub struct FlashcardGenerator {
    provider: Arc<dyn LlmProvider>,
    config: GenerationConfig,
    temperature: f32,
    max_tokens: usize,
    template: PromptTemplate,
}

impl FlashcardGenerator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: GenerationConfig,
        llm_config: &LlmConfig,
        template_path: &str,
    ) -> Self {
        Self {
            provider,
            config,
            temperature: llm_config.temperature,
            max_tokens: llm_config.max_tokens,
            template: PromptTemplate::load(template_path, DEFAULT_QA_TEMPLATE),
        }
    }

    /// Generate cards for every chunk in the configured execution mode.
    /// A failing chunk contributes zero cards; siblings are unaffected.
    pub async fn generate_cards(&self, chunks: &[Chunk]) -> Vec<Card> {
        if chunks.is_empty() {
            return Vec::new();
        }
        info!(
            "Generating flashcards from {} chunks (mode={:?})",
            chunks.len(),
            self.config.mode
        );

        match self.config.mode {
            GenerationMode::Sequential => self.generate_sequential(chunks).await,
            GenerationMode::Concurrent => self.generate_concurrent(chunks).await,
        }
    }

    async fn generate_sequential(&self, chunks: &[Chunk]) -> Vec<Card> {
        let mut all_cards = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if self.config.rate_limit_delay_ms > 0 {
                sleep(Duration::from_millis(self.config.rate_limit_delay_ms)).await;
            }
            let cards = self.generate_cards_from_chunk(chunk).await;
            all_cards.extend(cards);
            info!(
                "Progress: {} cards generated from {}/{} chunks",
                all_cards.len(),
                i + 1,
                chunks.len()
            );
        }
        all_cards
    }

    async fn generate_concurrent(&self, chunks: &[Chunk]) -> Vec<Card> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_requests.max(1)));

        let tasks = chunks.iter().map(|chunk| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Vec::new(),
                };
                if self.config.rate_limit_delay_ms > 0 {
                    sleep(Duration::from_millis(self.config.rate_limit_delay_ms)).await;
                }
                self.generate_cards_from_chunk(chunk).await
            }
        });

        let results = futures::future::join_all(tasks).await;
        let all_cards: Vec<Card> = results.into_iter().flatten().collect();
        info!("Batch processing complete: {} cards", all_cards.len());
        all_cards
    }

    /// One prompt/response round trip for one chunk. Never fails: transport
    /// or parse trouble logs and returns an empty vec.
    pub async fn generate_cards_from_chunk(&self, chunk: &Chunk) -> Vec<Card> {
        debug!(
            "Generating flashcards from chunk {} ({} chars)",
            chunk.index,
            chunk.text.len()
        );

        let prompt = self.template.render(&[
            ("text", chunk.text.as_str()),
            ("chunk_id", &chunk.id.to_string()),
            ("max_cards", &self.config.max_cards_per_chunk.to_string()),
        ]);

        let messages = vec![crate::models::ChatMessage::user(prompt)];
        match self
            .provider
            .complete(messages, self.temperature, self.max_tokens)
            .await
        {
            Ok(raw) if !raw.trim().is_empty() => {
                let cards = parse_cards(&raw, chunk);
                info!(
                    "Generated {} flashcards from chunk {}",
                    cards.len(),
                    chunk.index
                );
                cards
            }
            Ok(_) => {
                error!("Empty response from LLM for chunk {}", chunk.index);
                Vec::new()
            }
            Err(e) => {
                error!("Error generating cards from chunk {}: {}", chunk.index, e);
                Vec::new()
            }
        }
    }
}

/// Extract cards from raw model text via the recovery ladder.
/// Total failure returns an empty vec, logged, never surfaced.
pub fn parse_cards(raw: &str, chunk: &Chunk) -> Vec<Card> {
    let Some(value) = recovery::recover(raw.trim()) else {
        error!("Could not recover JSON from LLM response");
        debug!("Raw response: {:.500}", raw);
        return Vec::new();
    };
    extract_cards(&value, chunk)
}

/// Both `cards` and `flashcards` top-level keys are accepted, as are the
/// legacy `question`/`answer` field names. The schema has changed once
/// already; old shapes stay supported.
fn extract_cards(value: &Value, chunk: &Chunk) -> Vec<Card> {
    let entries = value
        .get("cards")
        .or_else(|| value.get("flashcards"))
        .and_then(Value::as_array);

    let Some(entries) = entries else {
        error!("Response JSON missing 'cards'/'flashcards' array");
        return Vec::new();
    };

    let mut cards = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let front = field_text(entry, "front", "question");
        let back = field_text(entry, "back", "answer");
        let (Some(front), Some(back)) = (front, back) else {
            warn!("Skipping card {}: missing front/back text", i);
            continue;
        };

        let tags = entry
            .get("tags")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let difficulty = entry
            .get("difficulty")
            .and_then(Value::as_str)
            .map(Difficulty::parse)
            .unwrap_or_default();

        match Card::new(front, back, tags, difficulty, Some(chunk.id), Some(chunk.source_id)) {
            Ok(card) => cards.push(card),
            Err(e) => warn!("Skipping card {}: {}", i, e),
        }
    }
    cards
}

fn field_text(entry: &Value, name: &str, legacy_name: &str) -> Option<String> {
    entry
        .get(name)
        .or_else(|| entry.get(legacy_name))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Drop cards that fail the length thresholds, echo their own front, or
/// open with a generic stem. Individually logged; the batch survives.
pub fn validate_cards(cards: Vec<Card>) -> Vec<Card> {
    let total = cards.len();
    let valid: Vec<Card> = cards
        .into_iter()
        .filter(|card| match check_card(card) {
            Ok(()) => true,
            Err(reason) => {
                warn!("Skipping card '{:.50}': {}", card.front, reason);
                false
            }
        })
        .collect();

    info!("Validation complete: {}/{} cards passed", valid.len(), total);
    valid
}

fn check_card(card: &Card) -> Result<(), &'static str> {
    if card.front.chars().count() < MIN_FRONT_CHARS {
        return Err("front too short");
    }
    if card.back.chars().count() < MIN_BACK_CHARS {
        return Err("back too short");
    }

    let front = card.front.to_lowercase();
    let back = card.back.to_lowercase();
    if front.contains(&back) || back.contains(&front) {
        return Err("answer echoes the question");
    }
    if GENERIC_STEMS.iter().any(|stem| front.starts_with(stem)) {
        return Err("overly generic question");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm_service::MockLlmProvider;
    use uuid::Uuid;

    fn chunk(text: &str) -> Chunk {
        Chunk::new(Uuid::new_v4(), text, 10, 12, 0, 0, text.len().max(1)).unwrap()
    }

    fn card(front: &str, back: &str) -> Card {
        Card::new(front, back, vec![], Difficulty::Medium, None, None).unwrap()
    }

    fn generator(provider: MockLlmProvider, config: GenerationConfig) -> FlashcardGenerator {
        FlashcardGenerator::new(
            Arc::new(provider),
            config,
            &LlmConfig::default(),
            "/nonexistent/template.md",
        )
    }

    #[test]
    fn test_parse_well_formed_response() {
        let raw = r#"{"cards":[{"front":"Q1?","back":"A1"}]}"#;
        let cards = parse_cards(raw, &chunk("source text"));
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].front, "Q1?");
        assert_eq!(cards[0].back, "A1");
        assert_eq!(cards[0].difficulty, Difficulty::Medium);
    }

    #[test]
    fn test_parse_truncated_response_keeps_complete_cards() {
        let raw = r#"{"cards":[{"front":"Q1?","back":"A1","chunk_id":"c1"},{"front":"Q2?","back":"A2","chunk_id":"c1"},{"fr"#;
        let cards = parse_cards(raw, &chunk("source text"));
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].front, "Q1?");
        assert_eq!(cards[1].front, "Q2?");
    }

    #[test]
    fn test_parse_accepts_legacy_schema() {
        let raw = r#"{"flashcards":[{"question":"What is X?","answer":"X is Y.","difficulty":"hard"}]}"#;
        let cards = parse_cards(raw, &chunk("source text"));
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].front, "What is X?");
        assert_eq!(cards[0].back, "X is Y.");
        assert_eq!(cards[0].difficulty, Difficulty::Hard);
    }

    #[test]
    fn test_parse_skips_bad_entries_individually() {
        let raw = r#"{"cards":[
            {"front":"Good question?","back":"Good answer."},
            {"front":"","back":"orphan"},
            {"back":"no front"},
            {"front":"Another question?","back":"Another answer."}
        ]}"#;
        let cards = parse_cards(raw, &chunk("source text"));
        assert_eq!(cards.len(), 2);
    }

    #[test]
    fn test_parse_absorbs_tags_and_unknown_difficulty() {
        let raw = r#"{"cards":[{"front":"Q tags?","back":"A.","tags":["Bio"," bio ","x"],"difficulty":"extreme"}]}"#;
        let cards = parse_cards(raw, &chunk("source text"));
        assert_eq!(cards[0].tags, vec!["bio", "x"]);
        assert_eq!(cards[0].difficulty, Difficulty::Medium);
    }

    #[test]
    fn test_parse_garbage_returns_empty() {
        assert!(parse_cards("total nonsense", &chunk("text")).is_empty());
        assert!(parse_cards("", &chunk("text")).is_empty());
    }

    #[test]
    fn test_validate_rejects_short_front() {
        let cards = vec![
            card("Hi?", "An answer that is fine."),
            card("What is polymorphism?", "Ability to take many forms."),
        ];
        let valid = validate_cards(cards);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].front, "What is polymorphism?");
    }

    #[test]
    fn test_validate_rejects_short_back() {
        let cards = vec![card("What is the speed of light?", "fast")];
        assert!(validate_cards(cards).is_empty());
    }

    #[test]
    fn test_validate_rejects_echo_cards() {
        let cards = vec![
            card("Define the borrow checker", "the borrow checker"),
            card("The compiler", "What does the compiler do in Rust builds?"),
        ];
        assert!(validate_cards(cards).is_empty());
    }

    #[test]
    fn test_validate_rejects_generic_stems() {
        let cards = vec![card("What is this passage about?", "It covers several topics.")];
        assert!(validate_cards(cards).is_empty());
    }

    #[tokio::test]
    async fn test_failing_chunk_does_not_abort_siblings() {
        let mut provider = MockLlmProvider::new();
        provider.expect_complete().returning(|messages, _, _| {
            if messages[0].content.contains("poison") {
                Err(anyhow::anyhow!("backend exploded"))
            } else {
                Ok(r#"{"cards":[{"front":"Q ok?","back":"A ok."}]}"#.to_string())
            }
        });

        let config = GenerationConfig {
            rate_limit_delay_ms: 0,
            mode: GenerationMode::Sequential,
            ..Default::default()
        };
        let generator = generator(provider, config);

        let chunks = vec![chunk("fine text"), chunk("poison text"), chunk("more fine text")];
        let cards = generator.generate_cards(&chunks).await;
        assert_eq!(cards.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_mode_collects_all_results() {
        let mut provider = MockLlmProvider::new();
        provider
            .expect_complete()
            .times(3)
            .returning(|_, _, _| Ok(r#"{"cards":[{"front":"Q?","back":"A."}]}"#.to_string()));

        let config = GenerationConfig {
            rate_limit_delay_ms: 0,
            mode: GenerationMode::Concurrent,
            max_concurrent_requests: 2,
            ..Default::default()
        };
        let generator = generator(provider, config);

        let chunks = vec![chunk("one"), chunk("two"), chunk("three")];
        let cards = generator.generate_cards(&chunks).await;
        assert_eq!(cards.len(), 3);
    }
}
