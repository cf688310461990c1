use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub text_processing: TextProcessingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8800,
            max_upload_mb: 100,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    /// Specific model to use; auto-selected from the backend's list if None.
    pub model_name: Option<String>,
    pub timeout_seconds: u64,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:1234".to_string(),
            model_name: None,
            timeout_seconds: 120,
            max_tokens: 2500,
            temperature: 0.2,
            top_p: 0.9,
        }
    }
}

/// Which token estimator the chunker uses. Counts are advisory either way.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenEstimatorKind {
    /// 0.75 tokens per whitespace-separated word.
    #[default]
    Words,
    /// ~3 graphemes per token; better for CJK-heavy text.
    Graphemes,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TextProcessingConfig {
    /// Maximum words per chunk.
    pub max_chunk_words: usize,
    /// Chunks with fewer words are dropped entirely (not merged).
    pub min_chunk_words: usize,
    /// Trailing words of each chunk prepended to the next one.
    pub chunk_overlap_words: usize,
    pub remove_urls: bool,
    pub remove_emails: bool,
    pub normalize_whitespace: bool,
    #[serde(default)]
    pub token_estimator: TokenEstimatorKind,
}

impl Default for TextProcessingConfig {
    fn default() -> Self {
        Self {
            max_chunk_words: 200,
            min_chunk_words: 20,
            chunk_overlap_words: 50,
            remove_urls: true,
            remove_emails: true,
            normalize_whitespace: true,
            token_estimator: TokenEstimatorKind::Words,
        }
    }
}

/// How card generation walks the chunk list.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// One request at a time with a fixed delay between requests.
    #[default]
    Sequential,
    /// Bounded-concurrent requests behind a semaphore.
    Concurrent,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenerationConfig {
    pub max_cards_per_chunk: usize,
    pub mode: GenerationMode,
    /// Sleep between sequential requests, milliseconds.
    pub rate_limit_delay_ms: u64,
    /// Semaphore size for concurrent mode.
    pub max_concurrent_requests: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_cards_per_chunk: 8,
            mode: GenerationMode::Sequential,
            rate_limit_delay_ms: 500,
            max_concurrent_requests: 3,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SummaryConfig {
    /// Target word count for the combined document summary.
    pub target_words: usize,
    /// Pause between summary batches, milliseconds.
    pub batch_pause_ms: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            target_words: 300,
            batch_pause_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptsConfig {
    pub qa_template_path: String,
    pub summary_template_path: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            qa_template_path: "prompts/qa_generation.md".to_string(),
            summary_template_path: "prompts/summary_generation.md".to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_tuned_values() {
        let settings = Settings::default();
        assert_eq!(settings.text_processing.max_chunk_words, 200);
        assert_eq!(settings.text_processing.chunk_overlap_words, 50);
        assert_eq!(settings.text_processing.min_chunk_words, 20);
        assert_eq!(settings.generation.max_cards_per_chunk, 8);
        assert_eq!(settings.llm.max_tokens, 2500);
    }

    #[test]
    fn test_generation_mode_deserializes_lowercase() {
        let mode: GenerationMode = serde_json::from_str("\"concurrent\"").unwrap();
        assert_eq!(mode, GenerationMode::Concurrent);
    }
}
