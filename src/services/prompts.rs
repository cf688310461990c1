use std::path::Path;
use tracing::warn;

/// Built-in flashcard generation template, used when the configured
/// template file is missing. Placeholders: {text}, {chunk_id}, {max_cards}.
pub const DEFAULT_QA_TEMPLATE: &str = r#"You are an expert educational content creator. Your task is to generate high-quality flashcards from the provided text content.

Guidelines:
1. Create clear, concise question-answer pairs
2. Focus on key concepts, definitions, and important facts
3. Ensure questions are specific and answerable from the content
4. Make answers complete but concise
5. Generate {max_cards} flashcards maximum per chunk
6. Output valid JSON format only

Input Text (chunk {chunk_id}):
{text}

Output Format (JSON only, no other text):
{
  "cards": [
    {
      "front": "What is...?",
      "back": "Clear, concise answer.",
      "difficulty": "easy|medium|hard"
    }
  ]
}"#;

/// Built-in summary template. Placeholders: {text}, {chunk_id}.
pub const DEFAULT_SUMMARY_TEMPLATE: &str = r#"You are an expert text summarizer. Analyze the following text and create a concise, informative summary that captures the key information and main points.

Text to summarize:
{text}

Please provide a clear, concise summary of this text chunk."#;

/// A prompt template with `{placeholder}` substitution.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn from_string(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Load from a file, falling back to `default` when the file is missing
    /// or unreadable. The fallback carries identical placeholder semantics,
    /// so callers never need to know which one they got.
    pub fn load(path: impl AsRef<Path>, default: &str) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(template) => Self { template },
            Err(e) => {
                warn!(
                    "Prompt template {} not available ({}), using built-in default",
                    path.display(),
                    e
                );
                Self {
                    template: default.to_string(),
                }
            }
        }
    }

    /// Substitute `{key}` occurrences; unknown placeholders are left as-is.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        let mut out = self.template.clone();
        for (key, value) in vars {
            out = out.replace(&format!("{{{}}}", key), value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_placeholders() {
        let template = PromptTemplate::from_string("Summarize {text} for chunk {chunk_id}.");
        let rendered = template.render(&[("text", "the content"), ("chunk_id", "c1")]);
        assert_eq!(rendered, "Summarize the content for chunk c1.");
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let template = PromptTemplate::load("/nonexistent/qa.md", DEFAULT_QA_TEMPLATE);
        let rendered = template.render(&[
            ("text", "body"),
            ("chunk_id", "c9"),
            ("max_cards", "8"),
        ]);
        assert!(rendered.contains("body"));
        assert!(rendered.contains("Generate 8 flashcards"));
        assert!(rendered.contains("chunk c9"));
    }

    #[test]
    fn test_unknown_placeholders_left_intact() {
        let template = PromptTemplate::from_string("Keep {unknown} alone, fill {text}.");
        let rendered = template.render(&[("text", "this")]);
        assert_eq!(rendered, "Keep {unknown} alone, fill this.");
    }
}
