use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supported input file types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Txt,
    Markdown,
    Pdf,
    Docx,
    Html,
}

impl SourceType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" => Some(SourceType::Txt),
            "md" | "markdown" => Some(SourceType::Markdown),
            "pdf" => Some(SourceType::Pdf),
            "docx" | "doc" => Some(SourceType::Docx),
            "html" | "htm" => Some(SourceType::Html),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Txt => "txt",
            SourceType::Markdown => "markdown",
            SourceType::Pdf => "pdf",
            SourceType::Docx => "docx",
            SourceType::Html => "html",
        }
    }
}

/// An input document. Content is set once at load time; cleaning produces a
/// new string rather than mutating the loaded bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub source_type: SourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Source {
    pub fn new(title: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into().trim().to_string(),
            file_path: None,
            source_type,
            content: None,
            metadata: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// A bounded window of a source's cleaned text, the unit of LLM prompting.
///
/// `start_char`/`end_char` are best-effort positions in the cleaned text
/// (see the chunker's span search); nothing correctness-critical may depend
/// on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub source_id: Uuid,
    pub text: String,
    pub token_count: usize,
    pub word_count: usize,
    pub index: usize,
    pub start_char: usize,
    pub end_char: usize,
}

impl Chunk {
    /// Build a chunk, enforcing non-empty text and `end_char > start_char`.
    pub fn new(
        source_id: Uuid,
        text: impl Into<String>,
        token_count: usize,
        word_count: usize,
        index: usize,
        start_char: usize,
        end_char: usize,
    ) -> anyhow::Result<Self> {
        let text = text.into().trim().to_string();
        if text.is_empty() {
            anyhow::bail!("chunk text cannot be empty");
        }
        if end_char <= start_char {
            anyhow::bail!("end_char must be greater than start_char");
        }
        Ok(Self {
            id: Uuid::new_v4(),
            source_id,
            text,
            token_count,
            word_count,
            index,
            start_char,
            end_char,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_rejects_empty_text() {
        let result = Chunk::new(Uuid::new_v4(), "   ", 0, 0, 0, 0, 10);
        assert!(result.is_err());
    }

    #[test]
    fn test_chunk_rejects_inverted_span() {
        let result = Chunk::new(Uuid::new_v4(), "some text", 2, 2, 0, 10, 10);
        assert!(result.is_err());
    }

    #[test]
    fn test_source_type_from_extension() {
        assert_eq!(SourceType::from_extension("PDF"), Some(SourceType::Pdf));
        assert_eq!(SourceType::from_extension("markdown"), Some(SourceType::Markdown));
        assert_eq!(SourceType::from_extension("xlsx"), None);
    }
}
