use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::TextProcessingConfig;
use crate::models::Chunk;
use crate::utils::token_estimator::{TokenEstimator, WordRatioEstimator};

static PARAGRAPH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Honorifics and abbreviations whose trailing period is not a sentence end.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "st", "vs", "etc", "fig", "no",
];

/// Splitting granularity. Paragraph is the default and preferred strategy;
/// word-level is a boundary-blind fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkMethod {
    #[default]
    Paragraph,
    Sentence,
    Word,
}

/// Splits cleaned text into overlapping, word-bounded windows.
pub struct TextChunker {
    config: TextProcessingConfig,
    estimator: Box<dyn TokenEstimator>,
}

impl TextChunker {
    pub fn new(config: TextProcessingConfig) -> Self {
        Self {
            config,
            estimator: Box::new(WordRatioEstimator),
        }
    }

    pub fn with_estimator(mut self, estimator: Box<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Chunk `text` into ordered windows. Never fails: empty or
    /// whitespace-only input yields an empty vec.
    pub fn chunk(&self, text: &str, source_id: Uuid, method: ChunkMethod) -> Vec<Chunk> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let max_words = self.config.max_chunk_words;
        let min_words = self.config.min_chunk_words;
        let overlap_words = self.config.chunk_overlap_words;

        info!(
            "Chunking text: method={:?}, max_words={}, overlap={}",
            method, max_words, overlap_words
        );

        let raw_chunks = match method {
            ChunkMethod::Paragraph => split_by_paragraphs(text, max_words),
            ChunkMethod::Sentence => split_by_sentences(text, max_words),
            ChunkMethod::Word => split_by_words(text, max_words),
        };

        let final_texts = add_overlap(&raw_chunks, overlap_words);

        // Spans are located against the pre-overlap text; overlap-introduced
        // duplication would otherwise defeat the prefix search.
        let mut chunks = Vec::new();
        let mut cursor = 0usize; // byte position in `text`
        for (raw_text, final_text) in raw_chunks.iter().zip(final_texts.iter()) {
            if count_words(final_text) < min_words {
                debug!("Dropping undersized chunk ({} words)", count_words(final_text));
                continue;
            }

            let prefix: String = raw_text.chars().take(50).collect();
            let start_byte = match text[cursor..].find(prefix.as_str()) {
                Some(pos) => {
                    let start = cursor + pos;
                    cursor = start + prefix.len();
                    start
                }
                // Best-effort fallback: monotonically advancing cursor.
                None => cursor,
            };
            let start_char = text[..start_byte].chars().count();
            let end_char = start_char + raw_text.chars().count();

            let index = chunks.len();
            match Chunk::new(
                source_id,
                final_text.clone(),
                self.estimator.estimate(final_text),
                count_words(final_text),
                index,
                start_char,
                end_char,
            ) {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => debug!("Skipping invalid chunk at index {}: {}", index, e),
            }
        }

        info!("Created {} chunks", chunks.len());
        chunks
    }
}

fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Greedy paragraph accumulation. A paragraph that alone exceeds the limit
/// is handed to sentence-level splitting; content is never dropped here.
fn split_by_paragraphs(text: &str, max_words: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_words = 0;

    for paragraph in PARAGRAPH_RE.split(text) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        let words = count_words(paragraph);

        if words > max_words {
            if !current.is_empty() {
                chunks.push(current.join("\n\n"));
                current.clear();
                current_words = 0;
            }
            chunks.extend(split_by_sentences(paragraph, max_words));
        } else if !current.is_empty() && current_words + words > max_words {
            chunks.push(current.join("\n\n"));
            current = vec![paragraph];
            current_words = words;
        } else {
            current.push(paragraph);
            current_words += words;
        }
    }

    if !current.is_empty() {
        chunks.push(current.join("\n\n"));
    }
    chunks
}

/// Greedy sentence accumulation. An individual sentence longer than the
/// limit becomes its own (oversized) chunk.
fn split_by_sentences(text: &str, max_words: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_words = 0;

    for sentence in split_sentences(text) {
        let words = count_words(&sentence);
        if !current.is_empty() && current_words + words > max_words {
            chunks.push(current.join(" "));
            current = vec![sentence];
            current_words = words;
        } else {
            current.push(sentence);
            current_words += words;
        }
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}

/// Fixed-size word windows with no boundary awareness.
fn split_by_words(text: &str, max_words: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(max_words.max(1))
        .map(|window| window.join(" "))
        .collect()
}

/// Sentence boundary heuristic: `[.!?]+` followed by whitespace and a
/// capital letter (optionally behind an opening quote). Honorific periods
/// and initials ("Mr. Smith", "J. Doe") are not boundaries.
fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        if !matches!(chars[i], '.' | '!' | '?') {
            i += 1;
            continue;
        }
        let mut punct_end = i + 1;
        while punct_end < chars.len() && matches!(chars[punct_end], '.' | '!' | '?') {
            punct_end += 1;
        }
        let mut next = punct_end;
        while next < chars.len() && chars[next].is_whitespace() {
            next += 1;
        }

        let plain_period = punct_end - i == 1 && chars[i] == '.';
        let is_boundary = next > punct_end
            && next < chars.len()
            && starts_sentence(&chars[next..])
            && !(plain_period && is_abbreviation(&chars[start..i]));

        if is_boundary {
            let sentence: String = chars[start..punct_end].iter().collect();
            let sentence = sentence.trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = next;
            i = next;
        } else {
            i = punct_end;
        }
    }

    let tail: String = chars[start..].iter().collect();
    let tail = tail.trim().to_string();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn starts_sentence(rest: &[char]) -> bool {
    match rest.first() {
        Some(c) if c.is_uppercase() => true,
        Some('"') | Some('\'') => rest.get(1).is_some_and(|c| c.is_uppercase()),
        _ => false,
    }
}

/// The word ending right before a period, checked against the abbreviation
/// list; single letters count as initials.
fn is_abbreviation(before: &[char]) -> bool {
    let reversed: String = before
        .iter()
        .rev()
        .take_while(|c| c.is_alphabetic())
        .collect();
    if reversed.is_empty() {
        return false;
    }
    let word: String = reversed.chars().rev().collect::<String>().to_lowercase();
    word.chars().count() == 1 || ABBREVIATIONS.contains(&word.as_str())
}

/// Prepend the last `overlap_words` words of each chunk to its successor.
/// The first chunk is never prefixed.
fn add_overlap(chunks: &[String], overlap_words: usize) -> Vec<String> {
    if overlap_words == 0 || chunks.len() <= 1 {
        return chunks.to_vec();
    }
    let mut out = Vec::with_capacity(chunks.len());
    out.push(chunks[0].clone());
    for i in 1..chunks.len() {
        let prev_words: Vec<&str> = chunks[i - 1].split_whitespace().collect();
        let take = overlap_words.min(prev_words.len());
        let overlap = prev_words[prev_words.len() - take..].join(" ");
        out.push(format!("{} {}", overlap, chunks[i]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: usize, min: usize, overlap: usize) -> TextProcessingConfig {
        TextProcessingConfig {
            max_chunk_words: max,
            min_chunk_words: min,
            chunk_overlap_words: overlap,
            ..Default::default()
        }
    }

    fn paragraph(word: &str, count: usize) -> String {
        vec![word; count].join(" ")
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let chunker = TextChunker::new(config(100, 0, 0));
        assert!(chunker.chunk("", Uuid::new_v4(), ChunkMethod::Paragraph).is_empty());
        assert!(chunker.chunk("  \n ", Uuid::new_v4(), ChunkMethod::Paragraph).is_empty());
    }

    #[test]
    fn test_paragraphs_grouped_greedily_in_order() {
        let text = format!(
            "{}\n\n{}\n\n{}",
            paragraph("alpha", 60),
            paragraph("beta", 60),
            paragraph("gamma", 60)
        );
        let chunker = TextChunker::new(config(130, 0, 0));
        let chunks = chunker.chunk(&text, Uuid::new_v4(), ChunkMethod::Paragraph);

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.contains("alpha") && chunks[0].text.contains("beta"));
        assert!(chunks[1].text.contains("gamma"));
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn test_zero_overlap_chunks_cover_text_disjointly() {
        let text = format!(
            "{}\n\n{}\n\n{}\n\n{}",
            paragraph("one", 40),
            paragraph("two", 40),
            paragraph("three", 40),
            paragraph("four", 40)
        );
        let chunker = TextChunker::new(config(80, 0, 0));
        let chunks = chunker.chunk(&text, Uuid::new_v4(), ChunkMethod::Paragraph);

        let reassembled = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        assert_eq!(reassembled, text);
    }

    #[test]
    fn test_oversized_paragraph_falls_back_to_sentences() {
        let sentences =
            "The first sentence has exactly eight words in it. \
             The second sentence also has exactly eight words. \
             The third sentence rounds out the test paragraph.";
        let chunker = TextChunker::new(config(12, 0, 0));
        let chunks = chunker.chunk(sentences, Uuid::new_v4(), ChunkMethod::Paragraph);

        assert!(chunks.len() >= 2);
        let combined: String = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert!(combined.contains("first sentence"));
        assert!(combined.contains("third sentence"));
    }

    #[test]
    fn test_sentence_boundary_ignores_honorifics() {
        let sentences = split_sentences("He met Mr. Smith yesterday. They discussed the plan.");
        assert_eq!(
            sentences,
            vec![
                "He met Mr. Smith yesterday.".to_string(),
                "They discussed the plan.".to_string(),
            ]
        );
    }

    #[test]
    fn test_sentence_boundary_respects_quotes_and_initials() {
        let sentences = split_sentences("J. Doe agreed. \"Fine,\" she said! 'Great news' followed.");
        assert_eq!(sentences[0], "J. Doe agreed.");
        assert!(sentences.len() >= 2);
    }

    #[test]
    fn test_overlap_prefixes_previous_words() {
        let text = format!("{}\n\n{}", paragraph("first", 30), paragraph("second", 30));
        let chunker = TextChunker::new(config(30, 0, 5));
        let chunks = chunker.chunk(&text, Uuid::new_v4(), ChunkMethod::Paragraph);

        assert_eq!(chunks.len(), 2);
        assert!(!chunks[0].text.starts_with("second"));
        assert!(chunks[1].text.starts_with("first first first first first second"));
    }

    #[test]
    fn test_overlap_bounded_by_previous_chunk_length() {
        let chunks = add_overlap(&["a b c".to_string(), "d e f".to_string()], 10);
        assert_eq!(chunks[1], "a b c d e f");
    }

    // Deliberate behavior, revisit if boundary content loss becomes a
    // problem: undersized chunks are dropped, not merged into a neighbor.
    #[test]
    fn test_short_trailing_chunk_is_dropped() {
        let text = format!("{}\n\n{}", paragraph("body", 100), "tiny tail here");
        let chunker = TextChunker::new(config(100, 20, 0));
        let chunks = chunker.chunk(&text, Uuid::new_v4(), ChunkMethod::Paragraph);

        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].text.contains("tiny"));
    }

    #[test]
    fn test_word_method_fixed_windows() {
        let text = paragraph("w", 25);
        let chunker = TextChunker::new(config(10, 0, 0));
        let chunks = chunker.chunk(&text, Uuid::new_v4(), ChunkMethod::Word);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].word_count, 10);
        assert_eq!(chunks[2].word_count, 5);
    }

    #[test]
    fn test_token_count_uses_word_ratio_fallback() {
        let text = paragraph("token", 40);
        let chunker = TextChunker::new(config(100, 0, 0));
        let chunks = chunker.chunk(&text, Uuid::new_v4(), ChunkMethod::Paragraph);
        assert_eq!(chunks[0].token_count, 30); // 40 words * 0.75
    }

    #[test]
    fn test_spans_locate_paragraph_chunks() {
        let text = format!("{}\n\n{}", paragraph("head", 40), paragraph("tail", 40));
        let chunker = TextChunker::new(config(40, 0, 0));
        let chunks = chunker.chunk(&text, Uuid::new_v4(), ChunkMethod::Paragraph);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].start_char, 0);
        assert!(chunks[1].start_char > chunks[0].start_char);
        assert!(chunks[1].end_char > chunks[1].start_char);
    }
}
