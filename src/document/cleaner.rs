use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::config::TextProcessingConfig;

static HYPHEN_LINEBREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)-\s*\n\s*(\w+)").unwrap());
static HYPHEN_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)-\s+(\w+)").unwrap());
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());
static PAGE_ARTIFACT_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)^page \d+( of \d+)?").unwrap(),
        Regex::new(r"^\d+$").unwrap(),
        Regex::new(r"(?i)^chapter \d+").unwrap(),
    ]
});
static MULTI_DOT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{3,}").unwrap());
static MULTI_BANG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!{2,}").unwrap());
static MULTI_QUESTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?{2,}").unwrap());
/// Runs of whitespace excluding newlines.
static HORIZONTAL_WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n]+").unwrap());
static MULTI_NEWLINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Statistics from one cleaning pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleaningStats {
    pub original_length: usize,
    pub cleaned_length: usize,
    pub lines_removed: usize,
    pub urls_removed: usize,
    pub emails_removed: usize,
    pub special_chars_removed: usize,
}

impl CleaningStats {
    pub fn reduction_percentage(&self) -> f64 {
        if self.original_length == 0 {
            return 0.0;
        }
        (self.original_length - self.cleaned_length) as f64 / self.original_length as f64 * 100.0
    }
}

/// Normalizes raw extracted text before chunking.
///
/// Pure function of the input and the configured toggles; the step order is
/// fixed because later steps assume earlier ones ran (whitespace
/// normalization must come last).
pub struct TextCleaner {
    config: TextProcessingConfig,
}

impl TextCleaner {
    pub fn new(config: TextProcessingConfig) -> Self {
        Self { config }
    }

    pub fn clean(&self, text: &str) -> (String, CleaningStats) {
        if text.trim().is_empty() {
            return (text.to_string(), CleaningStats::default());
        }

        let original_length = text.chars().count();
        let mut stats = CleaningStats {
            original_length,
            ..Default::default()
        };

        debug!("Cleaning text ({} chars)", original_length);

        // 1. Hyphenation broken by source-format line wrapping
        let mut cleaned = fix_hyphenation(text);

        // 2-3. URL / email redaction
        if self.config.remove_urls {
            let (text, count) = redact(&cleaned, &URL_RE, " [URL] ");
            cleaned = text;
            stats.urls_removed = count;
        }
        if self.config.remove_emails {
            let (text, count) = redact(&cleaned, &EMAIL_RE, " [EMAIL] ");
            cleaned = text;
            stats.emails_removed = count;
        }

        // 4. Boilerplate lines (page numbers, headers)
        let (text, lines_removed) = remove_page_artifacts(&cleaned);
        cleaned = text;
        stats.lines_removed = lines_removed;

        // 5. Smart quotes, dashes, ellipses
        let (text, replaced) = normalize_special_characters(&cleaned);
        cleaned = text;
        stats.special_chars_removed = replaced;

        // 6. Excessive punctuation
        cleaned = collapse_punctuation(&cleaned);

        // 7. Whitespace, last
        if self.config.normalize_whitespace {
            cleaned = normalize_whitespace(&cleaned);
        }

        let cleaned = cleaned.trim().to_string();
        stats.cleaned_length = cleaned.chars().count();

        debug!(
            "Cleaning complete: {} -> {} chars ({:.1}% reduction)",
            stats.original_length,
            stats.cleaned_length,
            stats.reduction_percentage()
        );

        (cleaned, stats)
    }
}

fn fix_hyphenation(text: &str) -> String {
    let text = HYPHEN_LINEBREAK_RE.replace_all(text, "$1$2");
    HYPHEN_SPACE_RE.replace_all(&text, "$1$2").into_owned()
}

fn redact(text: &str, pattern: &Regex, sentinel: &str) -> (String, usize) {
    let count = pattern.find_iter(text).count();
    if count == 0 {
        return (text.to_string(), 0);
    }
    (pattern.replace_all(text, sentinel).into_owned(), count)
}

fn remove_page_artifacts(text: &str) -> (String, usize) {
    let mut kept = Vec::new();
    let mut removed = 0;
    for line in text.lines() {
        let stripped = line.trim();
        if !stripped.is_empty() && PAGE_ARTIFACT_RES.iter().any(|re| re.is_match(stripped)) {
            removed += 1;
        } else {
            kept.push(line);
        }
    }
    (kept.join("\n"), removed)
}

fn normalize_special_characters(text: &str) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut replaced = 0;
    for c in text.chars() {
        match c {
            '\u{201C}' | '\u{201D}' => {
                out.push('"');
                replaced += 1;
            }
            '\u{2018}' | '\u{2019}' => {
                out.push('\'');
                replaced += 1;
            }
            '\u{2013}' | '\u{2014}' => {
                out.push('-');
                replaced += 1;
            }
            '\u{2026}' => {
                out.push_str("...");
                replaced += 1;
            }
            _ => out.push(c),
        }
    }
    (out, replaced)
}

fn collapse_punctuation(text: &str) -> String {
    let text = MULTI_DOT_RE.replace_all(text, "...");
    let text = MULTI_BANG_RE.replace_all(&text, "!");
    MULTI_QUESTION_RE.replace_all(&text, "?").into_owned()
}

/// Collapse horizontal whitespace runs, trim lines, and reduce blank-line
/// runs to a single paragraph break.
fn normalize_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = HORIZONTAL_WS_RE.replace_all(&text, " ");
    let text = MULTI_NEWLINE_RE.replace_all(&text, "\n\n");

    let mut lines = Vec::new();
    let mut prev_empty = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed);
            prev_empty = false;
        } else if !prev_empty {
            lines.push("");
            prev_empty = true;
        }
    }
    lines.join("\n")
}
