/// Token estimation for chunk sizing decisions.
///
/// Counts are advisory only: they feed the chunker's size heuristics and are
/// never used as an exact budget against the model's context window.
use unicode_segmentation::UnicodeSegmentation;

/// Pluggable token estimator consumed by the chunker.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// Word-ratio fallback estimator.
///
/// `tokens ≈ 0.75 × words`. The ratio is load-bearing: size-tuning
/// heuristics elsewhere assume it, so it must stay 0.75.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordRatioEstimator;

impl TokenEstimator for WordRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        let words = text.split_whitespace().count();
        (words as f64 * 0.75) as usize
    }
}

/// Grapheme-based estimator, ~3 graphemes per token.
///
/// Slightly better than the word ratio for CJK-heavy or punctuation-dense
/// text where whitespace word counts undershoot.
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphemeEstimator;

impl TokenEstimator for GraphemeEstimator {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let graphemes = text.graphemes(true).count();
        graphemes.div_ceil(3).max(1)
    }
}

/// Estimate tokens with the default estimator.
pub fn estimate_tokens(text: &str) -> usize {
    WordRatioEstimator.estimate(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_ratio() {
        // 8 words * 0.75 = 6
        let text = "one two three four five six seven eight";
        assert_eq!(estimate_tokens(text), 6);
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(GraphemeEstimator.estimate(""), 0);
    }

    #[test]
    fn test_grapheme_estimator() {
        let tokens = GraphemeEstimator.estimate("Hello world");
        // 11 graphemes / 3 = 4
        assert_eq!(tokens, 4);
    }
}
