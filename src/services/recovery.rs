//! Recovery ladder for malformed LLM output.
//!
//! Local models regularly wrap JSON in prose, leave keys unquoted, or
//! truncate mid-array when they hit `max_tokens`. Each strategy here is one
//! independent salvage attempt; they run in a fixed priority order and the
//! first success wins. Losing trailing cards to truncation is acceptable,
//! losing leading well-formed cards is not.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// A complete card-shaped object literal with the exact expected fields,
/// even when embedded in a broken outer structure.
static CARD_OBJECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)\{\s*"front"\s*:\s*"[^"]*"\s*,\s*"back"\s*:\s*"[^"]*"\s*,\s*"chunk_id"\s*:\s*"[^"]*"\s*\}"#,
    )
    .unwrap()
});

/// Bare object keys: `{key:` or `, key:` without quotes.
static BARE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:").unwrap());

/// One salvage attempt. Returns the recovered JSON object or None.
pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn attempt(&self, text: &str) -> Option<Value>;
}

/// Stage 1: treat the first `{` through the last `}` as the candidate
/// object and parse it directly.
pub struct BraceExtraction;

impl RecoveryStrategy for BraceExtraction {
    fn name(&self) -> &'static str {
        "brace-extraction"
    }

    fn attempt(&self, text: &str) -> Option<Value> {
        let candidate = extract_braced(text)?;
        serde_json::from_str(candidate).ok()
    }
}

/// Stage 2: scan for complete card object literals inside an otherwise
/// broken body and assemble a synthetic `{"cards": [...]}` from them.
pub struct CardObjectScan;

impl RecoveryStrategy for CardObjectScan {
    fn name(&self) -> &'static str {
        "card-object-scan"
    }

    fn attempt(&self, text: &str) -> Option<Value> {
        let cards: Vec<Value> = CARD_OBJECT_RE
            .find_iter(text)
            .filter_map(|m| serde_json::from_str(m.as_str()).ok())
            .collect();

        if cards.is_empty() {
            return None;
        }
        debug!("Recovered {} cards from truncated JSON", cards.len());
        Some(serde_json::json!({ "cards": cards }))
    }
}

/// Stage 3: light syntactic repair. Trim to the braced region, quote bare
/// object keys, then retry a direct parse.
pub struct SyntacticRepair;

impl RecoveryStrategy for SyntacticRepair {
    fn name(&self) -> &'static str {
        "syntactic-repair"
    }

    fn attempt(&self, text: &str) -> Option<Value> {
        let candidate = extract_braced(text)?;
        let repaired = BARE_KEY_RE.replace_all(candidate, "$1\"$2\":");
        serde_json::from_str(&repaired).ok()
    }
}

/// The ladder, in priority order.
pub fn strategies() -> Vec<Box<dyn RecoveryStrategy>> {
    vec![
        Box::new(BraceExtraction),
        Box::new(CardObjectScan),
        Box::new(SyntacticRepair),
    ]
}

/// Run the ladder; first success wins, total failure is None.
pub fn recover(text: &str) -> Option<Value> {
    for strategy in strategies() {
        if let Some(value) = strategy.attempt(text) {
            debug!("Response recovered via {}", strategy.name());
            return Some(value);
        }
    }
    None
}

fn extract_braced(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brace_extraction_handles_prose_wrapping() {
        let raw = r#"Sure! Here are your flashcards:
            {"cards": [{"front": "Q1?", "back": "A1"}]}
            Let me know if you need more."#;
        let value = BraceExtraction.attempt(raw).unwrap();
        assert_eq!(value["cards"][0]["front"], "Q1?");
    }

    #[test]
    fn test_brace_extraction_rejects_broken_json() {
        assert!(BraceExtraction.attempt(r#"{"cards": [{"front": "Q1"#).is_none());
        assert!(BraceExtraction.attempt("no json at all").is_none());
    }

    #[test]
    fn test_card_scan_recovers_complete_objects_from_truncation() {
        let raw = r#"{"cards":[{"front":"Q1?","back":"A1","chunk_id":"c1"},{"front":"Q2?","back":"A2","chunk_id":"c1"},{"fr"#;
        let value = CardObjectScan.attempt(raw).unwrap();
        let cards = value["cards"].as_array().unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0]["front"], "Q1?");
        assert_eq!(cards[1]["back"], "A2");
    }

    #[test]
    fn test_card_scan_requires_exact_field_pattern() {
        let raw = r#"{"cards":[{"question":"Q1?","answer":"A1"},{"fr"#;
        assert!(CardObjectScan.attempt(raw).is_none());
    }

    #[test]
    fn test_syntactic_repair_quotes_bare_keys() {
        let raw = r#"Model says: {cards: [{front: "Q1?", back: "A1"}]} done"#;
        let value = SyntacticRepair.attempt(raw).unwrap();
        assert_eq!(value["cards"][0]["back"], "A1");
    }

    #[test]
    fn test_ladder_order_first_success_wins() {
        // Valid JSON: stage 1 must handle it without reaching the scan.
        let raw = r#"{"cards": [{"front": "Q?", "back": "A", "chunk_id": "c"}]}"#;
        let value = recover(raw).unwrap();
        assert_eq!(value["cards"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_ladder_total_failure_is_none() {
        assert!(recover("the model produced nothing useful").is_none());
    }
}
