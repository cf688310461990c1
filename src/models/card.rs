use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Estimated difficulty of a card. Unrecognized values parse to `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "easy" => Difficulty::Easy,
            "hard" => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }
}

/// A single front/back flashcard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub front: String,
    pub back: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Card {
    /// Build a card with trimmed sides and normalized tags.
    /// Fails on an empty front or back; length thresholds are applied later
    /// by `validate_cards`, not here.
    pub fn new(
        front: impl Into<String>,
        back: impl Into<String>,
        tags: Vec<String>,
        difficulty: Difficulty,
        chunk_id: Option<Uuid>,
        source_id: Option<Uuid>,
    ) -> anyhow::Result<Self> {
        let front = front.into().trim().to_string();
        let back = back.into().trim().to_string();
        if front.is_empty() {
            anyhow::bail!("card front cannot be empty");
        }
        if back.is_empty() {
            anyhow::bail!("card back cannot be empty");
        }
        Ok(Self {
            id: Uuid::new_v4(),
            front,
            back,
            tags: normalize_tags(tags),
            difficulty,
            chunk_id,
            source_id,
            created_at: Utc::now(),
        })
    }
}

/// Lowercase, trim, drop empties and duplicates, preserving first-seen order.
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// An ordered collection of cards plus the sources they came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub cards: Vec<Card>,
    pub source_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deck {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into().trim().to_string(),
            description: None,
            cards: Vec::new(),
            source_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_card(&mut self, card: Card) {
        if let Some(source_id) = card.source_id {
            if !self.source_ids.contains(&source_id) {
                self.source_ids.push(source_id);
            }
        }
        self.cards.push(card);
        self.updated_at = Utc::now();
    }

    pub fn add_cards(&mut self, cards: Vec<Card>) {
        for card in cards {
            self.add_card(card);
        }
    }

    /// Remove duplicate cards keyed on normalized (front, back) pairs.
    /// Returns the number of cards removed.
    pub fn remove_duplicates(&mut self) -> usize {
        let mut seen = HashSet::new();
        let before = self.cards.len();
        self.cards.retain(|card| {
            let key = (
                card.front.trim().to_lowercase(),
                card.back.trim().to_lowercase(),
            );
            seen.insert(key)
        });
        let removed = before - self.cards.len();
        if removed > 0 {
            self.updated_at = Utc::now();
        }
        removed
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }
}

/// Statistics for one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub sources_processed: usize,
    pub chunks_created: usize,
    pub cards_generated: usize,
    pub cards_filtered: usize,
    pub duplicates_removed: usize,
    pub processing_time_secs: f64,
    pub errors: Vec<String>,
}

impl ProcessingStats {
    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn success_rate(&self) -> f64 {
        if self.chunks_created == 0 {
            return 0.0;
        }
        self.cards_generated as f64 / self.chunks_created as f64
    }
}
