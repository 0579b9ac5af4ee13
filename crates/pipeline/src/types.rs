//! Shared value types for the generation domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! the data that flows through a run: catalog entries, work items and the
//! generated records that end up in the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{CardName, DimensionName, ItemFailure};

// ---------------------------------------------------------------------------
// Card identity
// ---------------------------------------------------------------------------

/// Polarity of a drawn card.
///
/// Persisted with the labels used by the catalog data (`"正位"` / `"逆位"`);
/// the English names are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// The card is drawn upright.
    #[serde(rename = "正位", alias = "upright", alias = "Upright")]
    Upright,
    /// The card is drawn reversed.
    #[serde(rename = "逆位", alias = "reversed", alias = "Reversed")]
    Reversed,
}

impl Direction {
    /// Returns the persisted label for this direction.
    pub fn label(self) -> &'static str {
        match self {
            Direction::Upright => "正位",
            Direction::Reversed => "逆位",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a string is not a recognised [`Direction`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown card direction '{0}' (expected 正位/逆位 or upright/reversed)")]
pub struct ParseDirectionError(pub String);

impl std::str::FromStr for Direction {
    type Err = ParseDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "正位" => Ok(Direction::Upright),
            "逆位" => Ok(Direction::Reversed),
            other if other.eq_ignore_ascii_case("upright") => Ok(Direction::Upright),
            other if other.eq_ignore_ascii_case("reversed") => Ok(Direction::Reversed),
            other => Err(ParseDirectionError(other.to_string())),
        }
    }
}

/// Immutable identity of a card within the catalog: name plus direction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CardKey {
    /// Card name.
    pub name: CardName,
    /// Card polarity.
    pub direction: Direction,
}

impl CardKey {
    /// Creates a new [`CardKey`].
    pub fn new(name: CardName, direction: Direction) -> Self {
        Self { name, direction }
    }
}

impl std::fmt::Display for CardKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.direction)
    }
}

// ---------------------------------------------------------------------------
// Catalog entries
// ---------------------------------------------------------------------------

/// A card interpretation entry from the catalog.
///
/// `summary` and `detail` only feed the prompt; identity is [`Card::key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Card name.
    #[serde(rename = "card_name")]
    pub name: CardName,
    /// Card polarity.
    pub direction: Direction,
    /// Short base meaning.
    #[serde(default)]
    pub summary: String,
    /// Long-form meaning.
    #[serde(default)]
    pub detail: String,
}

impl Card {
    /// Returns the identity of this card.
    pub fn key(&self) -> CardKey {
        CardKey::new(self.name.clone(), self.direction)
    }
}

/// An interpretive dimension from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    /// Unique dimension name.
    pub name: DimensionName,
    /// Grouping category (e.g. `"情感"`).
    pub category: String,
    /// What the dimension asks about.
    #[serde(default)]
    pub description: String,
    /// Optional sub-aspect label.
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub aspect: Option<String>,
    /// Optional ordinal ordering related dimensions (e.g. 1..3 for
    /// past → present → future).
    #[serde(default, deserialize_with = "deserialize_aspect_type")]
    pub aspect_type: Option<u32>,
}

// ---------------------------------------------------------------------------
// Work and results
// ---------------------------------------------------------------------------

/// One unit of required generation: a card under a dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    /// The card to interpret.
    pub card: CardKey,
    /// The dimension to interpret it under.
    pub dimension: DimensionName,
}

impl std::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} × {}", self.card, self.dimension)
    }
}

/// Deduplication key of a [`GenerationRecord`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    /// Card name.
    pub card_name: CardName,
    /// Card polarity.
    pub direction: Direction,
    /// Dimension name.
    pub dimension_name: DimensionName,
}

/// A completed unit of work as persisted in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// Card name.
    pub card_name: CardName,
    /// Card polarity.
    pub direction: Direction,
    /// Dimension the content was generated for.
    pub dimension_name: DimensionName,
    /// Category copied from the dimension at generation time.
    pub dimension_category: String,
    /// Aspect copied from the dimension at generation time.
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub aspect: Option<String>,
    /// Ordinal copied from the dimension at generation time.
    #[serde(default, deserialize_with = "deserialize_aspect_type")]
    pub aspect_type: Option<u32>,
    /// Generated text.
    pub content: String,
}

impl GenerationRecord {
    /// Builds a record for `card` under `dimension` with the given content.
    pub fn new(card: &Card, dimension: &Dimension, content: impl Into<String>) -> Self {
        Self {
            card_name: card.name.clone(),
            direction: card.direction,
            dimension_name: dimension.name.clone(),
            dimension_category: dimension.category.clone(),
            aspect: dimension.aspect.clone(),
            aspect_type: dimension.aspect_type,
            content: content.into(),
        }
    }

    /// Returns the deduplication key of this record.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            card_name: self.card_name.clone(),
            direction: self.direction,
            dimension_name: self.dimension_name.clone(),
        }
    }

    /// Returns the identity of the card this record belongs to.
    pub fn card_key(&self) -> CardKey {
        CardKey::new(self.card_name.clone(), self.direction)
    }
}

/// A work item that exhausted its attempts, kept in the ledger until a later
/// run produces its record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Card name.
    pub card_name: CardName,
    /// Card polarity.
    pub direction: Direction,
    /// Dimension that could not be generated.
    pub dimension_name: DimensionName,
    /// Attempts made before giving up.
    pub attempts: u32,
    /// The error from the final attempt.
    pub error: String,
    /// When the item gave up.
    pub failed_at: Timestamp,
}

impl FailureRecord {
    /// Returns the key of the record this failure stands in for.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            card_name: self.card_name.clone(),
            direction: self.direction,
            dimension_name: self.dimension_name.clone(),
        }
    }
}

impl From<&ItemFailure> for FailureRecord {
    fn from(failure: &ItemFailure) -> Self {
        Self {
            card_name: failure.item.card.name.clone(),
            direction: failure.item.card.direction,
            dimension_name: failure.item.dimension.clone(),
            attempts: failure.attempts,
            error: failure.last_error.to_string(),
            failed_at: Timestamp::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------

/// Accepts an integer, a numeric string, `""` or `null`.
///
/// Older ledgers wrote `""` when a dimension had no ordinal.
fn deserialize_aspect_type<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u32),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(v)) => Ok(Some(v)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid aspect_type '{s}'"))),
    }
}

/// Maps `""` and `null` to `None`.
fn deserialize_optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_parses_both_label_sets() {
        assert_eq!("正位".parse::<Direction>().unwrap(), Direction::Upright);
        assert_eq!("Reversed".parse::<Direction>().unwrap(), Direction::Reversed);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn record_accepts_legacy_empty_aspect_fields() {
        let json = r#"{
            "card_name": "愚者",
            "direction": "正位",
            "dimension_name": "事业",
            "dimension_category": "工作",
            "aspect": "",
            "aspect_type": "",
            "content": "新的开始"
        }"#;
        let record: GenerationRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.aspect, None);
        assert_eq!(record.aspect_type, None);
    }

    #[test]
    fn record_accepts_numeric_string_aspect_type() {
        let json = r#"{
            "card_name": "愚者",
            "direction": "upright",
            "dimension_name": "感情-过去",
            "dimension_category": "感情",
            "aspect": "过去",
            "aspect_type": "1",
            "content": "x"
        }"#;
        let record: GenerationRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.direction, Direction::Upright);
        assert_eq!(record.aspect_type, Some(1));
        assert_eq!(record.aspect.as_deref(), Some("过去"));
    }

    #[test]
    fn record_key_ignores_content() {
        let card = Card {
            name: CardName::new("魔术师").unwrap(),
            direction: Direction::Reversed,
            summary: String::new(),
            detail: String::new(),
        };
        let dimension = Dimension {
            name: DimensionName::new("健康").unwrap(),
            category: "身体".into(),
            description: String::new(),
            aspect: None,
            aspect_type: None,
        };
        let a = GenerationRecord::new(&card, &dimension, "one");
        let b = GenerationRecord::new(&card, &dimension, "two");
        assert_eq!(a.key(), b.key());
    }
}
