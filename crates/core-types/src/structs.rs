use crate::enums::{DeckSide, Outcome, PlayOrder, SortDirection, SortKey};
use crate::error::CoreError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Listings return at most this many rows unless the caller asks otherwise.
pub const DEFAULT_RESULT_LIMIT: u32 = 2000;

/// Longest deck name accepted by the master data screens.
pub const MAX_DECK_NAME_LEN: usize = 100;

/// An authenticated identity. The password hash never leaves the database crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// An entry in one of a user's two deck reference lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    pub id: i64,
    pub user_id: i64,
    pub side: DeckSide,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deck {
    /// Trims a user supplied deck name and rejects empty or oversized names.
    pub fn normalize_name(raw: &str) -> Result<String, CoreError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(CoreError::InvalidInput(
                "deck name".to_string(),
                "name must not be empty".to_string(),
            ));
        }
        if name.chars().count() > MAX_DECK_NAME_LEN {
            return Err(CoreError::InvalidInput(
                "deck name".to_string(),
                format!("name must be at most {MAX_DECK_NAME_LEN} characters"),
            ));
        }
        Ok(name.to_string())
    }
}

/// A stored match result together with the names of the decks it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: i64,
    pub user_id: i64,
    pub played_on: NaiveDate,
    pub deck_id: i64,
    pub deck_name: String,
    pub opponent_deck_id: Option<i64>,
    pub opponent_deck_name: Option<String>,
    pub play_order: PlayOrder,
    pub outcome: Outcome,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The fields a user supplies when recording a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMatchResult {
    pub played_on: NaiveDate,
    pub deck_id: i64,
    #[serde(default)]
    pub opponent_deck_id: Option<i64>,
    #[serde(default)]
    pub play_order: PlayOrder,
    pub outcome: Outcome,
    #[serde(default)]
    pub note: String,
}

/// A partial update of a stored match. `None` leaves a field untouched;
/// `opponent_deck_id: Some(None)` clears the opponent deck.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchUpdate {
    #[serde(default)]
    pub played_on: Option<NaiveDate>,
    #[serde(default)]
    pub deck_id: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub opponent_deck_id: Option<Option<i64>>,
    #[serde(default)]
    pub play_order: Option<PlayOrder>,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub note: Option<String>,
}

impl MatchUpdate {
    pub fn is_empty(&self) -> bool {
        self == &MatchUpdate::default()
    }
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Selection, search and ordering for result listings and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultFilter {
    /// Inclusive lower bound on `played_on`.
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on `played_on`.
    pub date_to: Option<NaiveDate>,
    pub deck_id: Option<i64>,
    pub opponent_deck_id: Option<i64>,
    pub play_order: Option<PlayOrder>,
    pub outcome: Option<Outcome>,
    /// Case-insensitive substring matched against the note and both deck names.
    pub keyword: Option<String>,
    pub sort: SortKey,
    pub direction: SortDirection,
    pub limit: Option<u32>,
}

impl Default for ResultFilter {
    fn default() -> Self {
        Self {
            date_from: None,
            date_to: None,
            deck_id: None,
            opponent_deck_id: None,
            play_order: None,
            outcome: None,
            keyword: None,
            sort: SortKey::default(),
            direction: SortDirection::default(),
            limit: Some(DEFAULT_RESULT_LIMIT),
        }
    }
}

impl ResultFilter {
    /// A filter with no row limit, used by reports and exports.
    pub fn unbounded() -> Self {
        Self {
            limit: None,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(CoreError::InvalidInput(
                    "date range".to_string(),
                    format!("{from} is after {to}"),
                ));
            }
        }
        Ok(())
    }
}
