use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The result of a single match from the recording user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

impl Outcome {
    /// The value stored in the `outcome` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
            Outcome::Draw => "draw",
        }
    }
}

impl FromStr for Outcome {
    type Err = CoreError;

    /// Accepts the canonical names plus the marks used by older spreadsheet
    /// exports (`〇`, `×`, `両敗`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "win" | "w" | "〇" | "○" => Ok(Outcome::Win),
            "loss" | "lose" | "l" | "×" | "x" => Ok(Outcome::Loss),
            "draw" | "d" | "両敗" => Ok(Outcome::Draw),
            other => Err(CoreError::InvalidInput("outcome".to_string(), other.to_string())),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the recording user went first or second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayOrder {
    First,
    Second,
    #[default]
    Unknown,
}

impl PlayOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayOrder::First => "first",
            PlayOrder::Second => "second",
            PlayOrder::Unknown => "unknown",
        }
    }
}

impl FromStr for PlayOrder {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first" | "1st" | "先行" => Ok(PlayOrder::First),
            "second" | "2nd" | "後攻" => Ok(PlayOrder::Second),
            "" | "unknown" => Ok(PlayOrder::Unknown),
            other => Err(CoreError::InvalidInput("play order".to_string(), other.to_string())),
        }
    }
}

impl fmt::Display for PlayOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two reference lists a deck belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeckSide {
    /// Decks the user plays.
    Own,
    /// Decks the user plays against.
    Opponent,
}

impl DeckSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeckSide::Own => "own",
            DeckSide::Opponent => "opponent",
        }
    }
}

impl FromStr for DeckSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "own" | "mine" => Ok(DeckSide::Own),
            "opponent" | "opp" => Ok(DeckSide::Opponent),
            other => Err(CoreError::InvalidInput("deck side".to_string(), other.to_string())),
        }
    }
}

impl fmt::Display for DeckSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column a result listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Date,
    Id,
    Deck,
    OpponentDeck,
    PlayOrder,
    Outcome,
}

impl FromStr for SortKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "date" => Ok(SortKey::Date),
            "id" => Ok(SortKey::Id),
            "deck" | "used_deck" => Ok(SortKey::Deck),
            "opponent_deck" | "opponent" => Ok(SortKey::OpponentDeck),
            "play_order" => Ok(SortKey::PlayOrder),
            "outcome" | "match_result" => Ok(SortKey::Outcome),
            other => Err(CoreError::InvalidInput("sort key".to_string(), other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            other => Err(CoreError::InvalidInput("sort direction".to_string(), other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_parses_canonical_and_legacy_marks() {
        assert_eq!("win".parse::<Outcome>().unwrap(), Outcome::Win);
        assert_eq!(" LOSS ".parse::<Outcome>().unwrap(), Outcome::Loss);
        assert_eq!("〇".parse::<Outcome>().unwrap(), Outcome::Win);
        assert_eq!("×".parse::<Outcome>().unwrap(), Outcome::Loss);
        assert_eq!("両敗".parse::<Outcome>().unwrap(), Outcome::Draw);
        assert!("maybe".parse::<Outcome>().is_err());
    }

    #[test]
    fn outcome_round_trips_through_column_value() {
        for outcome in [Outcome::Win, Outcome::Loss, Outcome::Draw] {
            assert_eq!(outcome.as_str().parse::<Outcome>().unwrap(), outcome);
        }
    }

    #[test]
    fn empty_play_order_means_unknown() {
        assert_eq!("".parse::<PlayOrder>().unwrap(), PlayOrder::Unknown);
        assert_eq!("先行".parse::<PlayOrder>().unwrap(), PlayOrder::First);
        assert_eq!("後攻".parse::<PlayOrder>().unwrap(), PlayOrder::Second);
    }

    #[test]
    fn sort_key_accepts_legacy_column_names() {
        assert_eq!("used_deck".parse::<SortKey>().unwrap(), SortKey::Deck);
        assert_eq!("match-result".parse::<SortKey>().unwrap(), SortKey::Outcome);
        assert_eq!(SortKey::default(), SortKey::Date);
        assert_eq!(SortDirection::default(), SortDirection::Desc);
    }

    #[test]
    fn enums_serialize_as_snake_case() {
        assert_eq!(serde_json::to_string(&DeckSide::Opponent).unwrap(), "\"opponent\"");
        assert_eq!(serde_json::to_string(&SortKey::OpponentDeck).unwrap(), "\"opponent_deck\"");
    }
}
