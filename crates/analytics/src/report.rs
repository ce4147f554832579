use chrono::NaiveDate;
use core_types::Outcome;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Decimal places kept in a reported win rate.
pub const WIN_RATE_DP: u32 = 4;

/// Label under which results without an opponent deck are grouped.
pub const UNKNOWN_OPPONENT: &str = "(unknown)";

/// Win/loss/draw counts of a set of results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub total: u64,
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
    /// `wins / total`, rounded to [`WIN_RATE_DP`] places; zero for an empty set.
    pub win_rate: Decimal,
}

impl Tally {
    pub fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Draw => self.draws += 1,
        }
    }

    /// Recomputes `win_rate` from the counters.
    pub(crate) fn finish(&mut self) -> Option<()> {
        self.win_rate = if self.total == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.wins)
                .checked_div(Decimal::from(self.total))?
                .round_dp_with_strategy(WIN_RATE_DP, RoundingStrategy::MidpointAwayFromZero)
        };
        Some(())
    }

    /// Win rate as a percentage with two decimals, e.g. `66.67`.
    pub fn win_rate_pct(&self) -> Decimal {
        (self.win_rate * Decimal::ONE_HUNDRED).round_dp(2)
    }
}

/// The tally of one group, e.g. one own deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupTally {
    pub name: String,
    #[serde(flatten)]
    pub tally: Tally,
}

/// The tally of one own deck against one opponent deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchupTally {
    pub deck: String,
    pub opponent_deck: String,
    #[serde(flatten)]
    pub tally: Tally,
}

/// Aggregated statistics over a filtered set of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    /// Earliest and latest match date in the input, if any.
    pub first_played_on: Option<NaiveDate>,
    pub last_played_on: Option<NaiveDate>,

    pub overall: Tally,
    pub by_deck: Vec<GroupTally>,
    pub by_opponent_deck: Vec<GroupTally>,
    pub by_play_order: Vec<GroupTally>,
    pub by_matchup: Vec<MatchupTally>,
}

impl StatsReport {
    /// Creates an empty report, the result for an empty input.
    pub fn new() -> Self {
        Self {
            first_played_on: None,
            last_played_on: None,
            overall: Tally::default(),
            by_deck: Vec::new(),
            by_opponent_deck: Vec::new(),
            by_play_order: Vec::new(),
            by_matchup: Vec::new(),
        }
    }
}

impl Default for StatsReport {
    fn default() -> Self {
        Self::new()
    }
}
