use crate::error::AnalyticsError;
use crate::report::{GroupTally, MatchupTally, StatsReport, Tally, UNKNOWN_OPPONENT};
use core_types::MatchResult;
use std::collections::BTreeMap;

/// A stateless calculator for deriving win-rate statistics from match results.
#[derive(Debug, Default)]
pub struct ReportEngine {}

impl ReportEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregates `results` into a `StatsReport`.
    ///
    /// The caller selects the results (date range, deck, ...); every grouping
    /// is computed over the same slice. Groups are ordered by total descending,
    /// then by name.
    pub fn calculate(&self, results: &[MatchResult]) -> Result<StatsReport, AnalyticsError> {
        let mut report = StatsReport::new();
        if results.is_empty() {
            return Ok(report);
        }

        let mut by_deck: BTreeMap<&str, Tally> = BTreeMap::new();
        let mut by_opponent: BTreeMap<&str, Tally> = BTreeMap::new();
        let mut by_order: BTreeMap<&str, Tally> = BTreeMap::new();
        let mut by_matchup: BTreeMap<(&str, &str), Tally> = BTreeMap::new();

        for result in results {
            let opponent = result
                .opponent_deck_name
                .as_deref()
                .unwrap_or(UNKNOWN_OPPONENT);

            report.overall.record(result.outcome);
            by_deck
                .entry(result.deck_name.as_str())
                .or_default()
                .record(result.outcome);
            by_opponent.entry(opponent).or_default().record(result.outcome);
            by_order
                .entry(result.play_order.as_str())
                .or_default()
                .record(result.outcome);
            by_matchup
                .entry((result.deck_name.as_str(), opponent))
                .or_default()
                .record(result.outcome);

            report.first_played_on = Some(match report.first_played_on {
                Some(first) => first.min(result.played_on),
                None => result.played_on,
            });
            report.last_played_on = Some(match report.last_played_on {
                Some(last) => last.max(result.played_on),
                None => result.played_on,
            });
        }

        finish(&mut report.overall, "overall")?;
        report.by_deck = groups(by_deck)?;
        report.by_opponent_deck = groups(by_opponent)?;
        report.by_play_order = groups(by_order)?;

        let mut matchups = Vec::with_capacity(by_matchup.len());
        for ((deck, opponent_deck), mut tally) in by_matchup {
            finish(&mut tally, "matchup")?;
            matchups.push(MatchupTally {
                deck: deck.to_string(),
                opponent_deck: opponent_deck.to_string(),
                tally,
            });
        }
        // Stable sort keeps the map's name order among equal totals.
        matchups.sort_by(|a, b| b.tally.total.cmp(&a.tally.total));
        report.by_matchup = matchups;

        tracing::debug!(
            results = results.len(),
            decks = report.by_deck.len(),
            "Statistics report calculated."
        );
        Ok(report)
    }
}

fn finish(tally: &mut Tally, metric: &str) -> Result<(), AnalyticsError> {
    tally
        .finish()
        .ok_or_else(|| AnalyticsError::Calculation(format!("{metric} win rate")))
}

fn groups(map: BTreeMap<&str, Tally>) -> Result<Vec<GroupTally>, AnalyticsError> {
    let mut groups = Vec::with_capacity(map.len());
    for (name, mut tally) in map {
        finish(&mut tally, name)?;
        groups.push(GroupTally {
            name: name.to_string(),
            tally,
        });
    }
    groups.sort_by(|a, b| b.tally.total.cmp(&a.tally.total));
    Ok(groups)
}
