//! Human-readable output of the CLI. `--json` bypasses all of this.

use analytics::{GroupTally, MatchupTally, StatsReport, Tally};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use core_types::{Deck, MatchResult, User};
use serde::Serialize;

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

pub fn json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn users(users: &[User]) {
    let mut t = table(&["ID", "Username", "Active", "Created"]);
    for user in users {
        t.add_row(vec![
            user.id.to_string(),
            user.username.clone(),
            yes_no(user.is_active).to_string(),
            user.created_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }
    println!("{t}");
}

pub fn decks(decks: &[Deck]) {
    let mut t = table(&["ID", "Side", "Name", "Active"]);
    for deck in decks {
        t.add_row(vec![
            deck.id.to_string(),
            deck.side.to_string(),
            deck.name.clone(),
            yes_no(deck.is_active).to_string(),
        ]);
    }
    println!("{t}");
}

pub fn results(results: &[MatchResult]) {
    let mut t = table(&["ID", "Date", "Deck", "Opponent", "Order", "Result", "Note"]);
    for r in results {
        t.add_row(vec![
            r.id.to_string(),
            r.played_on.to_string(),
            r.deck_name.clone(),
            r.opponent_deck_name.clone().unwrap_or_default(),
            r.play_order.to_string(),
            r.outcome.to_string(),
            r.note.clone(),
        ]);
    }
    println!("{t}");
    println!("{} result(s)", results.len());
}

fn tally_cells(tally: &Tally) -> Vec<String> {
    vec![
        tally.total.to_string(),
        tally.wins.to_string(),
        tally.losses.to_string(),
        tally.draws.to_string(),
        format!("{}%", tally.win_rate_pct()),
    ]
}

fn groups(title: &str, groups: &[GroupTally]) {
    if groups.is_empty() {
        return;
    }
    let mut t = table(&[title, "Games", "W", "L", "D", "Win rate"]);
    for group in groups {
        let mut row = vec![group.name.clone()];
        row.extend(tally_cells(&group.tally));
        t.add_row(row);
    }
    println!("{t}");
}

fn matchups(matchups: &[MatchupTally]) {
    if matchups.is_empty() {
        return;
    }
    let mut t = table(&["Deck", "Opponent", "Games", "W", "L", "D", "Win rate"]);
    for m in matchups {
        let mut row = vec![m.deck.clone(), m.opponent_deck.clone()];
        row.extend(tally_cells(&m.tally));
        t.add_row(row);
    }
    println!("{t}");
}

pub fn report(report: &StatsReport) {
    let overall = &report.overall;
    match (report.first_played_on, report.last_played_on) {
        (Some(first), Some(last)) => println!("Matches from {first} to {last}"),
        _ => println!("No matches recorded for this selection."),
    }
    println!(
        "Overall: {} games, {}W {}L {}D, win rate {}%",
        overall.total,
        overall.wins,
        overall.losses,
        overall.draws,
        overall.win_rate_pct()
    );
    groups("Deck", &report.by_deck);
    groups("Opponent deck", &report.by_opponent_deck);
    groups("Play order", &report.by_play_order);
    matchups(&report.by_matchup);
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}
