//! Per-user data archive: the decks and results of one account as CSV files
//! inside a ZIP. Works with either store.
//!
//! ```text
//! decks.csv            name,is_active
//! opponent_decks.csv   name,is_active
//! results.csv          date,used_deck,opponent_deck,play_order,match_result,note
//! ```

use crate::archive::read_capped;
use crate::error::BackupError;
use chrono::{Local, NaiveDate};
use core_types::{DeckSide, Outcome, ResultFilter, SortDirection, SortKey};
use database::{DbRepository, ImportBatch, ImportCounters, ImportedDeck, ImportedResult};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const DECKS_FILE: &str = "decks.csv";
pub const OPPONENT_DECKS_FILE: &str = "opponent_decks.csv";
pub const RESULTS_FILE: &str = "results.csv";

/// Largest CSV file accepted from an uploaded archive.
pub const MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Serialize)]
struct DeckRecord<'a> {
    name: &'a str,
    is_active: bool,
}

#[derive(Debug, Serialize)]
struct ResultRecord<'a> {
    date: String,
    used_deck: &'a str,
    opponent_deck: &'a str,
    play_order: &'static str,
    match_result: &'static str,
    note: &'a str,
}

// Every column is optional on the way in; hand-edited files are common.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeckRow {
    name: String,
    is_active: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResultRow {
    date: String,
    used_deck: String,
    opponent_deck: String,
    play_order: String,
    match_result: String,
    note: String,
}

fn to_csv<T: Serialize>(records: impl IntoIterator<Item = T>) -> Result<Vec<u8>, BackupError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    writer.into_inner().map_err(|e| BackupError::Io(e.into_error()))
}

/// Builds the data archive of `user_id`.
pub async fn export_user_data(repo: &DbRepository, user_id: i64) -> Result<Vec<u8>, BackupError> {
    let decks = repo.list_decks(user_id, DeckSide::Own, false).await?;
    let opponent_decks = repo.list_decks(user_id, DeckSide::Opponent, false).await?;
    let results = repo
        .list_results(
            user_id,
            &ResultFilter {
                sort: SortKey::Date,
                direction: SortDirection::Asc,
                ..ResultFilter::unbounded()
            },
        )
        .await?;

    let deck_csv = |decks: &[core_types::Deck]| {
        to_csv(decks.iter().map(|d| DeckRecord {
            name: &d.name,
            is_active: d.is_active,
        }))
    };
    let files = [
        (DECKS_FILE, deck_csv(&decks)?),
        (OPPONENT_DECKS_FILE, deck_csv(&opponent_decks)?),
        (
            RESULTS_FILE,
            to_csv(results.iter().map(|r| ResultRecord {
                date: r.played_on.format("%Y-%m-%d").to_string(),
                used_deck: &r.deck_name,
                opponent_deck: r.opponent_deck_name.as_deref().unwrap_or(""),
                play_order: r.play_order.as_str(),
                match_result: r.outcome.as_str(),
                note: &r.note,
            }))?,
        ),
    ];

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in files {
        writer.start_file(name, options)?;
        writer.write_all(&bytes)?;
    }
    let archive = writer.finish()?.into_inner();

    tracing::info!(
        user_id,
        decks = decks.len(),
        opponent_decks = opponent_decks.len(),
        results = results.len(),
        "User data exported."
    );
    Ok(archive)
}

/// Reads a data archive and loads it into the account of `user_id`.
pub async fn import_user_data(
    repo: &DbRepository,
    user_id: i64,
    archive: &[u8],
    purge: bool,
) -> Result<ImportCounters, BackupError> {
    let batch = parse_user_data(archive, Local::now().date_naive())?;
    Ok(repo.import_user_data(user_id, &batch, purge).await?)
}

/// Parses a data archive. Rows with an unreadable date are dated `today`;
/// rows without a readable outcome count as wins.
pub fn parse_user_data(archive: &[u8], today: NaiveDate) -> Result<ImportBatch, BackupError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))
        .map_err(|e| BackupError::Validation(format!("corrupt ZIP archive: {e}")))?;

    let decks = read_entry(&mut zip, DECKS_FILE, MAX_ENTRY_BYTES)?;
    let opponent_decks = read_entry(&mut zip, OPPONENT_DECKS_FILE, MAX_ENTRY_BYTES)?;
    let results = read_entry(&mut zip, RESULTS_FILE, MAX_ENTRY_BYTES)?;
    if decks.is_none() && opponent_decks.is_none() && results.is_none() {
        return Err(BackupError::Validation(format!(
            "the archive contains none of {DECKS_FILE}, {OPPONENT_DECKS_FILE}, {RESULTS_FILE}"
        )));
    }

    let mut batch = ImportBatch::default();
    if let Some(text) = decks {
        batch.decks = parse_decks(&text, DECKS_FILE)?;
    }
    if let Some(text) = opponent_decks {
        batch.opponent_decks = parse_decks(&text, OPPONENT_DECKS_FILE)?;
    }
    if let Some(text) = results {
        batch.results = parse_results(&text, today)?;
    }
    Ok(batch)
}

/// Returns the text of the first entry whose file name is `file`, at any depth.
fn read_entry<R: Read + std::io::Seek>(
    zip: &mut ZipArchive<R>,
    file: &str,
    limit: u64,
) -> Result<Option<String>, BackupError> {
    let found = (0..zip.len()).find(|&i| {
        zip.name_for_index(i)
            .is_some_and(|name| name.rsplit('/').next() == Some(file))
    });
    let Some(index) = found else {
        return Ok(None);
    };

    let entry = zip
        .by_index(index)
        .map_err(|e| BackupError::Validation(format!("cannot open {file}: {e}")))?;
    let bytes = read_capped(entry, limit, file)?;
    let text = String::from_utf8(bytes)
        .map_err(|e| BackupError::Validation(format!("{file} is not readable UTF-8 text: {e}")))?;
    Ok(Some(text.trim_start_matches('\u{feff}').to_string()))
}

fn reader(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Fields)
        .from_reader(text.as_bytes())
}

/// Only an explicit yes enables a deck; blank or missing means inactive.
fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim(), "1" | "true" | "True" | "yes" | "on")
}

fn parse_decks(text: &str, file: &str) -> Result<Vec<ImportedDeck>, BackupError> {
    let mut decks = Vec::new();
    for (line, row) in reader(text).deserialize::<DeckRow>().enumerate() {
        let row = row.map_err(|e| BackupError::Validation(format!("{file} row {}: {e}", line + 2)))?;
        decks.push(ImportedDeck {
            name: row.name,
            is_active: parse_flag(&row.is_active),
        });
    }
    Ok(decks)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    ["%Y-%m-%d", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw.trim(), fmt).ok())
}

fn parse_results(text: &str, today: NaiveDate) -> Result<Vec<ImportedResult>, BackupError> {
    let mut results = Vec::new();
    for (line, row) in reader(text).deserialize::<ResultRow>().enumerate() {
        let row = row.map_err(|e| {
            BackupError::Validation(format!("{RESULTS_FILE} row {}: {e}", line + 2))
        })?;
        let opponent = row.opponent_deck.trim();
        let outcome = match row.match_result.trim() {
            "" => Outcome::Win,
            raw => raw.parse().map_err(|_| {
                BackupError::Validation(format!(
                    "{RESULTS_FILE} row {}: unknown match result '{raw}'",
                    line + 2
                ))
            })?,
        };
        results.push(ImportedResult {
            played_on: parse_date(&row.date).unwrap_or(today),
            deck_name: row.used_deck,
            opponent_deck_name: (!opponent.is_empty()).then(|| opponent.to_string()),
            play_order: row.play_order.parse().unwrap_or_default(),
            outcome,
            note: row.note,
        });
    }
    Ok(results)
}
