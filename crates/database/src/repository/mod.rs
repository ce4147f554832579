use crate::connection::Database;
use crate::error::DbError;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::str::FromStr;
use std::sync::Arc;

mod decks;
mod import;
mod results;
mod users;

pub use import::{ImportBatch, ImportCounters, ImportedDeck, ImportedResult, UNSPECIFIED_DECK};

/// The `DbRepository` provides a high-level, application-specific interface
/// to the database. It encapsulates all SQL queries and data access logic.
///
/// Every method that touches decks or results takes the owning user's id;
/// rows belonging to other users behave as if they did not exist.
#[derive(Debug, Clone)]
pub struct DbRepository {
    db: Arc<Database>,
}

impl DbRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// The shared connection handle, e.g. for the backup service.
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}

// --- Column encoding shared by the repository modules ---

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn now_text() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn date_text(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| DbError::InvalidData(format!("bad date '{raw}': {e}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::InvalidData(format!("bad timestamp '{raw}': {e}")))
}

pub(crate) fn parse_enum<T: FromStr>(column: &str, raw: &str) -> Result<T, DbError> {
    raw.parse::<T>()
        .map_err(|_| DbError::InvalidData(format!("unexpected {column} value '{raw}'")))
}

pub(crate) fn flag(value: bool) -> i64 {
    i64::from(value)
}
