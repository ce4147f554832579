use super::decks::upsert_deck;
use super::{DbRepository, date_text, now_text};
use crate::error::DbError;
use chrono::NaiveDate;
use core_types::{Deck, DeckSide, Outcome, PlayOrder};
use serde::Serialize;

/// Deck name used for imported results that do not name their own deck.
pub const UNSPECIFIED_DECK: &str = "(unspecified)";

/// A deck row of a user-data archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedDeck {
    pub name: String,
    pub is_active: bool,
}

/// A result row of a user-data archive; decks are referenced by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedResult {
    pub played_on: NaiveDate,
    pub deck_name: String,
    pub opponent_deck_name: Option<String>,
    pub play_order: PlayOrder,
    pub outcome: Outcome,
    pub note: String,
}

/// Everything read from one user-data archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportBatch {
    pub decks: Vec<ImportedDeck>,
    pub opponent_decks: Vec<ImportedDeck>,
    pub results: Vec<ImportedResult>,
}

/// Rows written by an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportCounters {
    pub decks: u64,
    pub opponent_decks: u64,
    pub results: u64,
}

impl DbRepository {
    /// Loads a user-data archive into the account of `user_id`.
    ///
    /// Runs in a single transaction. With `purge` the user's results and decks
    /// are removed first. Deck rows are matched by name and their enabled flag
    /// overwritten; results are always appended, creating referenced decks as
    /// needed.
    pub async fn import_user_data(
        &self,
        user_id: i64,
        batch: &ImportBatch,
        purge: bool,
    ) -> Result<ImportCounters, DbError> {
        let pool = self.db.pool().await;
        let mut tx = pool.begin().await?;

        if purge {
            let results = sqlx::query("DELETE FROM match_results WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            let decks = sqlx::query("DELETE FROM decks WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            tracing::info!(user_id, results, decks, "Purged user data before import.");
        }

        let mut counters = ImportCounters::default();
        for (side, rows, counter) in [
            (DeckSide::Own, &batch.decks, &mut counters.decks),
            (DeckSide::Opponent, &batch.opponent_decks, &mut counters.opponent_decks),
        ] {
            for row in rows {
                // Blank names carry no information; skip them.
                let Ok(name) = Deck::normalize_name(&row.name) else {
                    continue;
                };
                upsert_deck(&mut tx, user_id, side, &name, Some(row.is_active)).await?;
                *counter += 1;
            }
        }

        for row in &batch.results {
            let deck_name =
                Deck::normalize_name(&row.deck_name).unwrap_or_else(|_| UNSPECIFIED_DECK.to_string());
            let (deck_id, _) = upsert_deck(&mut tx, user_id, DeckSide::Own, &deck_name, None).await?;

            let opponent_deck_id = match row
                .opponent_deck_name
                .as_deref()
                .and_then(|name| Deck::normalize_name(name).ok())
            {
                Some(name) => Some(upsert_deck(&mut tx, user_id, DeckSide::Opponent, &name, None).await?.0),
                None => None,
            };

            let now = now_text();
            sqlx::query(
                "INSERT INTO match_results \
                 (user_id, played_on, deck_id, opponent_deck_id, play_order, outcome, note, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(user_id)
            .bind(date_text(row.played_on))
            .bind(deck_id)
            .bind(opponent_deck_id)
            .bind(row.play_order.as_str())
            .bind(row.outcome.as_str())
            .bind(row.note.clone())
            .bind(now.clone())
            .bind(now)
            .execute(&mut *tx)
            .await?;
            counters.results += 1;
        }

        tx.commit().await?;
        tracing::info!(
            user_id,
            decks = counters.decks,
            opponent_decks = counters.opponent_decks,
            results = counters.results,
            "User data imported."
        );
        Ok(counters)
    }
}
