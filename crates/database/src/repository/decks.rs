use super::{DbRepository, flag, now_text, parse_enum, parse_timestamp};
use crate::error::{DbError, conflict_on_unique};
use core_types::{Deck, DeckSide};
use sqlx::Row;
use sqlx::AnyConnection;
use sqlx::any::AnyRow;

const DECK_COLUMNS: &str = "id, user_id, side, name, is_active, created_at, updated_at";

fn deck_from_row(row: &AnyRow) -> Result<Deck, DbError> {
    Ok(Deck {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        side: parse_enum("side", &row.try_get::<String, _>("side")?)?,
        name: row.try_get("name")?,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn duplicate(side: DeckSide, name: &str) -> impl FnOnce() -> String {
    let name = name.to_string();
    move || format!("a {side} deck named '{name}' already exists")
}

/// Loads one deck of `user_id` on `side` through an open connection.
pub(crate) async fn fetch_deck(
    conn: &mut AnyConnection,
    user_id: i64,
    side: DeckSide,
    id: i64,
) -> Result<Option<Deck>, DbError> {
    let row = sqlx::query(&format!(
        "SELECT {DECK_COLUMNS} FROM decks WHERE id = $1 AND user_id = $2 AND side = $3"
    ))
    .bind(id)
    .bind(user_id)
    .bind(side.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(deck_from_row).transpose()
}

/// Finds a deck by exact name, creating it when absent.
///
/// An existing deck gets its enabled flag overwritten when `set_active` is
/// given. Returns the deck id and whether it was newly created.
pub(crate) async fn upsert_deck(
    conn: &mut AnyConnection,
    user_id: i64,
    side: DeckSide,
    name: &str,
    set_active: Option<bool>,
) -> Result<(i64, bool), DbError> {
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM decks WHERE user_id = $1 AND side = $2 AND name = $3",
    )
    .bind(user_id)
    .bind(side.as_str())
    .bind(name.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(id) = existing {
        if let Some(active) = set_active {
            sqlx::query("UPDATE decks SET is_active = $1, updated_at = $2 WHERE id = $3")
                .bind(flag(active))
                .bind(now_text())
                .bind(id)
                .execute(&mut *conn)
                .await?;
        }
        return Ok((id, false));
    }

    let now = now_text();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO decks (user_id, side, name, is_active, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
    )
    .bind(user_id)
    .bind(side.as_str())
    .bind(name.to_string())
    .bind(flag(set_active.unwrap_or(true)))
    .bind(now.clone())
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| conflict_on_unique(e, duplicate(side, name)))?;
    Ok((id, true))
}

impl DbRepository {
    pub async fn create_deck(&self, user_id: i64, side: DeckSide, name: &str) -> Result<Deck, DbError> {
        let name = Deck::normalize_name(name)?;
        let now = now_text();
        let pool = self.db.pool().await;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO decks (user_id, side, name, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(user_id)
        .bind(side.as_str())
        .bind(name.clone())
        .bind(flag(true))
        .bind(now.clone())
        .bind(now)
        .fetch_one(&*pool)
        .await
        .map_err(|e| conflict_on_unique(e, duplicate(side, &name)))?;
        drop(pool);

        tracing::debug!(user_id, deck_id = id, %side, %name, "Deck created.");
        self.get_deck(user_id, side, id).await
    }

    /// Lists the decks of one side, enabled decks first, then by name.
    pub async fn list_decks(
        &self,
        user_id: i64,
        side: DeckSide,
        only_active: bool,
    ) -> Result<Vec<Deck>, DbError> {
        let mut sql = format!("SELECT {DECK_COLUMNS} FROM decks WHERE user_id = $1 AND side = $2");
        if only_active {
            sql.push_str(" AND is_active = 1");
        }
        sql.push_str(" ORDER BY is_active DESC, name ASC, id ASC");

        let pool = self.db.pool().await;
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(side.as_str())
            .fetch_all(&*pool)
            .await?;
        rows.iter().map(deck_from_row).collect()
    }

    pub async fn get_deck(&self, user_id: i64, side: DeckSide, id: i64) -> Result<Deck, DbError> {
        let pool = self.db.pool().await;
        let mut conn = pool.acquire().await?;
        fetch_deck(&mut conn, user_id, side, id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("{side} deck {id}")))
    }

    pub async fn rename_deck(
        &self,
        user_id: i64,
        side: DeckSide,
        id: i64,
        name: &str,
    ) -> Result<Deck, DbError> {
        let name = Deck::normalize_name(name)?;
        let pool = self.db.pool().await;
        let affected = sqlx::query(
            "UPDATE decks SET name = $1, updated_at = $2 WHERE id = $3 AND user_id = $4 AND side = $5",
        )
        .bind(name.clone())
        .bind(now_text())
        .bind(id)
        .bind(user_id)
        .bind(side.as_str())
        .execute(&*pool)
        .await
        .map_err(|e| conflict_on_unique(e, duplicate(side, &name)))?
        .rows_affected();
        drop(pool);

        if affected == 0 {
            return Err(DbError::NotFound(format!("{side} deck {id}")));
        }
        self.get_deck(user_id, side, id).await
    }

    /// Enables or disables a deck. Results referencing it are left untouched.
    pub async fn set_deck_active(
        &self,
        user_id: i64,
        side: DeckSide,
        id: i64,
        active: bool,
    ) -> Result<Deck, DbError> {
        let pool = self.db.pool().await;
        let affected = sqlx::query(
            "UPDATE decks SET is_active = $1, updated_at = $2 WHERE id = $3 AND user_id = $4 AND side = $5",
        )
        .bind(flag(active))
        .bind(now_text())
        .bind(id)
        .bind(user_id)
        .bind(side.as_str())
        .execute(&*pool)
        .await?
        .rows_affected();
        drop(pool);

        if affected == 0 {
            return Err(DbError::NotFound(format!("{side} deck {id}")));
        }
        self.get_deck(user_id, side, id).await
    }

    /// Deletes an unreferenced deck. Returns the number of rows removed.
    ///
    /// A deck still used by any result is refused with `Conflict`; disable it
    /// instead.
    pub async fn delete_deck(&self, user_id: i64, side: DeckSide, id: i64) -> Result<u64, DbError> {
        let pool = self.db.pool().await;
        let mut tx = pool.begin().await?;

        let column = match side {
            DeckSide::Own => "deck_id",
            DeckSide::Opponent => "opponent_deck_id",
        };
        let references: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM match_results WHERE user_id = $1 AND {column} = $2"
        ))
        .bind(user_id)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if references > 0 {
            return Err(DbError::Conflict(format!(
                "{side} deck {id} is used by {references} result(s); disable it instead"
            )));
        }

        let removed = sqlx::query("DELETE FROM decks WHERE id = $1 AND user_id = $2 AND side = $3")
            .bind(id)
            .bind(user_id)
            .bind(side.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        tracing::debug!(user_id, deck_id = id, %side, removed, "Deck deleted.");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::DbError;
    use crate::repository::test_support::{repository, user};
    use chrono::NaiveDate;
    use core_types::{DeckSide, NewMatchResult, Outcome, PlayOrder};

    #[tokio::test]
    async fn create_and_list_orders_enabled_first() {
        let (repo, _dir) = repository().await;
        let alice = user(&repo, "alice").await;

        let zoo = repo.create_deck(alice.id, DeckSide::Own, " Zoo ").await.unwrap();
        assert_eq!(zoo.name, "Zoo");
        let burn = repo.create_deck(alice.id, DeckSide::Own, "Burn").await.unwrap();
        repo.create_deck(alice.id, DeckSide::Opponent, "Control").await.unwrap();
        repo.set_deck_active(alice.id, DeckSide::Own, burn.id, false).await.unwrap();

        let all = repo.list_decks(alice.id, DeckSide::Own, false).await.unwrap();
        let names: Vec<_> = all.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["Zoo", "Burn"]);

        let active = repo.list_decks(alice.id, DeckSide::Own, true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, zoo.id);
    }

    #[tokio::test]
    async fn names_are_unique_per_side_only() {
        let (repo, _dir) = repository().await;
        let alice = user(&repo, "alice").await;
        let bob = user(&repo, "bob").await;

        repo.create_deck(alice.id, DeckSide::Own, "Burn").await.unwrap();
        repo.create_deck(alice.id, DeckSide::Opponent, "Burn").await.unwrap();
        repo.create_deck(bob.id, DeckSide::Own, "Burn").await.unwrap();
        let err = repo.create_deck(alice.id, DeckSide::Own, "Burn").await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)), "{err}");
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let (repo, _dir) = repository().await;
        let alice = user(&repo, "alice").await;
        let err = repo.create_deck(alice.id, DeckSide::Own, "   ").await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn rename_and_lookup_are_scoped_to_owner_and_side() {
        let (repo, _dir) = repository().await;
        let alice = user(&repo, "alice").await;
        let bob = user(&repo, "bob").await;
        let deck = repo.create_deck(alice.id, DeckSide::Own, "Burn").await.unwrap();

        let renamed = repo
            .rename_deck(alice.id, DeckSide::Own, deck.id, "Mono Red")
            .await
            .unwrap();
        assert_eq!(renamed.name, "Mono Red");

        assert!(matches!(
            repo.get_deck(bob.id, DeckSide::Own, deck.id).await,
            Err(DbError::NotFound(_))
        ));
        assert!(matches!(
            repo.get_deck(alice.id, DeckSide::Opponent, deck.id).await,
            Err(DbError::NotFound(_))
        ));
        assert!(matches!(
            repo.rename_deck(bob.id, DeckSide::Own, deck.id, "Stolen").await,
            Err(DbError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn referenced_deck_cannot_be_deleted() {
        let (repo, _dir) = repository().await;
        let alice = user(&repo, "alice").await;
        let own = repo.create_deck(alice.id, DeckSide::Own, "Burn").await.unwrap();
        let spare = repo.create_deck(alice.id, DeckSide::Own, "Spare").await.unwrap();
        repo.create_result(
            alice.id,
            NewMatchResult {
                played_on: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                deck_id: own.id,
                opponent_deck_id: None,
                play_order: PlayOrder::First,
                outcome: Outcome::Win,
                note: String::new(),
            },
        )
        .await
        .unwrap();

        let err = repo.delete_deck(alice.id, DeckSide::Own, own.id).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
        assert_eq!(repo.delete_deck(alice.id, DeckSide::Own, spare.id).await.unwrap(), 1);
        assert_eq!(repo.delete_deck(alice.id, DeckSide::Own, spare.id).await.unwrap(), 0);
    }
}
