use super::decks::fetch_deck;
use super::{DbRepository, date_text, now_text, parse_date, parse_enum, parse_timestamp};
use crate::error::DbError;
use crate::query::{SqlBuilder, bind_all};
use core_types::{DeckSide, MatchResult, MatchUpdate, NewMatchResult, ResultFilter, SortKey};
use sqlx::Row;
use sqlx::AnyConnection;
use sqlx::any::AnyRow;

const RESULT_COLUMNS: &[&str] = &[
    "r.id",
    "r.user_id",
    "r.played_on",
    "r.deck_id",
    "d.name AS deck_name",
    "r.opponent_deck_id",
    "o.name AS opponent_deck_name",
    "r.play_order",
    "r.outcome",
    "r.note",
    "r.created_at",
    "r.updated_at",
];

fn base_query(user_id: i64) -> SqlBuilder {
    let mut builder = SqlBuilder::new("match_results r");
    builder
        .select(RESULT_COLUMNS)
        .join("JOIN decks d ON d.id = r.deck_id")
        .join("LEFT JOIN decks o ON o.id = r.opponent_deck_id")
        .where_eq("r.user_id", user_id);
    builder
}

fn sort_expression(key: SortKey) -> &'static str {
    match key {
        SortKey::Date => "r.played_on",
        SortKey::Id => "r.id",
        SortKey::Deck => "d.name",
        SortKey::OpponentDeck => "COALESCE(o.name, '')",
        SortKey::PlayOrder => "r.play_order",
        SortKey::Outcome => "r.outcome",
    }
}

fn result_from_row(row: &AnyRow) -> Result<MatchResult, DbError> {
    Ok(MatchResult {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        played_on: parse_date(&row.try_get::<String, _>("played_on")?)?,
        deck_id: row.try_get("deck_id")?,
        deck_name: row.try_get("deck_name")?,
        opponent_deck_id: row.try_get("opponent_deck_id")?,
        opponent_deck_name: row.try_get("opponent_deck_name")?,
        play_order: parse_enum("play_order", &row.try_get::<String, _>("play_order")?)?,
        outcome: parse_enum("outcome", &row.try_get::<String, _>("outcome")?)?,
        note: row.try_get("note")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
    })
}

/// Ensures a deck a result is about to point at is usable.
///
/// The deck must belong to `user_id`, sit on `side` and be enabled.
async fn ensure_selectable(
    conn: &mut AnyConnection,
    user_id: i64,
    side: DeckSide,
    id: i64,
) -> Result<(), DbError> {
    match fetch_deck(conn, user_id, side, id).await? {
        None => Err(DbError::Validation(format!("unknown {side} deck {id}"))),
        Some(deck) if !deck.is_active => Err(DbError::Validation(format!(
            "{side} deck '{}' is disabled",
            deck.name
        ))),
        Some(_) => Ok(()),
    }
}

impl DbRepository {
    /// Stores a new result. The referenced decks must be enabled.
    pub async fn create_result(&self, user_id: i64, new: NewMatchResult) -> Result<MatchResult, DbError> {
        let pool = self.db.pool().await;
        let mut tx = pool.begin().await?;

        ensure_selectable(&mut tx, user_id, DeckSide::Own, new.deck_id).await?;
        if let Some(opponent) = new.opponent_deck_id {
            ensure_selectable(&mut tx, user_id, DeckSide::Opponent, opponent).await?;
        }

        let now = now_text();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO match_results \
             (user_id, played_on, deck_id, opponent_deck_id, play_order, outcome, note, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
        )
        .bind(user_id)
        .bind(date_text(new.played_on))
        .bind(new.deck_id)
        .bind(new.opponent_deck_id)
        .bind(new.play_order.as_str())
        .bind(new.outcome.as_str())
        .bind(new.note)
        .bind(now.clone())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        drop(pool);

        tracing::debug!(user_id, result_id = id, "Match result recorded.");
        self.get_result(user_id, id).await
    }

    /// Lists results matching `filter`, with the referenced deck names.
    pub async fn list_results(&self, user_id: i64, filter: &ResultFilter) -> Result<Vec<MatchResult>, DbError> {
        filter.validate()?;

        let mut builder = base_query(user_id);
        if let Some(from) = filter.date_from {
            builder.where_gte("r.played_on", date_text(from));
        }
        if let Some(to) = filter.date_to {
            builder.where_lte("r.played_on", date_text(to));
        }
        if let Some(deck_id) = filter.deck_id {
            builder.where_eq("r.deck_id", deck_id);
        }
        if let Some(opponent_deck_id) = filter.opponent_deck_id {
            builder.where_eq("r.opponent_deck_id", opponent_deck_id);
        }
        if let Some(play_order) = filter.play_order {
            builder.where_eq("r.play_order", play_order.as_str());
        }
        if let Some(outcome) = filter.outcome {
            builder.where_eq("r.outcome", outcome.as_str());
        }
        if let Some(keyword) = filter.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            builder.where_contains_any(&["r.note", "d.name", "COALESCE(o.name, '')"], keyword);
        }

        let direction = filter.direction.as_sql();
        let primary = format!("{} {direction}", sort_expression(filter.sort));
        if filter.sort == SortKey::Id {
            builder.order_by(&[primary.as_str()]);
        } else {
            let tiebreak = format!("r.id {direction}");
            builder.order_by(&[primary.as_str(), tiebreak.as_str()]);
        }
        if let Some(limit) = filter.limit {
            builder.limit(limit);
        }

        let (sql, params) = builder.build();
        let pool = self.db.pool().await;
        let rows = bind_all(sqlx::query(&sql), params).fetch_all(&*pool).await?;
        rows.iter().map(result_from_row).collect()
    }

    pub async fn get_result(&self, user_id: i64, id: i64) -> Result<MatchResult, DbError> {
        let (sql, params) = base_query(user_id).where_eq("r.id", id).build();
        let pool = self.db.pool().await;
        let row = bind_all(sqlx::query(&sql), params)
            .fetch_optional(&*pool)
            .await?;
        match row {
            Some(row) => result_from_row(&row),
            None => Err(DbError::NotFound(format!("result {id}"))),
        }
    }

    /// Applies the provided fields of `update`; untouched fields keep their
    /// value. A result may keep a deck that was disabled after it was
    /// recorded, but switching to a different deck requires it to be enabled.
    pub async fn update_result(
        &self,
        user_id: i64,
        id: i64,
        update: MatchUpdate,
    ) -> Result<MatchResult, DbError> {
        let current = self.get_result(user_id, id).await?;
        if update.is_empty() {
            return Ok(current);
        }

        let deck_id = update.deck_id.unwrap_or(current.deck_id);
        let opponent_deck_id = update.opponent_deck_id.unwrap_or(current.opponent_deck_id);

        let pool = self.db.pool().await;
        let mut tx = pool.begin().await?;
        if deck_id != current.deck_id {
            ensure_selectable(&mut tx, user_id, DeckSide::Own, deck_id).await?;
        }
        if let Some(opponent) = opponent_deck_id.filter(|o| Some(*o) != current.opponent_deck_id) {
            ensure_selectable(&mut tx, user_id, DeckSide::Opponent, opponent).await?;
        }

        let affected = sqlx::query(
            "UPDATE match_results SET played_on = $1, deck_id = $2, opponent_deck_id = $3, \
             play_order = $4, outcome = $5, note = $6, updated_at = $7 \
             WHERE id = $8 AND user_id = $9",
        )
        .bind(date_text(update.played_on.unwrap_or(current.played_on)))
        .bind(deck_id)
        .bind(opponent_deck_id)
        .bind(update.play_order.unwrap_or(current.play_order).as_str())
        .bind(update.outcome.unwrap_or(current.outcome).as_str())
        .bind(update.note.unwrap_or(current.note))
        .bind(now_text())
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;
        drop(pool);

        // Deleted concurrently between the read and the write.
        if affected == 0 {
            return Err(DbError::NotFound(format!("result {id}")));
        }
        tracing::debug!(user_id, result_id = id, "Match result updated.");
        self.get_result(user_id, id).await
    }

    /// Deletes one result. Returns 0 when it did not exist.
    pub async fn delete_result(&self, user_id: i64, id: i64) -> Result<u64, DbError> {
        self.delete_results(user_id, &[id]).await
    }

    /// Deletes several results at once and returns how many were removed.
    pub async fn delete_results(&self, user_id: i64, ids: &[i64]) -> Result<u64, DbError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let (sql, params) = SqlBuilder::new("match_results")
            .where_eq("user_id", user_id)
            .where_in("id", ids)
            .build_delete();

        let pool = self.db.pool().await;
        let removed = bind_all(sqlx::query(&sql), params)
            .execute(&*pool)
            .await?
            .rows_affected();
        tracing::debug!(user_id, requested = ids.len(), removed, "Match results deleted.");
        Ok(removed)
    }

    /// Number of results stored for `user_id`.
    pub async fn count_results(&self, user_id: i64) -> Result<i64, DbError> {
        let pool = self.db.pool().await;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM match_results WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&*pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::DbError;
    use crate::repository::DbRepository;
    use crate::repository::test_support::{repository, user};
    use chrono::NaiveDate;
    use core_types::{
        DeckSide, MatchUpdate, NewMatchResult, Outcome, PlayOrder, ResultFilter, SortDirection, SortKey,
    };

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    struct Fixture {
        user_id: i64,
        burn: i64,
        zoo: i64,
        control: i64,
    }

    async fn fixture(repo: &DbRepository) -> Fixture {
        let alice = user(repo, "alice").await;
        Fixture {
            user_id: alice.id,
            burn: repo.create_deck(alice.id, DeckSide::Own, "Burn").await.unwrap().id,
            zoo: repo.create_deck(alice.id, DeckSide::Own, "Zoo").await.unwrap().id,
            control: repo.create_deck(alice.id, DeckSide::Opponent, "Control").await.unwrap().id,
        }
    }

    fn new_result(date: NaiveDate, deck_id: i64, opponent: Option<i64>, outcome: Outcome) -> NewMatchResult {
        NewMatchResult {
            played_on: date,
            deck_id,
            opponent_deck_id: opponent,
            play_order: PlayOrder::First,
            outcome,
            note: String::new(),
        }
    }

    #[tokio::test]
    async fn create_then_list_returns_identical_values() {
        let (repo, _dir) = repository().await;
        let f = fixture(&repo).await;

        let created = repo
            .create_result(
                f.user_id,
                NewMatchResult {
                    played_on: day(9),
                    deck_id: f.burn,
                    opponent_deck_id: Some(f.control),
                    play_order: PlayOrder::Second,
                    outcome: Outcome::Draw,
                    note: "went to time".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(created.deck_name, "Burn");
        assert_eq!(created.opponent_deck_name.as_deref(), Some("Control"));
        let listed = repo.list_results(f.user_id, &ResultFilter::default()).await.unwrap();
        assert_eq!(listed, vec![created]);
    }

    #[tokio::test]
    async fn disabled_or_foreign_decks_cannot_be_used() {
        let (repo, _dir) = repository().await;
        let f = fixture(&repo).await;
        let bob = user(&repo, "bob").await;
        repo.set_deck_active(f.user_id, DeckSide::Own, f.zoo, false).await.unwrap();

        let disabled = repo
            .create_result(f.user_id, new_result(day(1), f.zoo, None, Outcome::Win))
            .await;
        assert!(matches!(disabled, Err(DbError::Validation(_))));

        let foreign = repo
            .create_result(bob.id, new_result(day(1), f.burn, None, Outcome::Win))
            .await;
        assert!(matches!(foreign, Err(DbError::Validation(_))));

        // An opponent deck id on the own side is rejected.
        let wrong_side = repo
            .create_result(f.user_id, new_result(day(1), f.control, None, Outcome::Win))
            .await;
        assert!(matches!(wrong_side, Err(DbError::Validation(_))));
        assert_eq!(repo.count_results(f.user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn filters_and_sorting() {
        let (repo, _dir) = repository().await;
        let f = fixture(&repo).await;
        let a = repo
            .create_result(f.user_id, new_result(day(1), f.burn, Some(f.control), Outcome::Win))
            .await
            .unwrap();
        let b = repo
            .create_result(f.user_id, new_result(day(2), f.zoo, None, Outcome::Loss))
            .await
            .unwrap();
        let mut tagged = new_result(day(3), f.burn, None, Outcome::Win);
        tagged.note = "Top 8 100%_sure".to_string();
        let c = repo.create_result(f.user_id, tagged).await.unwrap();

        let ids = |rows: Vec<core_types::MatchResult>| rows.iter().map(|r| r.id).collect::<Vec<_>>();

        let default = repo.list_results(f.user_id, &ResultFilter::default()).await.unwrap();
        assert_eq!(ids(default), vec![c.id, b.id, a.id]);

        let range = ResultFilter {
            date_from: Some(day(1)),
            date_to: Some(day(2)),
            sort: SortKey::Date,
            direction: SortDirection::Asc,
            ..ResultFilter::default()
        };
        assert_eq!(ids(repo.list_results(f.user_id, &range).await.unwrap()), vec![a.id, b.id]);

        let by_deck = ResultFilter {
            deck_id: Some(f.burn),
            outcome: Some(Outcome::Win),
            ..ResultFilter::default()
        };
        assert_eq!(ids(repo.list_results(f.user_id, &by_deck).await.unwrap()), vec![c.id, a.id]);

        let keyword = ResultFilter {
            keyword: Some("100%_S".to_string()),
            ..ResultFilter::default()
        };
        assert_eq!(ids(repo.list_results(f.user_id, &keyword).await.unwrap()), vec![c.id]);

        let deck_name = ResultFilter {
            keyword: Some("contr".to_string()),
            ..ResultFilter::default()
        };
        assert_eq!(ids(repo.list_results(f.user_id, &deck_name).await.unwrap()), vec![a.id]);

        let by_opponent = ResultFilter {
            sort: SortKey::OpponentDeck,
            direction: SortDirection::Desc,
            limit: Some(1),
            ..ResultFilter::default()
        };
        assert_eq!(ids(repo.list_results(f.user_id, &by_opponent).await.unwrap()), vec![a.id]);
    }

    #[tokio::test]
    async fn inverted_range_is_a_validation_error() {
        let (repo, _dir) = repository().await;
        let f = fixture(&repo).await;
        let filter = ResultFilter {
            date_from: Some(day(5)),
            date_to: Some(day(1)),
            ..ResultFilter::default()
        };
        assert!(matches!(
            repo.list_results(f.user_id, &filter).await,
            Err(DbError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let (repo, _dir) = repository().await;
        let f = fixture(&repo).await;
        let created = repo
            .create_result(f.user_id, new_result(day(1), f.burn, Some(f.control), Outcome::Win))
            .await
            .unwrap();

        let updated = repo
            .update_result(
                f.user_id,
                created.id,
                MatchUpdate {
                    outcome: Some(Outcome::Loss),
                    opponent_deck_id: Some(None),
                    ..MatchUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.outcome, Outcome::Loss);
        assert_eq!(updated.opponent_deck_id, None);
        assert_eq!(updated.deck_id, f.burn);
        assert_eq!(updated.played_on, created.played_on);
        assert!(updated.updated_at >= created.updated_at);

        let missing = repo.update_result(f.user_id, 9999, MatchUpdate::default()).await;
        assert!(matches!(missing, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn disabling_a_deck_leaves_results_untouched() {
        let (repo, _dir) = repository().await;
        let f = fixture(&repo).await;
        let created = repo
            .create_result(f.user_id, new_result(day(1), f.burn, Some(f.control), Outcome::Win))
            .await
            .unwrap();
        repo.set_deck_active(f.user_id, DeckSide::Own, f.burn, false).await.unwrap();
        repo.set_deck_active(f.user_id, DeckSide::Opponent, f.control, false).await.unwrap();

        assert_eq!(repo.get_result(f.user_id, created.id).await.unwrap(), created);

        // Keeping the disabled deck is allowed; switching to it is not.
        let kept = repo
            .update_result(
                f.user_id,
                created.id,
                MatchUpdate {
                    note: Some("kept".to_string()),
                    ..MatchUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(kept.deck_id, f.burn);

        let other = repo
            .create_result(f.user_id, new_result(day(2), f.zoo, None, Outcome::Win))
            .await
            .unwrap();
        let switched = repo
            .update_result(
                f.user_id,
                other.id,
                MatchUpdate {
                    deck_id: Some(f.burn),
                    ..MatchUpdate::default()
                },
            )
            .await;
        assert!(matches!(switched, Err(DbError::Validation(_))));
    }

    #[tokio::test]
    async fn delete_counts_and_scoping() {
        let (repo, _dir) = repository().await;
        let f = fixture(&repo).await;
        let bob = user(&repo, "bob").await;
        let a = repo
            .create_result(f.user_id, new_result(day(1), f.burn, None, Outcome::Win))
            .await
            .unwrap();
        let b = repo
            .create_result(f.user_id, new_result(day(2), f.burn, None, Outcome::Win))
            .await
            .unwrap();

        assert_eq!(repo.delete_results(f.user_id, &[]).await.unwrap(), 0);
        assert_eq!(repo.delete_results(bob.id, &[a.id, b.id]).await.unwrap(), 0);
        assert_eq!(repo.delete_results(f.user_id, &[a.id, b.id, 4242]).await.unwrap(), 2);
        assert_eq!(repo.delete_result(f.user_id, a.id).await.unwrap(), 0);
        assert!(matches!(
            repo.get_result(f.user_id, a.id).await,
            Err(DbError::NotFound(_))
        ));
    }
}
