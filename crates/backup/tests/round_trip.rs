use backup::archive::{DATABASE_ENTRY, SQLITE_HEADER, entry_names};
use backup::{BackupError, BackupService, export_user_data, import_user_data};
use chrono::NaiveDate;
use configuration::DatabaseSettings;
use core_types::{DeckSide, MatchResult, NewMatchResult, Outcome, PlayOrder, ResultFilter};
use database::{DbRepository, connect, run_migrations};
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    repo: DbRepository,
    service: BackupService,
    db_path: PathBuf,
    dir: TempDir,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db.sqlite3");
    let settings = DatabaseSettings::Embedded {
        path: db_path.clone(),
    };
    let db = Arc::new(connect(&settings, 2).await.unwrap());
    run_migrations(&db).await.unwrap();

    Harness {
        repo: DbRepository::new(db.clone()),
        service: BackupService::new(db, Vec::new()),
        db_path,
        dir,
    }
}

async fn seed(repo: &DbRepository, username: &str) -> i64 {
    let user = repo.create_user(username, "pw").await.unwrap();
    let burn = repo.create_deck(user.id, DeckSide::Own, "Burn").await.unwrap();
    let zoo = repo.create_deck(user.id, DeckSide::Own, "Zoo").await.unwrap();
    let control = repo.create_deck(user.id, DeckSide::Opponent, "Control").await.unwrap();

    for (day, deck, opponent, outcome) in [
        (1, burn.id, Some(control.id), Outcome::Win),
        (2, zoo.id, None, Outcome::Loss),
        (3, burn.id, Some(control.id), Outcome::Draw),
    ] {
        repo.create_result(
            user.id,
            NewMatchResult {
                played_on: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
                deck_id: deck,
                opponent_deck_id: opponent,
                play_order: PlayOrder::Second,
                outcome,
                note: format!("game {day}"),
            },
        )
        .await
        .unwrap();
    }
    repo.set_deck_active(user.id, DeckSide::Own, zoo.id, false).await.unwrap();
    user.id
}

async fn all_results(repo: &DbRepository, user_id: i64) -> Vec<MatchResult> {
    repo.list_results(user_id, &ResultFilter::unbounded()).await.unwrap()
}

fn staging_leftovers(h: &Harness) -> usize {
    std::fs::read_dir(h.dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().contains(".restore-"))
        .count()
}

#[tokio::test]
async fn export_then_restore_reproduces_the_database() {
    let h = harness().await;
    let user_id = seed(&h.repo, "alice").await;
    let before = all_results(&h.repo, user_id).await;

    let archive = h.service.export_database().await.unwrap();
    assert_eq!(entry_names(&archive).unwrap(), [DATABASE_ENTRY]);

    // Diverge from the snapshot, then restore it.
    h.repo.delete_results(user_id, &[before[0].id]).await.unwrap();
    h.repo.create_deck(user_id, DeckSide::Own, "Tron").await.unwrap();

    let summary = h.service.restore_database(&archive).await.unwrap();
    assert!(summary.bytes > 0);

    assert_eq!(all_results(&h.repo, user_id).await, before);
    let decks = h.repo.list_decks(user_id, DeckSide::Own, false).await.unwrap();
    let names: Vec<_> = decks.iter().map(|d| (d.name.as_str(), d.is_active)).collect();
    assert_eq!(names, [("Burn", true), ("Zoo", false)]);
    assert!(h.repo.authenticate("alice", "pw").await.unwrap().is_some());
    assert_eq!(staging_leftovers(&h), 0);
}

#[tokio::test]
async fn raw_sqlite_file_can_be_restored() {
    let h = harness().await;
    let user_id = seed(&h.repo, "alice").await;
    let before = all_results(&h.repo, user_id).await;

    let snapshot = h.dir.path().join("raw.sqlite3");
    h.repo.database().snapshot_into(&snapshot).await.unwrap();
    let raw = std::fs::read(&snapshot).unwrap();
    assert!(raw.starts_with(SQLITE_HEADER));

    h.repo.delete_results(user_id, &[before[1].id]).await.unwrap();
    h.service.restore_database(&raw).await.unwrap();
    assert_eq!(all_results(&h.repo, user_id).await, before);
}

#[tokio::test]
async fn corrupt_archive_leaves_database_untouched() {
    let h = harness().await;
    let user_id = seed(&h.repo, "alice").await;
    let original = std::fs::read(&h.db_path).unwrap();

    let archive = h.service.export_database().await.unwrap();
    let truncated = &archive[..archive.len() / 2];
    let mut bogus_db = SQLITE_HEADER.to_vec();
    bogus_db.extend(std::iter::repeat_n(0x5A_u8, 8192));

    for payload in [truncated, b"garbage".as_slice(), bogus_db.as_slice()] {
        let err = h.service.restore_database(payload).await.unwrap_err();
        assert!(matches!(err, BackupError::Validation(_)), "{err}");
        assert_eq!(std::fs::read(&h.db_path).unwrap(), original);
    }

    assert_eq!(staging_leftovers(&h), 0);
    assert_eq!(h.repo.count_results(user_id).await.unwrap(), 3);
}

#[tokio::test]
async fn user_data_round_trips_into_an_empty_account() {
    let h = harness().await;
    let alice = seed(&h.repo, "alice").await;
    let carol = h.repo.create_user("carol", "pw").await.unwrap().id;

    let archive = export_user_data(&h.repo, alice).await.unwrap();
    let counters = import_user_data(&h.repo, carol, &archive, true).await.unwrap();
    assert_eq!((counters.decks, counters.opponent_decks, counters.results), (2, 1, 3));

    for side in [DeckSide::Own, DeckSide::Opponent] {
        let names = |decks: Vec<core_types::Deck>| {
            decks
                .into_iter()
                .map(|d| (d.name, d.is_active))
                .collect::<Vec<_>>()
        };
        assert_eq!(
            names(h.repo.list_decks(carol, side, false).await.unwrap()),
            names(h.repo.list_decks(alice, side, false).await.unwrap())
        );
    }

    let strip = |results: Vec<MatchResult>| {
        results
            .into_iter()
            .map(|r| (r.played_on, r.deck_name, r.opponent_deck_name, r.play_order, r.outcome, r.note))
            .collect::<Vec<_>>()
    };
    assert_eq!(
        strip(all_results(&h.repo, carol).await),
        strip(all_results(&h.repo, alice).await)
    );
}

async fn foreign_database(path: &Path, ddl: &str) -> Vec<u8> {
    let settings = DatabaseSettings::Embedded {
        path: path.to_path_buf(),
    };
    let db = connect(&settings, 1).await.unwrap();
    sqlx::query(ddl).execute(&*db.pool().await).await.unwrap();
    db.close().await;
    std::fs::read(path).unwrap()
}

#[tokio::test]
async fn incompatible_schema_is_rejected_before_the_swap() {
    let h = harness().await;
    let user_id = seed(&h.repo, "alice").await;
    let original = std::fs::read(&h.db_path).unwrap();

    let foreign = foreign_database(
        &h.dir.path().join("foreign.sqlite3"),
        "CREATE TABLE match_results (id INTEGER)",
    )
    .await;
    assert!(foreign.starts_with(SQLITE_HEADER));

    let err = h.service.restore_database(&foreign).await.unwrap_err();
    assert!(matches!(err, BackupError::Validation(_)), "{err}");

    assert_eq!(std::fs::read(&h.db_path).unwrap(), original);
    assert!(h.repo.authenticate("alice", "pw").await.unwrap().is_some());
    assert_eq!(h.repo.count_results(user_id).await.unwrap(), 3);
    assert_eq!(staging_leftovers(&h), 0);
}

#[tokio::test]
async fn restore_honours_the_database_size_limit() {
    let h = harness().await;
    let user_id = seed(&h.repo, "alice").await;
    let archive = h.service.export_database().await.unwrap();

    let limited = h.service.clone().with_max_database_bytes(1024);
    let err = limited.restore_database(&archive).await.unwrap_err();
    assert!(matches!(&err, BackupError::Validation(msg) if msg.contains("1024 byte limit")), "{err}");

    assert_eq!(h.repo.count_results(user_id).await.unwrap(), 3);
    assert_eq!(staging_leftovers(&h), 0);
}
