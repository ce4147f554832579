use crate::error::DbError;
use configuration::DatabaseSettings;
use sqlx::Connection;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyConnection, AnyPool};
use sqlx::migrate::Migrator;
use std::path::Path;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard};

static SQLITE_MIGRATOR: Migrator = sqlx::migrate!("./migrations/sqlite");
static POSTGRES_MIGRATOR: Migrator = sqlx::migrate!("./migrations/postgres");

/// The SQL dialect behind the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite",
            Backend::Postgres => "postgres",
        }
    }
}

/// A connection pool to whichever store the persistence selector chose.
///
/// The pool sits behind a lock so the embedded file can be swapped out from
/// under it: every query holds a read guard for its duration, while a restore
/// takes the write guard, closes the pool, replaces the file and reconnects.
pub struct Database {
    settings: DatabaseSettings,
    url: String,
    backend: Backend,
    max_connections: u32,
    pool: RwLock<AnyPool>,
}

// The URL carries the network store password.
impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("settings", &self.settings)
            .field("backend", &self.backend)
            .field("max_connections", &self.max_connections)
            .finish_non_exhaustive()
    }
}

/// Establishes a connection pool for the selected store.
///
/// The embedded SQLite file is created on first use. Migrations are not run
/// here; call [`run_migrations`] once the pool is up.
pub async fn connect(settings: &DatabaseSettings, max_connections: u32) -> Result<Database, DbError> {
    let url = settings.connection_url()?;
    let backend = if settings.is_embedded() {
        Backend::Sqlite
    } else {
        Backend::Postgres
    };

    if let Some(parent) = settings
        .embedded_path()
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
    {
        if !parent.exists() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DbError::Validation(format!(
                    "cannot create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }

    let pool = open_pool(&url, max_connections).await?;
    tracing::info!(store = %settings.describe(), "Database pool established.");

    Ok(Database {
        settings: settings.clone(),
        url,
        backend,
        max_connections,
        pool: RwLock::new(pool),
    })
}

/// Applies the migrations of the active backend.
pub async fn run_migrations(db: &Database) -> Result<(), DbError> {
    let pool = db.pool().await;
    migrator_for(db.backend).run(&*pool).await?;
    Ok(())
}

async fn open_pool(url: &str, max_connections: u32) -> Result<AnyPool, DbError> {
    // Idempotent; registers the compiled-in drivers with the `Any` layer.
    sqlx::any::install_default_drivers();

    let pool = AnyPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;
    Ok(pool)
}

/// Tables and columns the repository reads, checked on uploaded databases.
const REQUIRED_SCHEMA: &[(&str, &str)] = &[
    ("users", "id, username, password_hash, is_active, created_at"),
    ("decks", "id, user_id, side, name, is_active, created_at, updated_at"),
    (
        "match_results",
        "id, user_id, played_on, deck_id, opponent_deck_id, play_order, outcome, note, created_at, updated_at",
    ),
];

/// Vets a standalone SQLite file before it replaces the working database.
///
/// Runs `PRAGMA quick_check`, applies the bundled migrations to the file and
/// confirms every table the repository reads has the expected columns. Any
/// failure is a `Validation` error; the file may have been migrated by then
/// but the working database is untouched.
pub async fn prepare_sqlite_file(path: &Path) -> Result<(), DbError> {
    sqlx::any::install_default_drivers();
    let url = format!("sqlite://{}?mode=rw", path.display());
    let mut conn = AnyConnection::connect(&url)
        .await
        .map_err(|e| DbError::Validation(format!("not a readable SQLite database: {e}")))?;

    let checked = check_restore_candidate(&mut conn).await;
    let closed = conn.close().await;
    checked?;
    closed?;
    Ok(())
}

async fn check_restore_candidate(conn: &mut AnyConnection) -> Result<(), DbError> {
    let verdict: Vec<String> = sqlx::query_scalar("PRAGMA quick_check")
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| DbError::Validation(format!("integrity check failed: {e}")))?;
    if verdict.first().map(String::as_str) != Some("ok") {
        return Err(DbError::Validation(format!(
            "database file failed its integrity check: {}",
            verdict.join("; ")
        )));
    }

    SQLITE_MIGRATOR
        .run_direct(&mut *conn)
        .await
        .map_err(|e| DbError::Validation(format!("incompatible database schema: {e}")))?;

    for (table, columns) in REQUIRED_SCHEMA {
        sqlx::query(&format!("SELECT {columns} FROM {table} LIMIT 0"))
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| DbError::Validation(format!("incompatible table {table}: {e}")))?;
    }
    Ok(())
}

fn migrator_for(backend: Backend) -> &'static Migrator {
    match backend {
        Backend::Sqlite => &SQLITE_MIGRATOR,
        Backend::Postgres => &POSTGRES_MIGRATOR,
    }
}

impl Database {
    /// Borrows the live pool. The guard must not be held across a restore.
    pub async fn pool(&self) -> RwLockReadGuard<'_, AnyPool> {
        self.pool.read().await
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    /// Writes a consistent copy of the embedded database to `target`.
    ///
    /// Uses `VACUUM INTO`, so committed pages still sitting in the write-ahead
    /// log are included. `target` must not exist yet.
    pub async fn snapshot_into(&self, target: &Path) -> Result<(), DbError> {
        if self.backend != Backend::Sqlite {
            return Err(DbError::Unsupported(
                "file snapshots are only available for the embedded SQLite store".to_string(),
            ));
        }
        let target = target.to_str().ok_or_else(|| {
            DbError::Validation(format!("snapshot path is not valid UTF-8: {}", target.display()))
        })?;

        let pool = self.pool().await;
        sqlx::query("VACUUM INTO $1")
            .bind(target.to_string())
            .execute(&*pool)
            .await?;
        tracing::debug!(path = target, "Database snapshot written.");
        Ok(())
    }

    /// Replaces the embedded database file while no query is running.
    ///
    /// Waits for in-flight queries, closes every pooled connection and then
    /// calls `replace`, which is expected to move a validated file over the
    /// working one. The pool is reopened and migrated whether or not `replace`
    /// succeeded, so a failed swap leaves the service on the previous file.
    pub async fn replace_file_with<F, E>(&self, replace: F) -> Result<(), E>
    where
        F: FnOnce(&Path) -> Result<(), E>,
        E: From<DbError>,
    {
        let Some(path) = self.settings.embedded_path() else {
            return Err(E::from(DbError::Unsupported(
                "file replacement is only available for the embedded SQLite store".to_string(),
            )));
        };

        let mut pool = self.pool.write().await;
        pool.close().await;
        tracing::info!(path = %path.display(), "Database pool closed for file replacement.");

        let outcome = replace(path);
        if outcome.is_ok() {
            remove_sidecars(path);
        }

        *pool = open_pool(&self.url, self.max_connections).await.map_err(E::from)?;
        migrator_for(self.backend)
            .run(&*pool)
            .await
            .map_err(|e| E::from(DbError::from(e)))?;
        tracing::info!(
            path = %path.display(),
            replaced = outcome.is_ok(),
            "Database pool reopened."
        );
        outcome
    }

    /// Closes the pool. Further queries fail.
    pub async fn close(&self) {
        self.pool.read().await.close().await;
    }
}

/// Drops the journal files that belonged to the file that was replaced.
fn remove_sidecars(path: &Path) {
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        let sidecar = Path::new(&sidecar);
        if sidecar.exists() {
            if let Err(e) = std::fs::remove_file(sidecar) {
                tracing::warn!(path = %sidecar.display(), error = %e, "Could not remove stale journal file.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn embedded(path: PathBuf) -> DatabaseSettings {
        DatabaseSettings::Embedded { path }
    }

    #[tokio::test]
    async fn connect_creates_file_and_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("db.sqlite3");
        let db = connect(&embedded(path.clone()), 1).await.unwrap();
        run_migrations(&db).await.unwrap();

        assert_eq!(db.backend(), Backend::Sqlite);
        assert!(path.exists());
        db.close().await;
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = connect(&embedded(dir.path().join("db.sqlite3")), 1).await.unwrap();
        run_migrations(&db).await.unwrap();
        run_migrations(&db).await.unwrap();
    }

    #[tokio::test]
    async fn snapshot_refuses_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let db = connect(&embedded(dir.path().join("db.sqlite3")), 1).await.unwrap();
        run_migrations(&db).await.unwrap();

        let target = dir.path().join("copy.sqlite3");
        db.snapshot_into(&target).await.unwrap();
        assert!(target.exists());
        assert!(db.snapshot_into(&target).await.is_err());
    }

    #[tokio::test]
    async fn prepare_accepts_snapshot_and_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let db = connect(&embedded(dir.path().join("db.sqlite3")), 1).await.unwrap();
        run_migrations(&db).await.unwrap();
        let copy = dir.path().join("copy.sqlite3");
        db.snapshot_into(&copy).await.unwrap();
        prepare_sqlite_file(&copy).await.unwrap();

        let garbage = dir.path().join("garbage.sqlite3");
        let mut bytes = b"SQLite format 3\0".to_vec();
        bytes.extend(std::iter::repeat_n(0xAB_u8, 4096));
        std::fs::write(&garbage, bytes).unwrap();
        assert!(matches!(
            prepare_sqlite_file(&garbage).await,
            Err(DbError::Validation(_))
        ));
    }

    async fn foreign_database(path: &Path, ddl: &str) {
        sqlx::any::install_default_drivers();
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let mut conn = AnyConnection::connect(&url).await.unwrap();
        sqlx::query(ddl).execute(&mut conn).await.unwrap();
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn prepare_rejects_incompatible_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.sqlite3");
        foreign_database(&path, "CREATE TABLE match_results (id INTEGER)").await;

        let err = prepare_sqlite_file(&path).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)), "{err}");
    }

    #[tokio::test]
    async fn prepare_migrates_an_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.sqlite3");
        foreign_database(&path, "CREATE TABLE scratch (x INTEGER)").await;
        prepare_sqlite_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn failed_replacement_keeps_pool_usable() {
        let dir = tempfile::tempdir().unwrap();
        let db = connect(&embedded(dir.path().join("db.sqlite3")), 2).await.unwrap();
        run_migrations(&db).await.unwrap();

        let result: Result<(), DbError> = db
            .replace_file_with(|_| Err(DbError::Validation("refused".to_string())))
            .await;
        assert!(matches!(result, Err(DbError::Validation(_))));

        let pool = db.pool().await;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&*pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
