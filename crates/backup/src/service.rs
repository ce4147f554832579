use crate::archive::{build_archive, extract_database};
use crate::error::BackupError;
use database::{Database, prepare_sqlite_file};
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a successful restore replaced the working database with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    pub bytes: u64,
}

/// Exports and restores database snapshot archives of the embedded store.
#[derive(Debug, Clone)]
pub struct BackupService {
    db: Arc<Database>,
    assets: Vec<PathBuf>,
    max_database_bytes: u64,
}

/// Unpacked size limit used unless `with_max_database_bytes` says otherwise.
pub const DEFAULT_MAX_DATABASE_BYTES: u64 = 1024 * 1024 * 1024;

impl BackupService {
    pub fn new(db: Arc<Database>, assets: Vec<PathBuf>) -> Self {
        Self {
            db,
            assets,
            max_database_bytes: DEFAULT_MAX_DATABASE_BYTES,
        }
    }

    pub fn with_max_database_bytes(mut self, limit: u64) -> Self {
        self.max_database_bytes = limit;
        self
    }

    fn embedded_path(&self) -> Result<&Path, BackupError> {
        self.db.settings().embedded_path().ok_or_else(|| {
            BackupError::Unsupported(
                "The PostgreSQL store is active; SQLite backup and restore would have no effect. \
                 Use the database server's own backup tooling instead."
                    .to_string(),
            )
        })
    }

    /// Builds a ZIP with a consistent snapshot of the live database and the
    /// configured asset paths.
    pub async fn export_database(&self) -> Result<Vec<u8>, BackupError> {
        self.embedded_path()?;

        let snapshot = std::env::temp_dir().join(format!(
            "matchtally-snapshot-{}.sqlite3",
            uuid::Uuid::new_v4().simple()
        ));
        let result = self.archive_snapshot(&snapshot).await;
        if snapshot.exists() {
            if let Err(e) = fs::remove_file(&snapshot) {
                tracing::warn!(path = %snapshot.display(), error = %e, "Could not remove snapshot file.");
            }
        }

        let archive = result?;
        tracing::info!(bytes = archive.len(), "Database archive exported.");
        Ok(archive)
    }

    async fn archive_snapshot(&self, snapshot: &Path) -> Result<Vec<u8>, BackupError> {
        self.db.snapshot_into(snapshot).await?;
        let bytes = tokio::fs::read(snapshot).await?;
        build_archive(&bytes, &self.assets)
    }

    /// Writes the export to `target`.
    pub async fn export_database_to(&self, target: &Path) -> Result<u64, BackupError> {
        let archive = self.export_database().await?;
        tokio::fs::write(target, &archive).await?;
        Ok(archive.len() as u64)
    }

    /// Replaces the working database with the one carried by `payload`.
    ///
    /// The payload is validated completely before anything is written. The
    /// new file is staged next to the working file, integrity checked,
    /// migrated and matched against the expected schema, then renamed over
    /// the working file while the pool is closed. On any failure the staging
    /// file is removed and the working file is left untouched.
    pub async fn restore_database(&self, payload: &[u8]) -> Result<RestoreSummary, BackupError> {
        let target = self.embedded_path()?.to_path_buf();
        let bytes = extract_database(payload, self.max_database_bytes)?;

        let staging = staging_path(&target);
        let staged = StagedFile::write(&staging, &bytes)
            .map_err(|e| BackupError::from_write(e, &staging))?;

        if let Err(e) = prepare_sqlite_file(staged.path()).await {
            return Err(BackupError::Validation(e.to_string()));
        }

        self.db
            .replace_file_with(|working| staged.persist(working))
            .await?;

        tracing::info!(path = %target.display(), bytes = bytes.len(), "Database restored from backup.");
        Ok(RestoreSummary {
            bytes: bytes.len() as u64,
        })
    }
}

/// A sibling of `target` so the final rename stays on one filesystem.
fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "db.sqlite3".to_string());
    target.with_file_name(format!(
        ".{name}.restore-{}.tmp",
        uuid::Uuid::new_v4().simple()
    ))
}

/// A fully written, fsynced temporary file that is deleted unless persisted.
#[derive(Debug)]
struct StagedFile {
    path: PathBuf,
    persisted: bool,
}

impl StagedFile {
    fn write(path: &Path, bytes: &[u8]) -> std::io::Result<Self> {
        let staged = StagedFile {
            path: path.to_path_buf(),
            persisted: false,
        };
        let mut file = File::create(path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(staged)
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn persist(mut self, target: &Path) -> Result<(), BackupError> {
        fs::rename(&self.path, target).map_err(|e| BackupError::from_write(e, target))?;
        self.persisted = true;
        // Make the rename itself durable.
        if let Some(dir) = target.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = File::open(dir).and_then(|dir| dir.sync_all()) {
                tracing::warn!(path = %dir.display(), error = %e, "Could not sync the database directory.");
            }
        }
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        let mut leftovers = vec![self.path.clone()];
        for suffix in ["-wal", "-shm", "-journal"] {
            let mut name = self.path.clone().into_os_string();
            name.push(suffix);
            leftovers.push(PathBuf::from(name));
        }
        for path in leftovers.iter().filter(|p| p.exists()) {
            if let Err(e) = fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "Could not remove staging file.");
            }
        }
    }
}
