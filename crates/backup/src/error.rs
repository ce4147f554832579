use database::DbError;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    /// The uploaded archive or file cannot be restored. Nothing was written.
    #[error("Invalid backup: {0}")]
    Validation(String),

    /// The deployment cannot write next to the database file.
    #[error(
        "The database location {0} is read-only. Restoring the embedded SQLite file is not \
         possible here; set USE_POSTGRES=1 and configure a PostgreSQL server for persistent data."
    )]
    ReadOnly(String),

    /// The active store has no file to export or replace.
    #[error("{0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

impl BackupError {
    /// Classifies a filesystem error hit while writing at `path`.
    pub(crate) fn from_write(err: io::Error, path: &Path) -> Self {
        match err.kind() {
            io::ErrorKind::ReadOnlyFilesystem | io::ErrorKind::PermissionDenied => {
                BackupError::ReadOnly(path.display().to_string())
            }
            _ => BackupError::Io(err),
        }
    }

    /// Whether front ends should show this as a warning rather than a failure.
    pub fn is_warning(&self) -> bool {
        matches!(self, BackupError::ReadOnly(_) | BackupError::Unsupported(_))
    }
}
