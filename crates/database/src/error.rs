use core_types::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid database configuration: {0}")]
    ConnectionConfigError(#[from] configuration::error::ConfigError),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Stored data could not be decoded: {0}")]
    InvalidData(String),

    #[error("Operation not supported by this store: {0}")]
    Unsupported(String),
}

impl From<CoreError> for DbError {
    fn from(err: CoreError) -> Self {
        DbError::Validation(err.to_string())
    }
}

/// Turns a unique-constraint violation into a `Conflict` carrying `message`.
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: impl FnOnce() -> String) -> DbError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            DbError::Conflict(message())
        }
        _ => DbError::Sqlx(err),
    }
}
