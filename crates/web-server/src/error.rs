use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use backup::BackupError;
use database::DbError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("Analytics error: {0}")]
    Analytics(#[from] analytics::AnalyticsError),
    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Authentication required")]
    Unauthorized,
    #[error("Not found: {0}")]
    NotFound(String),
}

fn internal(err: &dyn std::fmt::Display, what: &str) -> (StatusCode, String) {
    tracing::error!(error = %err, "{what} error.");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("An internal {} error occurred", what.to_lowercase()),
    )
}

fn database_status(err: &DbError) -> (StatusCode, String) {
    match err {
        DbError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
        DbError::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
        DbError::Conflict(message) => (StatusCode::CONFLICT, message.clone()),
        DbError::Unsupported(message) => (StatusCode::SERVICE_UNAVAILABLE, message.clone()),
        other => internal(other, "Database"),
    }
}

/// Converts our custom `AppError` into an HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Database(db_err) => database_status(db_err),
            AppError::Analytics(err) => internal(err, "Analytics"),
            AppError::Backup(err) => match err {
                BackupError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                BackupError::ReadOnly(_) | BackupError::Unsupported(_) => {
                    tracing::warn!(error = %err, "Backup operation unavailable.");
                    (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
                }
                BackupError::Db(db_err) => database_status(db_err),
                other => internal(other, "Backup"),
            },
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

impl From<core_types::CoreError> for AppError {
    fn from(err: core_types::CoreError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
