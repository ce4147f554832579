use crate::auth::CurrentUser;
use crate::{AppState, error::AppError};
use analytics::{ReportEngine, StatsReport};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use backup::RestoreSummary;
use core_types::{Deck, DeckSide, MatchResult, MatchUpdate, NewMatchResult, ResultFilter, User};
use database::ImportCounters;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Header carrying the first-run setup token.
pub const SETUP_TOKEN_HEADER: &str = "x-setup-token";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: Uuid,
    pub user: User,
}

/// # GET /api/health
pub async fn health() -> &'static str {
    "OK"
}

/// # POST /api/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user = state
        .repo
        .authenticate(&request.username, &request.password)
        .await?
        .ok_or(AppError::Unauthorized)?;
    let token = state.sessions.open(user.id);
    tracing::info!(user_id = user.id, "User logged in.");
    Ok(Json(LoginResponse { token, user }))
}

/// # POST /api/logout
pub async fn logout(State(state): State<Arc<AppState>>, user: CurrentUser) -> StatusCode {
    state.sessions.close(&user.token);
    StatusCode::NO_CONTENT
}

// --- Match results ---

/// # GET /api/results
/// Lists the caller's results. All `ResultFilter` fields are query parameters.
pub async fn list_results(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(filter): Query<ResultFilter>,
) -> Result<Json<Vec<MatchResult>>, AppError> {
    let results = state.repo.list_results(user.user_id, &filter).await?;
    Ok(Json(results))
}

/// # POST /api/results
pub async fn create_result(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(new): Json<NewMatchResult>,
) -> Result<(StatusCode, Json<MatchResult>), AppError> {
    let result = state.repo.create_result(user.user_id, new).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// # GET /api/results/:id
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<MatchResult>, AppError> {
    Ok(Json(state.repo.get_result(user.user_id, id).await?))
}

/// # PATCH /api/results/:id
pub async fn update_result(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(update): Json<MatchUpdate>,
) -> Result<Json<MatchResult>, AppError> {
    Ok(Json(state.repo.update_result(user.user_id, id, update).await?))
}

#[derive(Debug, Serialize)]
pub struct Removed {
    pub removed: u64,
}

/// # DELETE /api/results/:id
/// Deleting a result that does not exist reports `removed: 0`.
pub async fn delete_result(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Removed>, AppError> {
    let removed = state.repo.delete_result(user.user_id, id).await?;
    Ok(Json(Removed { removed }))
}

#[derive(Debug, Deserialize)]
pub struct BulkDelete {
    #[serde(default)]
    pub ids: Vec<i64>,
}

/// # POST /api/results/delete
pub async fn delete_results(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(request): Json<BulkDelete>,
) -> Result<Json<Removed>, AppError> {
    let removed = state.repo.delete_results(user.user_id, &request.ids).await?;
    Ok(Json(Removed { removed }))
}

/// # GET /api/report
/// Aggregates every result matching the filter; `limit` is ignored.
pub async fn report(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(filter): Query<ResultFilter>,
) -> Result<Json<StatsReport>, AppError> {
    let filter = ResultFilter {
        limit: None,
        ..filter
    };
    let results = state.repo.list_results(user.user_id, &filter).await?;
    let report = ReportEngine::new().calculate(&results)?;
    Ok(Json(report))
}

// --- Decks ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeckListQuery {
    pub only_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct NewDeck {
    pub name: String,
}

/// Both fields are optional; a rename and a toggle can be sent together.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeckPatch {
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

/// # GET /api/decks/:side
pub async fn list_decks(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(side): Path<DeckSide>,
    Query(query): Query<DeckListQuery>,
) -> Result<Json<Vec<Deck>>, AppError> {
    let decks = state
        .repo
        .list_decks(user.user_id, side, query.only_active)
        .await?;
    Ok(Json(decks))
}

/// # POST /api/decks/:side
pub async fn create_deck(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(side): Path<DeckSide>,
    Json(new): Json<NewDeck>,
) -> Result<(StatusCode, Json<Deck>), AppError> {
    let deck = state.repo.create_deck(user.user_id, side, &new.name).await?;
    Ok((StatusCode::CREATED, Json(deck)))
}

/// # PATCH /api/decks/:side/:id
pub async fn update_deck(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path((side, id)): Path<(DeckSide, i64)>,
    Json(patch): Json<DeckPatch>,
) -> Result<Json<Deck>, AppError> {
    let mut deck = state.repo.get_deck(user.user_id, side, id).await?;
    if let Some(name) = &patch.name {
        deck = state.repo.rename_deck(user.user_id, side, id, name).await?;
    }
    if let Some(active) = patch.is_active {
        deck = state.repo.set_deck_active(user.user_id, side, id, active).await?;
    }
    Ok(Json(deck))
}

/// # DELETE /api/decks/:side/:id
pub async fn delete_deck(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path((side, id)): Path<(DeckSide, i64)>,
) -> Result<Json<Removed>, AppError> {
    let removed = state.repo.delete_deck(user.user_id, side, id).await?;
    Ok(Json(Removed { removed }))
}

// --- Backups ---

fn zip_download(file_name: String, bytes: Vec<u8>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        bytes,
    )
}

fn stamp() -> String {
    chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}

/// # GET /api/backup/database
pub async fn export_database(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let archive = state.backup.export_database().await?;
    Ok(zip_download(format!("matchtally-backup-{}.zip", stamp()), archive))
}

async fn restore(state: &AppState, payload: &[u8]) -> Result<RestoreSummary, AppError> {
    if payload.is_empty() {
        return Err(AppError::BadRequest("no backup file was uploaded".to_string()));
    }
    let summary = state.backup.restore_database(payload).await?;
    // The user table was replaced wholesale; old tokens may point at other accounts.
    let dropped = state.sessions.clear();
    tracing::info!(bytes = summary.bytes, sessions = dropped, "Sessions cleared after restore.");
    Ok(summary)
}

/// # POST /api/backup/database
/// The body is a backup ZIP or a raw SQLite file.
pub async fn restore_database(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    body: Bytes,
) -> Result<Json<RestoreSummary>, AppError> {
    Ok(Json(restore(&state, &body).await?))
}

/// # POST /api/setup/restore
/// Restore without a session, for a fresh deployment that has no users yet.
/// Disabled unless a setup token is configured.
pub async fn setup_restore(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RestoreSummary>, AppError> {
    let Some(expected) = state.setup_token.as_deref() else {
        return Err(AppError::NotFound("setup restore is disabled".to_string()));
    };
    let supplied = headers
        .get(SETUP_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim);
    if supplied != Some(expected) {
        tracing::warn!("Setup restore attempted with a wrong or missing token.");
        return Err(AppError::Unauthorized);
    }
    Ok(Json(restore(&state, &body).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserDataImportQuery {
    /// Replace the account's decks and results instead of merging.
    pub purge: bool,
}

/// # GET /api/backup/user-data
pub async fn export_user_data(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let archive = backup::export_user_data(&state.repo, user.user_id).await?;
    Ok(zip_download(format!("matchtally-data-{}.zip", stamp()), archive))
}

/// # POST /api/backup/user-data
pub async fn import_user_data(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<UserDataImportQuery>,
    body: Bytes,
) -> Result<Json<ImportCounters>, AppError> {
    if body.is_empty() {
        return Err(AppError::BadRequest("no data archive was uploaded".to_string()));
    }
    let counters = backup::import_user_data(&state.repo, user.user_id, &body, query.purge).await?;
    Ok(Json(counters))
}
