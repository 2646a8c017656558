//! JSON API over the league core.
//!
//! Authentication is done upstream: the gateway forwards the caller's user id in the `x-user-id`
//! header, and the account (and its role) is resolved from the database on every request.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use diesel::SqliteConnection;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, instrument};

use crate::db::DbPool;
use crate::error::{Error, Result};
use crate::intake::submit_prediction;
use crate::leaderboard::{get_leaderboard, LeaderboardEntry, Timeframe};
use crate::model::{
    Match, MatchDetails, MatchEdit, MatchStatus, NewAccount, NewMatch, NewTeam, PointsLedgerEntry,
    Prediction, PredictionDetails, PredictionFilter, ProfileChanges, Role, SiteSetting, Team, User,
    UserChanges,
};
use crate::scoring::{record_match_result, start_match, MatchResult, ScoredMatch};
use crate::store;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidState(_) | Error::InvalidSelection(_) | Error::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::InvalidBody(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

/// Runs blocking diesel work on a pooled connection off the async runtime.
async fn with_conn<T, F>(pool: &DbPool, f: F) -> Result<T>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        f(&mut conn)
    })
    .await?
}

/// `Json` body extractor whose rejections carry the API's `{ "message": ... }` body.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| Error::InvalidBody(rejection.body_text()))?;
        Ok(JsonBody(value))
    }
}

/// `Path` extractor that reports a malformed segment as a validation error.
#[derive(Debug)]
pub struct PathParam<T>(pub T);

impl<S, T> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: PathRejection| Error::Validation(rejection.body_text()))?;
        Ok(PathParam(value))
    }
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user_id: i32 = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .ok_or(Error::Unauthorized)?;
        let user = with_conn(&state.pool, move |conn| store::get_user(conn, user_id)).await?;
        user.map(CurrentUser).ok_or(Error::Unauthorized)
    }
}

/// An authenticated caller with the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            return Err(Error::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

pub fn router(pool: DbPool) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/register", post(register))
        .route("/api/user", get(current_user))
        .route("/api/profile", patch(update_profile))
        .route("/api/teams", get(list_teams).post(create_team))
        .route("/api/teams/{id}/logo", put(set_team_logo))
        .route("/api/matches", get(list_matches).post(create_match))
        .route(
            "/api/matches/{id}",
            get(get_match).patch(edit_match).delete(delete_match),
        )
        .route("/api/matches/{id}/start", patch(start))
        .route("/api/matches/{id}/result", post(record_result))
        .route("/api/predictions", get(my_predictions).post(predict))
        .route("/api/admin/all-predictions", get(all_predictions))
        .route("/api/leaderboard", get(leaderboard))
        .route("/api/ledger", get(my_ledger))
        .route("/api/users", get(list_users))
        .route("/api/users/{id}", patch(update_user).delete(delete_user))
        .route("/api/settings/{key}", get(get_setting).put(put_setting))
        .with_state(AppState { pool })
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

// Accounts

#[instrument(skip(state, account))]
async fn register(
    State(state): State<AppState>,
    JsonBody(account): JsonBody<NewAccount>,
) -> Result<(StatusCode, Json<User>)> {
    let user = with_conn(&state.pool, move |conn| store::create_user(conn, account.into())).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn current_user(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

#[instrument(skip(state, user, changes), fields(user_id = user.id))]
async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(changes): JsonBody<ProfileChanges>,
) -> Result<Json<User>> {
    with_conn(&state.pool, move |conn| {
        store::update_user(conn, user.id, changes.into())
    })
    .await
    .map(Json)
}

// Teams

async fn list_teams(State(state): State<AppState>) -> Result<Json<Vec<Team>>> {
    with_conn(&state.pool, store::list_teams).await.map(Json)
}

#[instrument(skip(state, team))]
async fn create_team(
    State(state): State<AppState>,
    _admin: AdminUser,
    JsonBody(team): JsonBody<NewTeam>,
) -> Result<(StatusCode, Json<Team>)> {
    let team = with_conn(&state.pool, move |conn| store::create_team(conn, team)).await?;
    Ok((StatusCode::CREATED, Json(team)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TeamLogoRequest {
    #[serde(default)]
    logo_url: Option<String>,
}

#[instrument(skip(state, request))]
async fn set_team_logo(
    State(state): State<AppState>,
    _admin: AdminUser,
    PathParam(team_id): PathParam<i32>,
    JsonBody(request): JsonBody<TeamLogoRequest>,
) -> Result<Json<Team>> {
    with_conn(&state.pool, move |conn| {
        store::update_team_logo(conn, team_id, request.logo_url)
    })
    .await
    .map(Json)
}

// Matches

#[derive(Debug, Deserialize)]
struct MatchQuery {
    status: Option<String>,
}

async fn list_matches(
    State(state): State<AppState>,
    Query(query): Query<MatchQuery>,
) -> Result<Json<Vec<MatchDetails>>> {
    let status = query
        .status
        .map(|status| status.parse::<MatchStatus>())
        .transpose()
        .map_err(Error::Validation)?;
    with_conn(&state.pool, move |conn| store::list_match_details(conn, status))
        .await
        .map(Json)
}

async fn get_match(
    State(state): State<AppState>,
    PathParam(match_id): PathParam<i32>,
) -> Result<Json<MatchDetails>> {
    with_conn(&state.pool, move |conn| store::get_match_details(conn, match_id))
        .await?
        .map(Json)
        .ok_or(Error::not_found("Match", match_id))
}

#[instrument(skip(state, new_match))]
async fn create_match(
    State(state): State<AppState>,
    _admin: AdminUser,
    JsonBody(new_match): JsonBody<NewMatch>,
) -> Result<(StatusCode, Json<Match>)> {
    let created = with_conn(&state.pool, move |conn| store::create_match(conn, new_match)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip(state, edit))]
async fn edit_match(
    State(state): State<AppState>,
    _admin: AdminUser,
    PathParam(match_id): PathParam<i32>,
    JsonBody(edit): JsonBody<MatchEdit>,
) -> Result<Json<Match>> {
    with_conn(&state.pool, move |conn| {
        store::update_match(conn, match_id, edit.into())
    })
    .await
    .map(Json)
}

#[instrument(skip(state))]
async fn delete_match(
    State(state): State<AppState>,
    _admin: AdminUser,
    PathParam(match_id): PathParam<i32>,
) -> Result<StatusCode> {
    with_conn(&state.pool, move |conn| store::delete_match(conn, match_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
async fn start(
    State(state): State<AppState>,
    _admin: AdminUser,
    PathParam(match_id): PathParam<i32>,
) -> Result<Json<Match>> {
    with_conn(&state.pool, move |conn| start_match(conn, match_id))
        .await
        .map(Json)
}

#[instrument(skip(state, result))]
async fn record_result(
    State(state): State<AppState>,
    _admin: AdminUser,
    PathParam(match_id): PathParam<i32>,
    JsonBody(result): JsonBody<MatchResult>,
) -> Result<Json<ScoredMatch>> {
    with_conn(&state.pool, move |conn| record_match_result(conn, match_id, result))
        .await
        .map(Json)
}

// Predictions

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PredictionRequest {
    match_id: i32,
    #[serde(default)]
    predicted_toss_winner_id: Option<i32>,
    #[serde(default)]
    predicted_match_winner_id: Option<i32>,
}

async fn my_predictions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<PredictionDetails>>> {
    with_conn(&state.pool, move |conn| {
        store::list_user_prediction_details(conn, user.id)
    })
    .await
    .map(Json)
}

#[instrument(skip(state, user), fields(user_id = user.id))]
async fn predict(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(request): JsonBody<PredictionRequest>,
) -> Result<(StatusCode, Json<Prediction>)> {
    let submission = with_conn(&state.pool, move |conn| {
        submit_prediction(
            conn,
            user.id,
            request.match_id,
            request.predicted_toss_winner_id,
            request.predicted_match_winner_id,
        )
    })
    .await?;
    let status = if submission.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(submission.prediction)))
}

async fn all_predictions(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<Prediction>>> {
    with_conn(&state.pool, |conn| {
        store::list_predictions(conn, PredictionFilter::default())
    })
    .await
    .map(Json)
}

// Leaderboard and ledger

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    timeframe: Option<String>,
}

async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>> {
    let timeframe = query
        .timeframe
        .as_deref()
        .map(Timeframe::from_query)
        .unwrap_or_default();
    with_conn(&state.pool, move |conn| get_leaderboard(conn, timeframe))
        .await
        .map(Json)
}

async fn my_ledger(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<PointsLedgerEntry>>> {
    with_conn(&state.pool, move |conn| store::list_ledger(conn, Some(user.id)))
        .await
        .map(Json)
}

// Users

async fn list_users(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<User>>> {
    with_conn(&state.pool, store::list_users).await.map(Json)
}

#[instrument(skip(state, changes))]
async fn update_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    PathParam(user_id): PathParam<i32>,
    JsonBody(changes): JsonBody<UserChanges>,
) -> Result<Json<User>> {
    with_conn(&state.pool, move |conn| store::update_user(conn, user_id, changes))
        .await
        .map(Json)
}

#[instrument(skip(state))]
async fn delete_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    PathParam(user_id): PathParam<i32>,
) -> Result<StatusCode> {
    with_conn(&state.pool, move |conn| store::delete_user(conn, user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Settings

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingRequest {
    value: String,
}

async fn get_setting(
    State(state): State<AppState>,
    PathParam(key): PathParam<String>,
) -> Result<Json<Option<SiteSetting>>> {
    with_conn(&state.pool, move |conn| store::get_setting(conn, &key))
        .await
        .map(Json)
}

#[instrument(skip(state, request))]
async fn put_setting(
    State(state): State<AppState>,
    _admin: AdminUser,
    PathParam(key): PathParam<String>,
    JsonBody(request): JsonBody<SettingRequest>,
) -> Result<Json<SiteSetting>> {
    with_conn(&state.pool, move |conn| {
        store::put_setting(conn, &key, &request.value)
    })
    .await
    .map(Json)
}
