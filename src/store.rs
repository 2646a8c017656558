//! Entity store: plain CRUD over the league tables.
//!
//! Reads return `Ok(None)` for a missing row and leave it to the caller to decide whether that is
//! an error. Updates and deletes of a missing row fail with [`Error::NotFound`]. Nothing here
//! scores, locks or otherwise enforces lifecycle rules.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::SqliteConnection;
use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::model::{
    Match, MatchChanges, MatchDetails, MatchStatus, NewLedgerEntry, NewMatch, NewPrediction,
    NewSiteSetting, NewTeam, NewUser, PointsLedgerEntry, Prediction, PredictionChanges,
    PredictionDetails, PredictionFilter, SiteSetting, Team, User, UserChanges,
};
use crate::schema::{matches, points_ledger, predictions, site_settings, teams, users};

fn unique_violation(err: DieselError, message: &str) -> Error {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            Error::Validation(message.to_string())
        }
        other => other.into(),
    }
}

// Users

/// Fetches a user by id.
pub fn get_user(conn: &mut SqliteConnection, user_id: i32) -> Result<Option<User>> {
    Ok(users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()?)
}

/// Looks a user up by name. The column is `COLLATE NOCASE`, so the comparison ignores case.
pub fn get_user_by_username(conn: &mut SqliteConnection, username: &str) -> Result<Option<User>> {
    Ok(users::table
        .filter(users::username.eq(username))
        .select(User::as_select())
        .first(conn)
        .optional()?)
}

/// Returns every user in id order.
pub fn list_users(conn: &mut SqliteConnection) -> Result<Vec<User>> {
    Ok(users::table
        .order(users::id.asc())
        .select(User::as_select())
        .load(conn)?)
}

/// Inserts a new account. Errors with `Validation` if the username is blank or already taken
/// (in any letter case).
pub fn create_user(conn: &mut SqliteConnection, new_user: NewUser) -> Result<User> {
    if new_user.username.trim().is_empty() {
        return Err(Error::Validation("Username must not be empty".to_string()));
    }
    if new_user.password_hash.is_empty() {
        return Err(Error::Validation("Password hash must not be empty".to_string()));
    }
    diesel::insert_into(users::table)
        .values(&new_user)
        .returning(User::as_returning())
        .get_result(conn)
        .map_err(|e| unique_violation(e, "Username already exists"))
}

/// Applies a partial profile update. An empty change set returns the current row untouched.
/// Errors if the user doesn't exist.
pub fn update_user(conn: &mut SqliteConnection, user_id: i32, changes: UserChanges) -> Result<User> {
    if changes == UserChanges::default() {
        return get_user(conn, user_id)?.ok_or(Error::not_found("User", user_id));
    }
    diesel::update(users::table.find(user_id))
        .set(&changes)
        .returning(User::as_returning())
        .get_result(conn)
        .optional()?
        .ok_or(Error::not_found("User", user_id))
}

/// Deletes the user row only. Their predictions and ledger entries stay behind.
pub fn delete_user(conn: &mut SqliteConnection, user_id: i32) -> Result<()> {
    let deleted = diesel::delete(users::table.find(user_id)).execute(conn)?;
    if deleted == 0 {
        return Err(Error::not_found("User", user_id));
    }
    Ok(())
}

/// Adds `delta` to the user's running total. Returns false when the user does not exist.
pub fn increment_user_points(conn: &mut SqliteConnection, user_id: i32, delta: i32) -> Result<bool> {
    let updated = diesel::update(users::table.find(user_id))
        .set(users::points.eq(users::points + delta))
        .execute(conn)?;
    Ok(updated == 1)
}

// Teams

/// Fetches a team by id.
pub fn get_team(conn: &mut SqliteConnection, team_id: i32) -> Result<Option<Team>> {
    Ok(teams::table
        .find(team_id)
        .select(Team::as_select())
        .first(conn)
        .optional()?)
}

/// Returns all teams in id order.
pub fn list_teams(conn: &mut SqliteConnection) -> Result<Vec<Team>> {
    Ok(teams::table
        .order(teams::id.asc())
        .select(Team::as_select())
        .load(conn)?)
}

/// Adds a team. The name must not be blank.
pub fn create_team(conn: &mut SqliteConnection, new_team: NewTeam) -> Result<Team> {
    if new_team.name.trim().is_empty() {
        return Err(Error::Validation("Team name must not be empty".to_string()));
    }
    Ok(diesel::insert_into(teams::table)
        .values(&new_team)
        .returning(Team::as_returning())
        .get_result(conn)?)
}

/// Sets or clears the logo URL of a team.
pub fn update_team_logo(
    conn: &mut SqliteConnection,
    team_id: i32,
    logo_url: Option<String>,
) -> Result<Team> {
    diesel::update(teams::table.find(team_id))
        .set(teams::logo_url.eq(logo_url))
        .returning(Team::as_returning())
        .get_result(conn)
        .optional()?
        .ok_or(Error::not_found("Team", team_id))
}

// Matches

/// Fetches a match by id.
pub fn get_match(conn: &mut SqliteConnection, match_id: i32) -> Result<Option<Match>> {
    Ok(matches::table
        .find(match_id)
        .select(Match::as_select())
        .first(conn)
        .optional()?)
}

fn status_rank(status: MatchStatus) -> u8 {
    match status {
        MatchStatus::Ongoing => 0,
        MatchStatus::Upcoming => 1,
        MatchStatus::Completed => 2,
    }
}

/// Ongoing first, then upcoming soonest first, then the rest most recent first.
fn fixture_order(a: &Match, b: &Match) -> Ordering {
    status_rank(a.status)
        .cmp(&status_rank(b.status))
        .then_with(|| match a.status {
            MatchStatus::Upcoming => a.match_date.cmp(&b.match_date),
            _ => b.match_date.cmp(&a.match_date),
        })
        .then_with(|| a.id.cmp(&b.id))
}

/// Lists matches, optionally of one status. Ongoing matches come first, then upcoming ones
/// soonest first, then completed ones most recent first.
pub fn list_matches(
    conn: &mut SqliteConnection,
    status: Option<MatchStatus>,
) -> Result<Vec<Match>> {
    let mut query = matches::table.select(Match::as_select()).into_boxed();
    if let Some(status) = status {
        query = query.filter(matches::status.eq(status));
    }
    let mut fixtures: Vec<Match> = query.load(conn)?;
    fixtures.sort_by(fixture_order);
    Ok(fixtures)
}

/// Inserts a fixture after checking that it names two distinct, existing teams.
pub fn create_match(conn: &mut SqliteConnection, new_match: NewMatch) -> Result<Match> {
    if new_match.team1_id == new_match.team2_id {
        return Err(Error::Validation(
            "A match needs two different teams".to_string(),
        ));
    }
    for team_id in [new_match.team1_id, new_match.team2_id] {
        if get_team(conn, team_id)?.is_none() {
            return Err(Error::not_found("Team", team_id));
        }
    }
    Ok(diesel::insert_into(matches::table)
        .values(&new_match)
        .returning(Match::as_returning())
        .get_result(conn)?)
}

/// Applies a field-level update to a match and returns the new row. Errors if the match doesn't
/// exist.
pub fn update_match(
    conn: &mut SqliteConnection,
    match_id: i32,
    changes: MatchChanges,
) -> Result<Match> {
    if changes == MatchChanges::default() {
        return get_match(conn, match_id)?.ok_or(Error::not_found("Match", match_id));
    }
    diesel::update(matches::table.find(match_id))
        .set(&changes)
        .returning(Match::as_returning())
        .get_result(conn)
        .optional()?
        .ok_or(Error::not_found("Match", match_id))
}

/// Deletes a match together with every prediction made for it.
pub fn delete_match(conn: &mut SqliteConnection, match_id: i32) -> Result<()> {
    conn.immediate_transaction(|conn| {
        diesel::delete(predictions::table.filter(predictions::match_id.eq(match_id)))
            .execute(conn)?;
        let deleted = diesel::delete(matches::table.find(match_id)).execute(conn)?;
        if deleted == 0 {
            return Err(Error::not_found("Match", match_id));
        }
        Ok(())
    })
}

fn require_team(conn: &mut SqliteConnection, team_id: i32) -> Result<Team> {
    get_team(conn, team_id)?.ok_or(Error::not_found("Team", team_id))
}

fn optional_team(conn: &mut SqliteConnection, team_id: Option<i32>) -> Result<Option<Team>> {
    match team_id {
        Some(id) => get_team(conn, id),
        None => Ok(None),
    }
}

fn populate_match(conn: &mut SqliteConnection, fixture: Match) -> Result<MatchDetails> {
    let team1 = require_team(conn, fixture.team1_id)?;
    let team2 = require_team(conn, fixture.team2_id)?;
    let toss_winner = optional_team(conn, fixture.toss_winner_id)?;
    let match_winner = optional_team(conn, fixture.match_winner_id)?;
    Ok(MatchDetails {
        fixture,
        team1,
        team2,
        toss_winner,
        match_winner,
    })
}

/// Fetches a match with its team rows filled in.
pub fn get_match_details(conn: &mut SqliteConnection, match_id: i32) -> Result<Option<MatchDetails>> {
    match get_match(conn, match_id)? {
        Some(fixture) => populate_match(conn, fixture).map(Some),
        None => Ok(None),
    }
}

/// Same as [`list_matches`], with team rows filled in.
pub fn list_match_details(
    conn: &mut SqliteConnection,
    status: Option<MatchStatus>,
) -> Result<Vec<MatchDetails>> {
    list_matches(conn, status)?
        .into_iter()
        .map(|fixture| populate_match(conn, fixture))
        .collect()
}

/// Marks the match as scored unless it already is. Returns whether this call took the claim.
pub fn claim_match_scoring(
    conn: &mut SqliteConnection,
    match_id: i32,
    at: NaiveDateTime,
) -> Result<bool> {
    let claimed = diesel::update(
        matches::table
            .find(match_id)
            .filter(matches::points_awarded_at.is_null()),
    )
    .set(matches::points_awarded_at.eq(Some(at)))
    .execute(conn)?;
    Ok(claimed == 1)
}

// Predictions

/// Fetches a prediction by id.
pub fn get_prediction(conn: &mut SqliteConnection, prediction_id: i32) -> Result<Option<Prediction>> {
    Ok(predictions::table
        .find(prediction_id)
        .select(Prediction::as_select())
        .first(conn)
        .optional()?)
}

/// Finds the prediction a user made for a match, if any.
pub fn find_prediction(
    conn: &mut SqliteConnection,
    user_id: i32,
    match_id: i32,
) -> Result<Option<Prediction>> {
    Ok(predictions::table
        .filter(predictions::user_id.eq(user_id))
        .filter(predictions::match_id.eq(match_id))
        .select(Prediction::as_select())
        .first(conn)
        .optional()?)
}

/// Lists predictions matching the filter, oldest first.
pub fn list_predictions(
    conn: &mut SqliteConnection,
    filter: PredictionFilter,
) -> Result<Vec<Prediction>> {
    let mut query = predictions::table
        .select(Prediction::as_select())
        .order(predictions::id.asc())
        .into_boxed();
    if let Some(user_id) = filter.user_id {
        query = query.filter(predictions::user_id.eq(user_id));
    }
    if let Some(match_id) = filter.match_id {
        query = query.filter(predictions::match_id.eq(match_id));
    }
    Ok(query.load(conn)?)
}

/// Predictions created at or after `since`, or all of them when `since` is `None`.
pub fn list_predictions_since(
    conn: &mut SqliteConnection,
    since: Option<NaiveDateTime>,
) -> Result<Vec<Prediction>> {
    let mut query = predictions::table
        .select(Prediction::as_select())
        .order(predictions::id.asc())
        .into_boxed();
    if let Some(since) = since {
        query = query.filter(predictions::created_at.ge(since));
    }
    Ok(query.load(conn)?)
}

/// Inserts a fresh prediction stamped with the current time and no points.
pub fn create_prediction(
    conn: &mut SqliteConnection,
    user_id: i32,
    match_id: i32,
    predicted_toss_winner_id: Option<i32>,
    predicted_match_winner_id: Option<i32>,
) -> Result<Prediction> {
    let new_prediction = NewPrediction {
        user_id,
        match_id,
        predicted_toss_winner_id,
        predicted_match_winner_id,
        created_at: Utc::now().naive_utc(),
        points_earned: 0,
    };
    diesel::insert_into(predictions::table)
        .values(&new_prediction)
        .returning(Prediction::as_returning())
        .get_result(conn)
        .map_err(|e| unique_violation(e, "A prediction for this match already exists"))
}

/// Inserts a prediction, or on a `(user_id, match_id)` conflict overwrites only the two picks.
/// `created_at` and `points_earned` of an existing row are left alone.
pub fn upsert_prediction(
    conn: &mut SqliteConnection,
    user_id: i32,
    match_id: i32,
    predicted_toss_winner_id: Option<i32>,
    predicted_match_winner_id: Option<i32>,
) -> Result<Prediction> {
    let new_prediction = NewPrediction {
        user_id,
        match_id,
        predicted_toss_winner_id,
        predicted_match_winner_id,
        created_at: Utc::now().naive_utc(),
        points_earned: 0,
    };
    Ok(diesel::insert_into(predictions::table)
        .values(&new_prediction)
        .on_conflict((predictions::user_id, predictions::match_id))
        .do_update()
        .set((
            predictions::predicted_toss_winner_id.eq(predicted_toss_winner_id),
            predictions::predicted_match_winner_id.eq(predicted_match_winner_id),
        ))
        .returning(Prediction::as_returning())
        .get_result(conn)?)
}

/// Applies a partial update to a prediction.
pub fn update_prediction(
    conn: &mut SqliteConnection,
    prediction_id: i32,
    changes: PredictionChanges,
) -> Result<Prediction> {
    if changes == PredictionChanges::default() {
        return get_prediction(conn, prediction_id)?
            .ok_or(Error::not_found("Prediction", prediction_id));
    }
    diesel::update(predictions::table.find(prediction_id))
        .set(&changes)
        .returning(Prediction::as_returning())
        .get_result(conn)
        .optional()?
        .ok_or(Error::not_found("Prediction", prediction_id))
}

fn prediction_status_rank(status: MatchStatus) -> u8 {
    match status {
        MatchStatus::Upcoming => 0,
        MatchStatus::Ongoing => 1,
        MatchStatus::Completed => 2,
    }
}

/// A user's predictions joined with their fixtures, upcoming first and then by match date.
/// Predictions whose match no longer exists are skipped.
pub fn list_user_prediction_details(
    conn: &mut SqliteConnection,
    user_id: i32,
) -> Result<Vec<PredictionDetails>> {
    let user_predictions = list_predictions(
        conn,
        PredictionFilter {
            user_id: Some(user_id),
            match_id: None,
        },
    )?;

    let mut details = Vec::with_capacity(user_predictions.len());
    for prediction in user_predictions {
        let Some(fixture) = get_match_details(conn, prediction.match_id)? else {
            continue;
        };
        let predicted_toss_winner = optional_team(conn, prediction.predicted_toss_winner_id)?;
        let predicted_match_winner = optional_team(conn, prediction.predicted_match_winner_id)?;
        details.push(PredictionDetails {
            prediction,
            fixture,
            predicted_toss_winner,
            predicted_match_winner,
        });
    }

    details.sort_by(|a, b| {
        prediction_status_rank(a.fixture.fixture.status)
            .cmp(&prediction_status_rank(b.fixture.fixture.status))
            .then_with(|| a.fixture.fixture.match_date.cmp(&b.fixture.fixture.match_date))
    });
    Ok(details)
}

// Points ledger

/// Appends one ledger row. There is intentionally no update or delete counterpart.
pub fn append_ledger_entry(
    conn: &mut SqliteConnection,
    entry: NewLedgerEntry,
) -> Result<PointsLedgerEntry> {
    Ok(diesel::insert_into(points_ledger::table)
        .values(&entry)
        .returning(PointsLedgerEntry::as_returning())
        .get_result(conn)?)
}

/// Ledger entries, newest first, optionally for a single user.
pub fn list_ledger(
    conn: &mut SqliteConnection,
    user_id: Option<i32>,
) -> Result<Vec<PointsLedgerEntry>> {
    let mut query = points_ledger::table
        .select(PointsLedgerEntry::as_select())
        .order((points_ledger::timestamp.desc(), points_ledger::id.desc()))
        .into_boxed();
    if let Some(user_id) = user_id {
        query = query.filter(points_ledger::user_id.eq(user_id));
    }
    Ok(query.load(conn)?)
}

// Site settings

/// Reads a site setting by key.
pub fn get_setting(conn: &mut SqliteConnection, key: &str) -> Result<Option<SiteSetting>> {
    Ok(site_settings::table
        .filter(site_settings::key.eq(key))
        .select(SiteSetting::as_select())
        .first(conn)
        .optional()?)
}

/// Creates or overwrites a site setting.
pub fn put_setting(conn: &mut SqliteConnection, key: &str, value: &str) -> Result<SiteSetting> {
    let now = Utc::now().naive_utc();
    Ok(diesel::insert_into(site_settings::table)
        .values(&NewSiteSetting {
            key,
            value,
            updated_at: now,
        })
        .on_conflict(site_settings::key)
        .do_update()
        .set((site_settings::value.eq(value), site_settings::updated_at.eq(now)))
        .returning(SiteSetting::as_returning())
        .get_result(conn)?)
}
