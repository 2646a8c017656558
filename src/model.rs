use chrono::NaiveDateTime;
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`) in partial
/// updates.
fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Lifecycle of a fixture. Only moves forward: upcoming, ongoing, completed. A result may be
/// recorded straight from upcoming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    #[default]
    Upcoming,
    Ongoing,
    Completed,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Upcoming => "upcoming",
            MatchStatus::Ongoing => "ongoing",
            MatchStatus::Completed => "completed",
        }
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(MatchStatus::Upcoming),
            "ongoing" => Ok(MatchStatus::Ongoing),
            "completed" => Ok(MatchStatus::Completed),
            other => Err(format!("unknown match status: {}", other)),
        }
    }
}

impl ToSql<Text, Sqlite> for Role {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for Role {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let value = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(value.parse()?)
    }
}

impl ToSql<Text, Sqlite> for MatchStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for MatchStatus {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let value = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(value.parse()?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(Sqlite))]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i32,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub profile_image: Option<String>,
    pub role: Role,
    pub points: i32,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub profile_image: Option<String>,
    pub role: Role,
    // points uses its default
}

/// Profile fields an administrator may change. Points only move through the scoring ledger.
#[derive(AsChangeset, Deserialize, Debug, Clone, Default, PartialEq)]
#[diesel(table_name = crate::schema::users)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserChanges {
    #[serde(default, deserialize_with = "double_option")]
    pub display_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub profile_image: Option<Option<String>>,
    #[serde(default)]
    pub role: Option<Role>,
}

/// Self-service registration. The password arrives already hashed by the authentication layer.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewAccount {
    pub username: String,
    pub password_hash: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl From<NewAccount> for NewUser {
    fn from(account: NewAccount) -> Self {
        NewUser {
            username: account.username.trim().to_string(),
            password_hash: account.password_hash,
            display_name: account.display_name,
            email: account.email,
            profile_image: None,
            role: Role::User,
        }
    }
}

/// The subset of [`UserChanges`] a user may apply to their own profile.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileChanges {
    #[serde(default, deserialize_with = "double_option")]
    pub display_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub profile_image: Option<Option<String>>,
}

impl From<ProfileChanges> for UserChanges {
    fn from(changes: ProfileChanges) -> Self {
        UserChanges {
            display_name: changes.display_name,
            email: changes.email,
            profile_image: changes.profile_image,
            role: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::teams)]
#[diesel(check_for_backend(Sqlite))]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: i32,
    pub name: String,
    pub logo_url: Option<String>,
    pub is_custom: bool,
}

fn custom_team() -> bool {
    true
}

#[derive(Insertable, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::teams)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewTeam {
    pub name: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default = "custom_team")]
    pub is_custom: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::matches)]
#[diesel(check_for_backend(Sqlite))]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: i32,
    pub tournament_name: String,
    pub team1_id: i32,
    pub team2_id: i32,
    pub location: String,
    pub match_date: NaiveDateTime,
    pub status: MatchStatus,
    pub toss_winner_id: Option<i32>,
    pub match_winner_id: Option<i32>,
    pub team1_score: Option<String>,
    pub team2_score: Option<String>,
    pub result_summary: Option<String>,
    #[serde(skip)]
    pub points_awarded_at: Option<NaiveDateTime>,
}

impl Match {
    /// Whether `team_id` is one of the two sides playing this fixture.
    pub fn involves(&self, team_id: i32) -> bool {
        self.team1_id == team_id || self.team2_id == team_id
    }
}

#[derive(Insertable, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::matches)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewMatch {
    pub tournament_name: String,
    pub team1_id: i32,
    pub team2_id: i32,
    pub location: String,
    pub match_date: NaiveDateTime,
    // status starts as the column default, 'upcoming'
}

/// Field-level match update. Storage applies it as given; lifecycle rules live in `scoring`.
#[derive(AsChangeset, Debug, Clone, Default, PartialEq)]
#[diesel(table_name = crate::schema::matches)]
pub struct MatchChanges {
    pub tournament_name: Option<String>,
    pub location: Option<String>,
    pub match_date: Option<NaiveDateTime>,
    pub status: Option<MatchStatus>,
    pub toss_winner_id: Option<Option<i32>>,
    pub match_winner_id: Option<Option<i32>>,
    pub team1_score: Option<Option<String>>,
    pub team2_score: Option<Option<String>>,
    pub result_summary: Option<Option<String>>,
}

/// Schedule fields an admin may edit on an existing match. Teams, status and results are not
/// editable here.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MatchEdit {
    #[serde(default)]
    pub tournament_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub match_date: Option<NaiveDateTime>,
}

impl From<MatchEdit> for MatchChanges {
    fn from(edit: MatchEdit) -> Self {
        MatchChanges {
            tournament_name: edit.tournament_name,
            location: edit.location,
            match_date: edit.match_date,
            ..Default::default()
        }
    }
}

/// A match together with the team rows it references.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDetails {
    #[serde(flatten)]
    pub fixture: Match,
    pub team1: Team,
    pub team2: Team,
    pub toss_winner: Option<Team>,
    pub match_winner: Option<Team>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::predictions)]
#[diesel(check_for_backend(Sqlite))]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub id: i32,
    pub user_id: i32,
    pub match_id: i32,
    pub predicted_toss_winner_id: Option<i32>,
    pub predicted_match_winner_id: Option<i32>,
    pub created_at: NaiveDateTime,
    pub points_earned: i32,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::predictions)]
pub struct NewPrediction {
    pub user_id: i32,
    pub match_id: i32,
    pub predicted_toss_winner_id: Option<i32>,
    pub predicted_match_winner_id: Option<i32>,
    pub created_at: NaiveDateTime,
    pub points_earned: i32,
}

#[derive(AsChangeset, Debug, Clone, Default, PartialEq)]
#[diesel(table_name = crate::schema::predictions)]
pub struct PredictionChanges {
    pub predicted_toss_winner_id: Option<Option<i32>>,
    pub predicted_match_winner_id: Option<Option<i32>>,
    pub points_earned: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PredictionFilter {
    pub user_id: Option<i32>,
    pub match_id: Option<i32>,
}

/// A user's prediction with the fixture and the teams it names.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionDetails {
    #[serde(flatten)]
    pub prediction: Prediction,
    #[serde(rename = "match")]
    pub fixture: MatchDetails,
    pub predicted_toss_winner: Option<Team>,
    pub predicted_match_winner: Option<Team>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::points_ledger)]
#[diesel(check_for_backend(Sqlite))]
#[serde(rename_all = "camelCase")]
pub struct PointsLedgerEntry {
    pub id: i32,
    pub user_id: i32,
    pub match_id: i32,
    pub points: i32,
    pub reason: String,
    pub timestamp: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::points_ledger)]
pub struct NewLedgerEntry {
    pub user_id: i32,
    pub match_id: i32,
    pub points: i32,
    pub reason: String,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::site_settings)]
#[diesel(check_for_backend(Sqlite))]
#[serde(rename_all = "camelCase")]
pub struct SiteSetting {
    pub id: i32,
    pub key: String,
    pub value: String,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::site_settings)]
pub struct NewSiteSetting<'a> {
    pub key: &'a str,
    pub value: &'a str,
    pub updated_at: NaiveDateTime,
}
