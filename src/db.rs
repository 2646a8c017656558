use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

use crate::error::{Error, Result};
use crate::model::{NewTeam, NewUser, Role};
use crate::schema::{matches, points_ledger, predictions, teams, users};
use crate::store;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

// WAL allows concurrent reads during writes, and the busy timeout retries locked operations.
// busy_timeout goes first so that switching to WAL also waits out a concurrent lock.
const PRAGMAS: &str = "PRAGMA busy_timeout = 10000; \
    PRAGMA foreign_keys = ON; \
    PRAGMA journal_mode = WAL; \
    PRAGMA synchronous = NORMAL;";

const CANONICAL_TEAMS: &[(&str, &str)] = &[
    ("India", "/assets/flags/india.svg"),
    ("Australia", "/assets/flags/australia.svg"),
    ("England", "/assets/flags/england.svg"),
    ("New Zealand", "/assets/flags/new-zealand.svg"),
    ("Pakistan", "/assets/flags/pakistan.svg"),
    ("South Africa", "/assets/flags/south-africa.svg"),
    ("West Indies", "/assets/flags/west-indies.svg"),
    ("Sri Lanka", "/assets/flags/sri-lanka.svg"),
    ("Bangladesh", "/assets/flags/bangladesh.svg"),
    ("Afghanistan", "/assets/flags/afghanistan.svg"),
];

/// Opens a single connection and applies the PRAGMAs. Used by the maintenance binary and tests.
pub fn establish_connection(database_url: &str) -> Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(database_url)
        .map_err(|e| Error::Config(format!("Error connecting to {}: {}", database_url, e)))?;
    conn.batch_execute(PRAGMAS)?;
    Ok(conn)
}

#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(PRAGMAS)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Builds the r2d2 pool used by the server. Every pooled connection gets the same PRAGMAs.
pub fn build_pool(database_url: &str) -> Result<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .connection_customizer(Box::new(SqlitePragmas))
        .build(manager)?;
    Ok(pool)
}

/// Applies any pending embedded migrations.
pub fn run_migrations(conn: &mut SqliteConnection) -> Result<()> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| Error::Migration(e.to_string()))?;
    if !applied.is_empty() {
        info!(count = applied.len(), "applied pending migrations");
    }
    Ok(())
}

/// Seeds the canonical teams when none exist, and the `admin` account when a password hash is
/// configured and the account is missing.
pub fn seed(conn: &mut SqliteConnection, admin_password_hash: Option<&str>) -> Result<()> {
    conn.transaction(|conn| {
        let team_count: i64 = teams::table.count().get_result(conn)?;
        if team_count == 0 {
            for (name, logo) in CANONICAL_TEAMS {
                store::create_team(
                    conn,
                    NewTeam {
                        name: name.to_string(),
                        logo_url: Some(logo.to_string()),
                        is_custom: false,
                    },
                )?;
            }
            info!(count = CANONICAL_TEAMS.len(), "seeded canonical teams");
        }

        if let Some(hash) = admin_password_hash {
            if store::get_user_by_username(conn, "admin")?.is_none() {
                store::create_user(
                    conn,
                    NewUser {
                        username: "admin".to_string(),
                        password_hash: hash.to_string(),
                        display_name: Some("Administrator".to_string()),
                        email: None,
                        profile_image: None,
                        role: Role::Admin,
                    },
                )?;
                info!("seeded admin user");
            }
        }

        Ok(())
    })
}

/// Clears every fixture, prediction and ledger entry, and zeroes all user points. Users, teams
/// and settings are kept.
pub fn reset_database(conn: &mut SqliteConnection) -> Result<()> {
    conn.transaction(|conn| {
        diesel::delete(points_ledger::table).execute(conn)?;
        diesel::delete(predictions::table).execute(conn)?;
        diesel::delete(matches::table).execute(conn)?;
        diesel::update(users::table)
            .set(users::points.eq(0))
            .execute(conn)?;
        info!("database reset");
        Ok(())
    })
}
