//! Fixtures shared by the unit tests. Every test gets its own in-memory database with the
//! migrations applied and the canonical teams seeded.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::SqliteConnection;

use crate::db::{establish_connection, run_migrations, seed, DbPool};
use crate::model::{Match, NewMatch, NewUser, Role, Team, User};
use crate::schema::teams;
use crate::store;

pub fn test_connection() -> SqliteConnection {
    let mut conn = establish_connection(":memory:").expect("in-memory database");
    run_migrations(&mut conn).expect("migrations");
    seed(&mut conn, None).expect("seed");
    conn
}

pub fn team(conn: &mut SqliteConnection, name: &str) -> Team {
    teams::table
        .filter(teams::name.eq(name))
        .select(Team::as_select())
        .first(conn)
        .expect("seeded team")
}

pub fn create_user(conn: &mut SqliteConnection, username: &str) -> User {
    store::create_user(
        conn,
        NewUser {
            username: username.to_string(),
            password_hash: "not-a-real-hash".to_string(),
            display_name: None,
            email: None,
            profile_image: None,
            role: Role::User,
        },
    )
    .expect("create user")
}

pub fn create_match(conn: &mut SqliteConnection, team1: &str, team2: &str) -> Match {
    create_match_on(conn, team1, team2, Utc::now().naive_utc())
}

pub fn create_match_on(
    conn: &mut SqliteConnection,
    team1: &str,
    team2: &str,
    match_date: NaiveDateTime,
) -> Match {
    let team1 = team(conn, team1);
    let team2 = team(conn, team2);
    store::create_match(
        conn,
        NewMatch {
            tournament_name: "Test Series".to_string(),
            team1_id: team1.id,
            team2_id: team2.id,
            location: "Lord's".to_string(),
            match_date,
        },
    )
    .expect("create match")
}

/// A single-connection pool over one in-memory database, so every request sees the same data.
pub fn test_pool() -> DbPool {
    let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
    let pool = Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .build(manager)
        .expect("test pool");
    let mut conn = pool.get().expect("pooled connection");
    run_migrations(&mut conn).expect("migrations");
    seed(&mut conn, None).expect("seed");
    pool
}
