pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod intake;
pub mod leaderboard;
pub mod model;
pub mod schema;
pub mod scoring;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use db::{build_pool, establish_connection, reset_database, run_migrations, seed, DbPool};
pub use error::{Error, Result};
pub use intake::{submit_prediction, Submission};
pub use leaderboard::{get_leaderboard, LeaderboardEntry, Timeframe};
pub use scoring::{add_points_to_user, calculate_points, record_match_result, start_match};
