//! Ranked standings over a rolling time window.
//!
//! The sort key is the user's lifetime point total. The two accuracy columns only count
//! predictions created inside the window: `total_matches` is the number of predictions made
//! (finished or not) and `correct_predictions` is the sum of their `points_earned`.

use chrono::{Duration, NaiveDateTime, Utc};
use diesel::SqliteConnection;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::instrument;

use crate::error::Result;
use crate::store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Timeframe {
    #[serde(rename = "weekly")]
    Weekly,
    #[serde(rename = "monthly")]
    Monthly,
    #[default]
    #[serde(rename = "all-time")]
    AllTime,
}

impl Timeframe {
    /// Parses a query value. Anything other than `weekly` or `monthly` means all-time.
    pub fn from_query(value: &str) -> Self {
        match value {
            "weekly" => Timeframe::Weekly,
            "monthly" => Timeframe::Monthly,
            _ => Timeframe::AllTime,
        }
    }

    pub fn window_start(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Timeframe::Weekly => Some(now - Duration::days(7)),
            Timeframe::Monthly => Some(now - Duration::days(30)),
            Timeframe::AllTime => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: i32,
    pub username: String,
    pub display_name: Option<String>,
    pub profile_image: Option<String>,
    pub points: i32,
    pub correct_predictions: i32,
    pub total_matches: i32,
}

fn standing_order(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.points
        .cmp(&a.points)
        .then_with(|| b.correct_predictions.cmp(&a.correct_predictions))
        .then_with(|| a.id.cmp(&b.id))
}

/// Orders entries by lifetime points, then windowed correct predictions, then user id.
pub fn rank(entries: &mut [LeaderboardEntry]) {
    entries.sort_by(standing_order);
}

#[instrument(skip(conn))]
pub fn get_leaderboard(
    conn: &mut SqliteConnection,
    timeframe: Timeframe,
) -> Result<Vec<LeaderboardEntry>> {
    leaderboard_at(conn, timeframe, Utc::now().naive_utc())
}

/// Builds the leaderboard as seen at `now`.
pub fn leaderboard_at(
    conn: &mut SqliteConnection,
    timeframe: Timeframe,
    now: NaiveDateTime,
) -> Result<Vec<LeaderboardEntry>> {
    let users = store::list_users(conn)?;
    let predictions = store::list_predictions_since(conn, timeframe.window_start(now))?;

    // user id -> (points earned in window, predictions made in window)
    let mut stats: HashMap<i32, (i32, i32)> = HashMap::new();
    for prediction in &predictions {
        let entry = stats.entry(prediction.user_id).or_default();
        entry.0 += prediction.points_earned;
        entry.1 += 1;
    }

    let mut entries: Vec<LeaderboardEntry> = users
        .into_iter()
        .map(|user| {
            let (correct_predictions, total_matches) =
                stats.get(&user.id).copied().unwrap_or_default();
            LeaderboardEntry {
                id: user.id,
                username: user.username,
                display_name: user.display_name,
                profile_image: user.profile_image,
                points: user.points,
                correct_predictions,
                total_matches,
            }
        })
        .collect();

    rank(&mut entries);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewPrediction;
    use crate::schema::predictions;
    use crate::test_support::{create_match, create_user, test_connection};
    use diesel::prelude::*;
    use rstest::rstest;

    fn entry(id: i32, points: i32, correct_predictions: i32) -> LeaderboardEntry {
        LeaderboardEntry {
            id,
            username: format!("user{}", id),
            display_name: None,
            profile_image: None,
            points,
            correct_predictions,
            total_matches: 0,
        }
    }

    fn insert_prediction(
        conn: &mut SqliteConnection,
        user_id: i32,
        match_id: i32,
        points_earned: i32,
        created_at: NaiveDateTime,
    ) {
        diesel::insert_into(predictions::table)
            .values(&NewPrediction {
                user_id,
                match_id,
                predicted_toss_winner_id: None,
                predicted_match_winner_id: None,
                created_at,
                points_earned,
            })
            .execute(conn)
            .expect("insert prediction");
    }

    #[rstest]
    #[case("weekly", Timeframe::Weekly)]
    #[case("monthly", Timeframe::Monthly)]
    #[case("all-time", Timeframe::AllTime)]
    #[case("this-year", Timeframe::AllTime)]
    #[case("WEEKLY", Timeframe::AllTime)]
    #[case("", Timeframe::AllTime)]
    fn test_timeframe_from_query(#[case] value: &str, #[case] expected: Timeframe) {
        assert_eq!(Timeframe::from_query(value), expected);
    }

    #[test]
    fn test_rank_breaks_ties_on_windowed_points() {
        let mut entries = vec![entry(3, 5, 1), entry(1, 4, 9), entry(2, 5, 3), entry(4, 5, 1)];
        rank(&mut entries);
        let ids: Vec<i32> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3, 4, 1]);
    }

    #[test]
    fn test_empty_leaderboard() {
        let mut conn = test_connection();
        assert!(get_leaderboard(&mut conn, Timeframe::AllTime).unwrap().is_empty());
    }

    #[test]
    fn test_leaderboard_without_predictions() {
        let mut conn = test_connection();
        let low = create_user(&mut conn, "low");
        let high = create_user(&mut conn, "high");
        store::increment_user_points(&mut conn, high.id, 4).unwrap();

        let board = get_leaderboard(&mut conn, Timeframe::Weekly).unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].id, high.id);
        assert_eq!(board[0].points, 4);
        assert_eq!(board[1].id, low.id);
        assert!(board
            .iter()
            .all(|e| e.correct_predictions == 0 && e.total_matches == 0));
    }

    #[test]
    fn test_leaderboard_windows() {
        let mut conn = test_connection();
        let now = Utc::now().naive_utc();
        let user = create_user(&mut conn, "window");
        let matches: Vec<i32> = (0..3)
            .map(|_| create_match(&mut conn, "India", "Australia").id)
            .collect();

        insert_prediction(&mut conn, user.id, matches[0], 2, now - Duration::days(1));
        insert_prediction(&mut conn, user.id, matches[1], 1, now - Duration::days(10));
        insert_prediction(&mut conn, user.id, matches[2], 1, now - Duration::days(60));
        store::increment_user_points(&mut conn, user.id, 4).unwrap();

        let weekly = leaderboard_at(&mut conn, Timeframe::Weekly, now).unwrap();
        assert_eq!(weekly[0].points, 4);
        assert_eq!(weekly[0].total_matches, 1);
        assert_eq!(weekly[0].correct_predictions, 2);

        let monthly = leaderboard_at(&mut conn, Timeframe::Monthly, now).unwrap();
        assert_eq!(monthly[0].points, 4);
        assert_eq!(monthly[0].total_matches, 2);
        assert_eq!(monthly[0].correct_predictions, 3);

        let all_time = leaderboard_at(&mut conn, Timeframe::AllTime, now).unwrap();
        assert_eq!(all_time[0].points, 4);
        assert_eq!(all_time[0].total_matches, 3);
        assert_eq!(all_time[0].correct_predictions, 4);
    }

    #[test]
    fn test_leaderboard_counts_unfinished_predictions() {
        let mut conn = test_connection();
        let user = create_user(&mut conn, "eager");
        let fixture = create_match(&mut conn, "England", "Pakistan");
        crate::intake::submit_prediction(&mut conn, user.id, fixture.id, None, Some(fixture.team1_id))
            .unwrap();

        let board = get_leaderboard(&mut conn, Timeframe::AllTime).unwrap();
        assert_eq!(board[0].total_matches, 1);
        assert_eq!(board[0].correct_predictions, 0);
    }

    #[test]
    fn test_leaderboard_tie_on_points() {
        let mut conn = test_connection();
        let now = Utc::now().naive_utc();
        let a = create_user(&mut conn, "a");
        let c = create_user(&mut conn, "c");
        let b = create_user(&mut conn, "b");
        let fixture = create_match(&mut conn, "India", "England");
        let other = create_match(&mut conn, "India", "Pakistan");
        for user in [&a, &b, &c] {
            store::increment_user_points(&mut conn, user.id, 5).unwrap();
        }
        insert_prediction(&mut conn, b.id, fixture.id, 2, now);
        insert_prediction(&mut conn, b.id, other.id, 1, now);
        insert_prediction(&mut conn, c.id, fixture.id, 1, now);

        let board = leaderboard_at(&mut conn, Timeframe::AllTime, now).unwrap();
        let ids: Vec<i32> = board.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![b.id, c.id, a.id]);
        assert_eq!(board[0].correct_predictions, 3);
        assert_eq!(board[0].total_matches, 2);
    }
}
