//! Scoring of completed matches.
//!
//! A correct toss pick and a correct match winner pick are worth one point each. Each scored
//! prediction credits the user's running total and appends one ledger row carrying the same delta.
//! A match is scored at most once: the pass claims the match before touching any prediction.

use chrono::Utc;
use diesel::{Connection, SqliteConnection};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{Error, Result};
use crate::model::{
    Match, MatchChanges, MatchStatus, NewLedgerEntry, PointsLedgerEntry, Prediction,
    PredictionChanges, PredictionFilter,
};
use crate::store;

pub const TOSS_POINTS: i32 = 1;
pub const MATCH_WINNER_POINTS: i32 = 1;

const TOSS_REASON: &str = "Correct toss prediction";
const MATCH_WINNER_REASON: &str = "Correct match prediction";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictionScore {
    pub toss_correct: bool,
    pub match_winner_correct: bool,
}

impl PredictionScore {
    pub fn points(&self) -> i32 {
        let mut points = 0;
        if self.toss_correct {
            points += TOSS_POINTS;
        }
        if self.match_winner_correct {
            points += MATCH_WINNER_POINTS;
        }
        points
    }

    /// Human readable list of the picks that were right, for the ledger.
    pub fn reason(&self) -> String {
        let mut reasons = Vec::new();
        if self.toss_correct {
            reasons.push(TOSS_REASON);
        }
        if self.match_winner_correct {
            reasons.push(MATCH_WINNER_REASON);
        }
        reasons.join(", ")
    }
}

pub fn score_prediction(
    prediction: &Prediction,
    toss_winner_id: i32,
    match_winner_id: i32,
) -> PredictionScore {
    PredictionScore {
        toss_correct: prediction.predicted_toss_winner_id == Some(toss_winner_id),
        match_winner_correct: prediction.predicted_match_winner_id == Some(match_winner_id),
    }
}

/// Summary of one scoring pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringReport {
    pub match_id: i32,
    /// True when the match had been scored before and this pass changed nothing.
    pub already_scored: bool,
    pub predictions_scored: usize,
    pub predictions_rewarded: usize,
    pub points_awarded: i32,
    /// Users whose predictions earned points but who no longer exist.
    pub skipped_users: Vec<i32>,
}

/// Admin input for closing a match.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MatchResult {
    pub toss_winner_id: i32,
    pub match_winner_id: i32,
    #[serde(default)]
    pub team1_score: Option<String>,
    #[serde(default)]
    pub team2_score: Option<String>,
    #[serde(default)]
    pub result_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredMatch {
    #[serde(rename = "match")]
    pub fixture: Match,
    pub scoring: ScoringReport,
}

/// Scores every prediction of a completed match, in a single transaction.
///
/// Fails with `InvalidState` unless the match is completed with both winners recorded. Calling it
/// again for a match that was already scored is a no-op.
#[instrument(skip(conn))]
pub fn calculate_points(conn: &mut SqliteConnection, match_id: i32) -> Result<ScoringReport> {
    conn.immediate_transaction(|conn| score_match(conn, match_id))
}

fn score_match(conn: &mut SqliteConnection, match_id: i32) -> Result<ScoringReport> {
    let fixture = store::get_match(conn, match_id)?.ok_or(Error::not_found("Match", match_id))?;
    let (toss_winner_id, match_winner_id) =
        match (fixture.status, fixture.toss_winner_id, fixture.match_winner_id) {
            (MatchStatus::Completed, Some(toss), Some(winner)) => (toss, winner),
            _ => {
                return Err(Error::InvalidState(format!(
                    "Match with id {} is not completed",
                    match_id
                )))
            }
        };

    let mut report = ScoringReport {
        match_id,
        ..Default::default()
    };

    if !store::claim_match_scoring(conn, match_id, Utc::now().naive_utc())? {
        info!(match_id, "match already scored");
        report.already_scored = true;
        return Ok(report);
    }

    let match_predictions = store::list_predictions(
        conn,
        PredictionFilter {
            user_id: None,
            match_id: Some(match_id),
        },
    )?;

    for prediction in match_predictions {
        report.predictions_scored += 1;
        let score = score_prediction(&prediction, toss_winner_id, match_winner_id);
        let points = score.points();
        if points == 0 {
            continue;
        }

        store::update_prediction(
            conn,
            prediction.id,
            PredictionChanges {
                points_earned: Some(points),
                ..Default::default()
            },
        )?;

        match add_points_to_user(conn, prediction.user_id, points, match_id, &score.reason())? {
            Some(_) => {
                report.predictions_rewarded += 1;
                report.points_awarded += points;
            }
            None => report.skipped_users.push(prediction.user_id),
        }
    }

    info!(
        match_id,
        scored = report.predictions_scored,
        rewarded = report.predictions_rewarded,
        points = report.points_awarded,
        "match scored"
    );
    Ok(report)
}

/// Credits `points` to a user and appends the matching ledger row.
///
/// A user that does not exist is skipped with a warning and `Ok(None)`, so that one missing
/// account never aborts scoring for everyone else.
pub fn add_points_to_user(
    conn: &mut SqliteConnection,
    user_id: i32,
    points: i32,
    match_id: i32,
    reason: &str,
) -> Result<Option<PointsLedgerEntry>> {
    conn.transaction(|conn| {
        if !store::increment_user_points(conn, user_id, points)? {
            warn!(user_id, match_id, points, "user not found, points not awarded");
            return Ok(None);
        }
        let entry = store::append_ledger_entry(
            conn,
            NewLedgerEntry {
                user_id,
                match_id,
                points,
                reason: reason.to_string(),
                timestamp: Utc::now().naive_utc(),
            },
        )?;
        Ok(Some(entry))
    })
}

/// Stores the final result of a match, marks it completed and scores it, all in one transaction.
///
/// Both winners must be one of the two teams. A match that is already completed keeps its result:
/// recording again fails with `InvalidState`.
#[instrument(skip(conn, result))]
pub fn record_match_result(
    conn: &mut SqliteConnection,
    match_id: i32,
    result: MatchResult,
) -> Result<ScoredMatch> {
    conn.immediate_transaction(|conn| {
        let fixture =
            store::get_match(conn, match_id)?.ok_or(Error::not_found("Match", match_id))?;

        if fixture.status == MatchStatus::Completed {
            return Err(Error::InvalidState(format!(
                "Result for match {} has already been recorded",
                match_id
            )));
        }
        for team_id in [result.toss_winner_id, result.match_winner_id] {
            if !fixture.involves(team_id) {
                return Err(Error::InvalidSelection(format!(
                    "Team {} is not playing in match {}",
                    team_id, match_id
                )));
            }
        }

        store::update_match(
            conn,
            match_id,
            MatchChanges {
                status: Some(MatchStatus::Completed),
                toss_winner_id: Some(Some(result.toss_winner_id)),
                match_winner_id: Some(Some(result.match_winner_id)),
                team1_score: result.team1_score.map(Some),
                team2_score: result.team2_score.map(Some),
                result_summary: result.result_summary.map(Some),
                ..Default::default()
            },
        )?;

        let scoring = score_match(conn, match_id)?;
        let fixture =
            store::get_match(conn, match_id)?.ok_or(Error::not_found("Match", match_id))?;
        Ok(ScoredMatch { fixture, scoring })
    })
}

/// Moves an upcoming match to ongoing, which closes it for predictions.
#[instrument(skip(conn))]
pub fn start_match(conn: &mut SqliteConnection, match_id: i32) -> Result<Match> {
    conn.immediate_transaction(|conn| {
        let fixture =
            store::get_match(conn, match_id)?.ok_or(Error::not_found("Match", match_id))?;
        if fixture.status != MatchStatus::Upcoming {
            return Err(Error::InvalidState(
                "Only upcoming matches can be changed to ongoing".to_string(),
            ));
        }
        store::update_match(
            conn,
            match_id,
            MatchChanges {
                status: Some(MatchStatus::Ongoing),
                ..Default::default()
            },
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::submit_prediction;
    use crate::test_support::{create_match, create_user, test_connection};
    use chrono::NaiveDateTime;
    use rstest::rstest;

    fn prediction(toss: Option<i32>, winner: Option<i32>) -> Prediction {
        Prediction {
            id: 1,
            user_id: 1,
            match_id: 1,
            predicted_toss_winner_id: toss,
            predicted_match_winner_id: winner,
            created_at: NaiveDateTime::default(),
            points_earned: 0,
        }
    }

    fn result(toss_winner_id: i32, match_winner_id: i32) -> MatchResult {
        MatchResult {
            toss_winner_id,
            match_winner_id,
            team1_score: Some("287/6".to_string()),
            team2_score: Some("251".to_string()),
            result_summary: Some("Won by 36 runs".to_string()),
        }
    }

    #[rstest]
    #[case(Some(1), Some(2), 2, "Correct toss prediction, Correct match prediction")]
    #[case(Some(1), Some(1), 1, "Correct toss prediction")]
    #[case(Some(2), Some(2), 1, "Correct match prediction")]
    #[case(Some(2), Some(1), 0, "")]
    #[case(None, None, 0, "")]
    #[case(None, Some(2), 1, "Correct match prediction")]
    fn test_score_prediction(
        #[case] toss: Option<i32>,
        #[case] winner: Option<i32>,
        #[case] points: i32,
        #[case] reason: &str,
    ) {
        // Toss won by team 1, match won by team 2.
        let score = score_prediction(&prediction(toss, winner), 1, 2);
        assert_eq!(score.points(), points);
        assert_eq!(score.reason(), reason);
    }

    #[test]
    fn test_toss_right_match_wrong_scenario() {
        let mut conn = test_connection();
        let user = create_user(&mut conn, "sachin");
        let fixture = create_match(&mut conn, "India", "Australia");
        let (india, australia) = (fixture.team1_id, fixture.team2_id);

        let submission =
            submit_prediction(&mut conn, user.id, fixture.id, Some(india), Some(australia)).unwrap();

        let scored = record_match_result(&mut conn, fixture.id, result(india, india)).unwrap();
        assert_eq!(scored.fixture.status, MatchStatus::Completed);
        assert_eq!(scored.fixture.toss_winner_id, Some(india));
        assert_eq!(scored.fixture.result_summary.as_deref(), Some("Won by 36 runs"));
        assert_eq!(scored.scoring.points_awarded, 1);
        assert_eq!(scored.scoring.predictions_rewarded, 1);

        let prediction = store::get_prediction(&mut conn, submission.prediction.id)
            .unwrap()
            .unwrap();
        assert_eq!(prediction.points_earned, 1);

        let user = store::get_user(&mut conn, user.id).unwrap().unwrap();
        assert_eq!(user.points, 1);

        let ledger = store::list_ledger(&mut conn, Some(user.id)).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].points, 1);
        assert_eq!(ledger[0].match_id, fixture.id);
        assert_eq!(ledger[0].reason, "Correct toss prediction");
    }

    #[test]
    fn test_all_right_and_all_wrong() {
        let mut conn = test_connection();
        let right = create_user(&mut conn, "rahul");
        let wrong = create_user(&mut conn, "shreyas");
        let fixture = create_match(&mut conn, "England", "New Zealand");
        let (england, new_zealand) = (fixture.team1_id, fixture.team2_id);

        submit_prediction(&mut conn, right.id, fixture.id, Some(new_zealand), Some(england)).unwrap();
        submit_prediction(&mut conn, wrong.id, fixture.id, Some(england), Some(new_zealand)).unwrap();

        let scored = record_match_result(&mut conn, fixture.id, result(new_zealand, england)).unwrap();
        assert_eq!(scored.scoring.predictions_scored, 2);
        assert_eq!(scored.scoring.predictions_rewarded, 1);
        assert_eq!(scored.scoring.points_awarded, 2);

        let right_pick = store::find_prediction(&mut conn, right.id, fixture.id).unwrap().unwrap();
        let wrong_pick = store::find_prediction(&mut conn, wrong.id, fixture.id).unwrap().unwrap();
        assert_eq!(right_pick.points_earned, 2);
        assert_eq!(wrong_pick.points_earned, 0);

        assert_eq!(store::get_user(&mut conn, right.id).unwrap().unwrap().points, 2);
        assert_eq!(store::get_user(&mut conn, wrong.id).unwrap().unwrap().points, 0);
        assert!(store::list_ledger(&mut conn, Some(wrong.id)).unwrap().is_empty());

        let ledger = store::list_ledger(&mut conn, Some(right.id)).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(
            ledger[0].reason,
            "Correct toss prediction, Correct match prediction"
        );
    }

    #[test]
    fn test_calculate_points_is_idempotent() {
        let mut conn = test_connection();
        let user = create_user(&mut conn, "yuzvendra");
        let fixture = create_match(&mut conn, "South Africa", "West Indies");
        submit_prediction(
            &mut conn,
            user.id,
            fixture.id,
            Some(fixture.team1_id),
            Some(fixture.team1_id),
        )
        .unwrap();
        record_match_result(&mut conn, fixture.id, result(fixture.team1_id, fixture.team1_id))
            .unwrap();

        let rerun = calculate_points(&mut conn, fixture.id).unwrap();
        assert!(rerun.already_scored);
        assert_eq!(rerun.points_awarded, 0);

        assert_eq!(store::get_user(&mut conn, user.id).unwrap().unwrap().points, 2);
        assert_eq!(store::list_ledger(&mut conn, Some(user.id)).unwrap().len(), 1);
        let prediction = store::find_prediction(&mut conn, user.id, fixture.id).unwrap().unwrap();
        assert_eq!(prediction.points_earned, 2);
    }

    #[test]
    fn test_calculate_points_requires_completed_result() {
        let mut conn = test_connection();
        let fixture = create_match(&mut conn, "Pakistan", "Bangladesh");

        let err = calculate_points(&mut conn, fixture.id).expect_err("Should fail");
        assert!(matches!(err, Error::InvalidState(_)));

        // Completed but without winners is still not scorable.
        store::update_match(
            &mut conn,
            fixture.id,
            MatchChanges {
                status: Some(MatchStatus::Completed),
                toss_winner_id: Some(Some(fixture.team1_id)),
                ..Default::default()
            },
        )
        .unwrap();
        let err = calculate_points(&mut conn, fixture.id).expect_err("Should fail");
        assert!(matches!(err, Error::InvalidState(_)));

        let err = calculate_points(&mut conn, 999).expect_err("Should fail");
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_calculate_points_after_manual_completion() {
        let mut conn = test_connection();
        let user = create_user(&mut conn, "mohammed");
        let fixture = create_match(&mut conn, "Sri Lanka", "Afghanistan");
        submit_prediction(&mut conn, user.id, fixture.id, None, Some(fixture.team2_id)).unwrap();
        store::update_match(
            &mut conn,
            fixture.id,
            MatchChanges {
                status: Some(MatchStatus::Completed),
                toss_winner_id: Some(Some(fixture.team1_id)),
                match_winner_id: Some(Some(fixture.team2_id)),
                ..Default::default()
            },
        )
        .unwrap();

        let report = calculate_points(&mut conn, fixture.id).unwrap();
        assert!(!report.already_scored);
        assert_eq!(report.points_awarded, 1);

        // Re-reading the predictions shows exactly what was computed.
        let predictions = store::list_predictions(
            &mut conn,
            PredictionFilter {
                user_id: None,
                match_id: Some(fixture.id),
            },
        )
        .unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].points_earned, 1);
    }

    #[test]
    fn test_missing_user_does_not_stop_scoring() {
        let mut conn = test_connection();
        let gone = create_user(&mut conn, "dinesh");
        let kept = create_user(&mut conn, "ishan");
        let fixture = create_match(&mut conn, "India", "West Indies");
        let india = fixture.team1_id;
        submit_prediction(&mut conn, gone.id, fixture.id, Some(india), Some(india)).unwrap();
        submit_prediction(&mut conn, kept.id, fixture.id, Some(india), Some(india)).unwrap();
        store::delete_user(&mut conn, gone.id).unwrap();

        let scored = record_match_result(&mut conn, fixture.id, result(india, india)).unwrap();
        assert_eq!(scored.scoring.skipped_users, vec![gone.id]);
        assert_eq!(scored.scoring.predictions_rewarded, 1);
        assert_eq!(store::get_user(&mut conn, kept.id).unwrap().unwrap().points, 2);
        assert!(store::list_ledger(&mut conn, Some(gone.id)).unwrap().is_empty());
    }

    #[test]
    fn test_add_points_to_missing_user_is_noop() {
        let mut conn = test_connection();
        let entry = add_points_to_user(&mut conn, 999, 2, 1, "Correct toss prediction").unwrap();
        assert!(entry.is_none());
        assert!(store::list_ledger(&mut conn, None).unwrap().is_empty());
    }

    #[test]
    fn test_record_match_result_validation() {
        let mut conn = test_connection();
        let fixture = create_match(&mut conn, "India", "Pakistan");
        let outsider = crate::test_support::team(&mut conn, "England");

        let err = record_match_result(&mut conn, fixture.id, result(outsider.id, fixture.team1_id))
            .expect_err("Should fail");
        assert!(matches!(err, Error::InvalidSelection(_)));
        let untouched = store::get_match(&mut conn, fixture.id).unwrap().unwrap();
        assert_eq!(untouched.status, MatchStatus::Upcoming);

        record_match_result(&mut conn, fixture.id, result(fixture.team1_id, fixture.team1_id))
            .unwrap();
        let err = record_match_result(&mut conn, fixture.id, result(fixture.team2_id, fixture.team2_id))
            .expect_err("Should fail");
        assert!(matches!(err, Error::InvalidState(_)));

        let completed = store::get_match(&mut conn, fixture.id).unwrap().unwrap();
        assert_eq!(completed.match_winner_id, Some(fixture.team1_id));

        let err = record_match_result(&mut conn, 999, result(1, 2)).expect_err("Should fail");
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_start_match_locks_predictions() {
        let mut conn = test_connection();
        let user = create_user(&mut conn, "arshdeep");
        let fixture = create_match(&mut conn, "Australia", "England");

        let started = start_match(&mut conn, fixture.id).unwrap();
        assert_eq!(started.status, MatchStatus::Ongoing);

        let err = submit_prediction(&mut conn, user.id, fixture.id, Some(fixture.team1_id), None)
            .expect_err("Should fail");
        assert!(matches!(err, Error::InvalidState(_)));

        let err = start_match(&mut conn, fixture.id).expect_err("Should fail");
        assert!(matches!(err, Error::InvalidState(_)));

        // An ongoing match can still be completed.
        let scored =
            record_match_result(&mut conn, fixture.id, result(fixture.team1_id, fixture.team2_id))
                .unwrap();
        assert_eq!(scored.fixture.status, MatchStatus::Completed);
        assert_eq!(scored.scoring.predictions_scored, 0);
    }
}
