//! Prediction intake. Picks are accepted only while a match is upcoming, and only for the two
//! teams playing it.

use diesel::SqliteConnection;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::model::{MatchStatus, Prediction};
use crate::store;

/// Outcome of [`submit_prediction`]: the stored row, and whether it was newly created.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub prediction: Prediction,
    pub created: bool,
}

/// Records a user's toss and match winner picks for an upcoming match.
///
/// A second submission for the same user and match overwrites the picks of the existing row and
/// leaves its `created_at` and `points_earned` alone. The lookup and the write run in one
/// immediate transaction on top of a unique `(user_id, match_id)` index, so concurrent submissions
/// end in a single row holding the last write.
#[instrument(skip(conn))]
pub fn submit_prediction(
    conn: &mut SqliteConnection,
    user_id: i32,
    match_id: i32,
    predicted_toss_winner_id: Option<i32>,
    predicted_match_winner_id: Option<i32>,
) -> Result<Submission> {
    conn.immediate_transaction(|conn| {
        let fixture = store::get_match(conn, match_id)?.ok_or(Error::not_found("Match", match_id))?;

        if fixture.status != MatchStatus::Upcoming {
            return Err(Error::InvalidState(
                "Predictions are closed for this match".to_string(),
            ));
        }

        for team_id in [predicted_toss_winner_id, predicted_match_winner_id]
            .into_iter()
            .flatten()
        {
            if !fixture.involves(team_id) {
                return Err(Error::InvalidSelection(format!(
                    "Team {} is not playing in match {}",
                    team_id, match_id
                )));
            }
        }

        let created = store::find_prediction(conn, user_id, match_id)?.is_none();
        let prediction = store::upsert_prediction(
            conn,
            user_id,
            match_id,
            predicted_toss_winner_id,
            predicted_match_winner_id,
        )?;
        debug!(prediction_id = prediction.id, created, "prediction stored");

        Ok(Submission {
            prediction,
            created,
        })
    })
}
