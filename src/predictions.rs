use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::debounce::Debouncer;
use crate::docstore::{Db, Document};
use crate::errors::StoreError;

pub const EXACT_SCORE_POINTS: u32 = 3;
pub const CORRECT_OUTCOME_POINTS: u32 = 1;
pub const PREDICTION_DEBOUNCE: Duration = Duration::from_millis(800);
pub const MAX_GOALS: u8 = 30;

pub const PREDICTIONS: &str = "predictions";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub user_id: String,
    pub fixture_id: u32,
    pub home_goals: u8,
    pub away_goals: u8,
    #[serde(default)]
    pub points: Option<u32>,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Milliseconds since the epoch of the last edit.
    pub timestamp: i64,
}

/// What a user is allowed to write; `points` belongs to the admin recompute.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictionWrite<'a> {
    user_id: &'a str,
    fixture_id: u32,
    home_goals: u8,
    away_goals: u8,
    display_name: &'a str,
    timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

pub fn outcome(home: u8, away: u8) -> Outcome {
    match home.cmp(&away) {
        std::cmp::Ordering::Greater => Outcome::Home,
        std::cmp::Ordering::Equal => Outcome::Draw,
        std::cmp::Ordering::Less => Outcome::Away,
    }
}

/// Exact score beats correct outcome; anything else scores nothing.
pub fn score_prediction(predicted: (u8, u8), result: (u8, u8)) -> u32 {
    if predicted == result {
        EXACT_SCORE_POINTS
    } else if outcome(predicted.0, predicted.1) == outcome(result.0, result.1) {
        CORRECT_OUTCOME_POINTS
    } else {
        0
    }
}

pub fn prediction_doc_id(uid: &str, fixture_id: u32) -> String {
    format!("{uid}_{fixture_id}")
}

pub fn prediction_path(uid: &str, fixture_id: u32) -> String {
    format!("{PREDICTIONS}/{}", prediction_doc_id(uid, fixture_id))
}

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("sign in to submit predictions")]
    SignedOut,
    #[error("fixture {0} has already kicked off")]
    Locked(u32),
    #[error("scores must be between 0 and {MAX_GOALS}")]
    InvalidScore,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn is_open(kickoff: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now < kickoff
}

/// Writes the caller's prediction for one fixture.
///
/// The kickoff check only runs here on the client; the store does not know
/// fixture times.
pub fn submit_prediction(
    db: &Db,
    fixture_id: u32,
    kickoff: DateTime<Utc>,
    score: (u8, u8),
    now: DateTime<Utc>,
) -> Result<Prediction, PredictionError> {
    let session = db.session();
    let Some(uid) = session.uid() else {
        return Err(PredictionError::SignedOut);
    };
    if !is_open(kickoff, now) {
        return Err(PredictionError::Locked(fixture_id));
    }
    if score.0 > MAX_GOALS || score.1 > MAX_GOALS {
        return Err(PredictionError::InvalidScore);
    }

    let write = PredictionWrite {
        user_id: uid,
        fixture_id,
        home_goals: score.0,
        away_goals: score.1,
        display_name: session.display_name(),
        timestamp: now.timestamp_millis(),
    };
    let path = prediction_path(uid, fixture_id);
    db.set(&path, &write, true)?;
    tracing::debug!(%path, home = score.0, away = score.1, "prediction saved");

    let stored = db.get_as::<Prediction>(&path)?;
    Ok(stored.unwrap_or(Prediction {
        user_id: uid.to_string(),
        fixture_id,
        home_goals: score.0,
        away_goals: score.1,
        points: None,
        display_name: Some(session.display_name().to_string()),
        timestamp: now.timestamp_millis(),
    }))
}

pub fn load_prediction(
    db: &Db,
    uid: &str,
    fixture_id: u32,
) -> Result<Option<Prediction>, StoreError> {
    db.get_as(&prediction_path(uid, fixture_id))
}

pub fn user_predictions(db: &Db, uid: &str) -> Result<Vec<Prediction>, StoreError> {
    let docs = db.query(PREDICTIONS, "userId", &Value::from(uid))?;
    Ok(keyed(docs).into_iter().map(|(_, p)| p).collect())
}

pub fn fixture_predictions(db: &Db, fixture_id: u32) -> Result<Vec<Prediction>, StoreError> {
    Ok(fixture_prediction_docs(db, fixture_id)?
        .into_iter()
        .map(|(_, p)| p)
        .collect())
}

/// Predictions on one fixture, each next to the path it was read from.
pub fn fixture_prediction_docs(
    db: &Db,
    fixture_id: u32,
) -> Result<Vec<(String, Prediction)>, StoreError> {
    let docs = db.query(PREDICTIONS, "fixtureId", &Value::from(fixture_id))?;
    Ok(keyed(docs))
}

/// Decodes prediction documents, skipping any that are malformed or whose
/// body names a different user or fixture than the document id.
fn keyed(docs: Vec<Document>) -> Vec<(String, Prediction)> {
    docs.into_iter()
        .filter_map(|doc| match doc.decode::<Prediction>() {
            Ok(prediction)
                if doc.path == prediction_path(&prediction.user_id, prediction.fixture_id) =>
            {
                Some((doc.path, prediction))
            }
            Ok(_) => {
                tracing::warn!(path = %doc.path, "prediction body does not match its id, skipped");
                None
            }
            Err(err) => {
                tracing::warn!(path = %doc.path, error = %err, "skipping malformed prediction");
                None
            }
        })
        .collect()
}

/// The two score boxes of one fixture card.
#[derive(Debug, Clone)]
pub struct PredictionInput {
    pub fixture_id: u32,
    pub home: String,
    pub away: String,
    debounce: Debouncer<()>,
}

impl PredictionInput {
    pub fn new(fixture_id: u32) -> Self {
        Self {
            fixture_id,
            home: String::new(),
            away: String::new(),
            debounce: Debouncer::new(PREDICTION_DEBOUNCE),
        }
    }

    pub fn from_stored(stored: &Prediction) -> Self {
        Self {
            home: stored.home_goals.to_string(),
            away: stored.away_goals.to_string(),
            ..Self::new(stored.fixture_id)
        }
    }

    pub fn set_home(&mut self, text: &str, now: Instant) {
        self.home = digits(text);
        self.debounce.push((), now);
    }

    pub fn set_away(&mut self, text: &str, now: Instant) {
        self.away = digits(text);
        self.debounce.push((), now);
    }

    pub fn is_dirty(&self) -> bool {
        self.debounce.is_pending()
    }

    /// The score to write once typing has settled, if it is complete and new.
    pub fn poll_ready(&mut self, now: Instant, stored: Option<&Prediction>) -> Option<(u8, u8)> {
        self.debounce.poll(now)?;
        let home = self.home.parse::<u8>().ok()?;
        let away = self.away.parse::<u8>().ok()?;
        if let Some(stored) = stored
            && stored.home_goals == home
            && stored.away_goals == away
        {
            return None;
        }
        Some((home, away))
    }
}

fn digits(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).take(2).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_input_never_becomes_ready() {
        let t0 = Instant::now();
        let mut input = PredictionInput::new(5);
        input.set_home("2", t0);
        assert_eq!(input.poll_ready(t0 + Duration::from_secs(2), None), None);
    }

    #[test]
    fn digits_strips_everything_else() {
        assert_eq!(digits(" 1a2b3"), "12");
        assert_eq!(digits("-"), "");
    }
}
