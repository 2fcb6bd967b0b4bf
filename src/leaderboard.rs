use std::collections::BTreeSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::docstore::{Db, FieldUpdate};
use crate::errors::StoreError;
use crate::predictions::{
    EXACT_SCORE_POINTS, Prediction, fixture_prediction_docs, score_prediction, user_predictions,
};

pub const LEADERBOARD: &str = "leaderboard";
pub const DAILY_PICKS: &str = "dailyGlobalPredictions";

/// Final score of a fixture that has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalScore {
    pub fixture_id: u32,
    pub home_goals: u8,
    pub away_goals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub display_name: String,
    pub total_points: u32,
    pub predictions_count: u32,
    #[serde(default)]
    pub exact_scores: u32,
    #[serde(default)]
    pub updated_at: i64,
}

impl LeaderboardEntry {
    fn same_totals(&self, other: &LeaderboardEntry) -> bool {
        self.total_points == other.total_points
            && self.predictions_count == other.predictions_count
            && self.exact_scores == other.exact_scores
            && self.display_name == other.display_name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecomputeReport {
    pub fixtures_scored: usize,
    pub predictions_checked: usize,
    pub predictions_updated: usize,
    pub leaderboard_updated: usize,
}

/// Re-scores every prediction on the given finished fixtures and refreshes
/// the leaderboard rows of users whose points moved.
///
/// Only predictions whose stored points differ are written, so a second run
/// over the same results writes nothing.
pub fn recompute_points(db: &Db, results: &[FinalScore]) -> Result<RecomputeReport, StoreError> {
    let mut report = RecomputeReport::default();
    let mut touched_users = BTreeSet::new();

    for result in results {
        let predictions = fixture_prediction_docs(db, result.fixture_id)?;
        report.fixtures_scored += 1;
        for (path, prediction) in predictions {
            report.predictions_checked += 1;
            let points = score_prediction(
                (prediction.home_goals, prediction.away_goals),
                (result.home_goals, result.away_goals),
            );
            if prediction.points == Some(points) {
                continue;
            }
            db.update(&path, &[FieldUpdate::set("points", Value::from(points))])?;
            report.predictions_updated += 1;
            touched_users.insert(prediction.user_id);
        }
    }

    for uid in &touched_users {
        if refresh_leaderboard_entry(db, uid)? {
            report.leaderboard_updated += 1;
        }
    }

    tracing::info!(
        fixtures = report.fixtures_scored,
        checked = report.predictions_checked,
        updated = report.predictions_updated,
        leaderboard = report.leaderboard_updated,
        "points recomputed"
    );
    Ok(report)
}

/// Sums a user's scored predictions into their leaderboard row.
/// Returns false when the stored row already matched.
pub fn refresh_leaderboard_entry(db: &Db, uid: &str) -> Result<bool, StoreError> {
    let predictions = user_predictions(db, uid)?;
    let entry = build_entry(db, uid, &predictions)?;
    let path = format!("{LEADERBOARD}/{uid}");
    if let Some(existing) = db.get_as::<LeaderboardEntry>(&path)?
        && existing.same_totals(&entry)
    {
        return Ok(false);
    }
    db.set(&path, &entry, false)?;
    Ok(true)
}

fn build_entry(
    db: &Db,
    uid: &str,
    predictions: &[Prediction],
) -> Result<LeaderboardEntry, StoreError> {
    let total_points = predictions.iter().filter_map(|p| p.points).sum();
    let exact_scores = predictions
        .iter()
        .filter(|p| p.points == Some(EXACT_SCORE_POINTS))
        .count() as u32;
    let display_name = profile_name(db, uid)?
        .or_else(|| predictions.iter().find_map(|p| p.display_name.clone()))
        .unwrap_or_else(|| uid.to_string());

    Ok(LeaderboardEntry {
        user_id: uid.to_string(),
        display_name,
        total_points,
        predictions_count: predictions.len() as u32,
        exact_scores,
        updated_at: Utc::now().timestamp_millis(),
    })
}

fn profile_name(db: &Db, uid: &str) -> Result<Option<String>, StoreError> {
    let profile = db.get(&format!("users/{uid}"))?;
    Ok(profile
        .as_ref()
        .and_then(|p| p.get("displayName"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string()))
}

/// Ranked rows, best first. Ties go to more exact scores, then name.
pub fn top_entries(db: &Db, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
    let docs = db.list(LEADERBOARD)?;
    let mut entries: Vec<LeaderboardEntry> = docs
        .iter()
        .filter_map(|doc| doc.decode().ok())
        .collect();
    entries.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then(b.exact_scores.cmp(&a.exact_scores))
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
    entries.truncate(limit);
    Ok(entries)
}

/// 1-based rank of `uid`, if they have a row.
pub fn rank_of(entries: &[LeaderboardEntry], uid: &str) -> Option<usize> {
    entries.iter().position(|e| e.user_id == uid).map(|i| i + 1)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DailyPicks {
    pub date: String,
    #[serde(default)]
    pub fixture_ids: Vec<u32>,
}

pub fn daily_picks(db: &Db, date: &str) -> Result<DailyPicks, StoreError> {
    Ok(db
        .get_as::<DailyPicks>(&format!("{DAILY_PICKS}/{date}"))?
        .unwrap_or_else(|| DailyPicks {
            date: date.to_string(),
            fixture_ids: Vec::new(),
        }))
}
