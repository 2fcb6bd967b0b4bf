use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};

use pitchside::docstore::{Db, DocumentStore, SqliteStore};
use pitchside::football_api::FootballApi;
use pitchside::provider::{Provider, season_for};
use pitchside::rules::Session;
use pitchside::state::{Delta, ProviderCommand};

fn provider(session: Session) -> Provider {
    let store: Arc<dyn DocumentStore> =
        Arc::new(SqliteStore::open_in_memory().expect("in-memory store"));
    // Never reached by the commands below.
    let api = FootballApi::new("http://127.0.0.1:9/api/football");
    Provider::new(api, Db::new(store, session))
}

fn logs(deltas: &[Delta]) -> Vec<&str> {
    deltas
        .iter()
        .filter_map(|d| match d {
            Delta::Log(line) => Some(line.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn seasons_start_in_july() {
    let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).expect("date");
    assert_eq!(season_for(day(2025, 5, 25)), 2024);
    assert_eq!(season_for(day(2025, 7, 1)), 2025);
    assert_eq!(season_for(day(2025, 12, 31)), 2025);
}

#[test]
fn late_predictions_come_back_as_a_warning() {
    let mut provider = provider(Session::user("alice", "Alice"));
    let deltas = provider.handle(ProviderCommand::SubmitPrediction {
        fixture_id: 5,
        kickoff: Utc::now() - Duration::minutes(1),
        score: (1, 0),
    });
    assert_eq!(logs(&deltas), vec!["[WARN] Predictions close at kickoff"]);
}

#[test]
fn open_predictions_are_saved_and_listed() {
    let mut provider = provider(Session::user("alice", "Alice"));
    let deltas = provider.handle(ProviderCommand::SubmitPrediction {
        fixture_id: 5,
        kickoff: Utc::now() + Duration::hours(3),
        score: (2, 2),
    });
    assert!(matches!(
        deltas.as_slice(),
        [Delta::PredictionSaved(p)] if p.fixture_id == 5 && p.home_goals == 2
    ));

    let deltas = provider.handle(ProviderCommand::FetchMyPredictions);
    assert!(matches!(deltas.as_slice(), [Delta::SetPredictions(list)] if list.len() == 1));
}

#[test]
fn guests_get_no_predictions_and_cannot_comment() {
    let mut provider = provider(Session::guest());
    let deltas = provider.handle(ProviderCommand::FetchMyPredictions);
    assert!(matches!(deltas.as_slice(), [Delta::SetPredictions(list)] if list.is_empty()));

    let deltas = provider.handle(ProviderCommand::PostComment {
        fixture_id: 1,
        text: "hello".to_string(),
    });
    assert_eq!(logs(&deltas), vec!["[WARN] Sign in and type something to comment"]);
    assert!(deltas.iter().any(
        |d| matches!(d, Delta::SetComments { fixture_id: 1, comments } if comments.is_empty())
    ));
}

#[test]
fn posted_comments_are_returned_with_likes() {
    let mut provider = provider(Session::user("alice", "Alice"));
    let deltas = provider.handle(ProviderCommand::PostComment {
        fixture_id: 3,
        text: "Great save".to_string(),
    });
    let Some(Delta::SetComments { comments, .. }) = deltas.last() else {
        panic!("expected comments, got {deltas:?}");
    };
    assert_eq!(comments.len(), 1);
    let comment_id = comments[0].id.clone();

    let deltas = provider.handle(ProviderCommand::ToggleLike {
        fixture_id: 3,
        comment_id,
    });
    let Some(Delta::SetComments { comments, .. }) = deltas.last() else {
        panic!("expected comments, got {deltas:?}");
    };
    assert_eq!(comments[0].like_count, 1);
}

#[test]
fn daily_pick_toggles_on_and_off() {
    let mut provider = provider(Session::admin("root", "Root"));
    let date = NaiveDate::from_ymd_opt(2025, 5, 25).expect("date");
    let picks = |deltas: &[Delta]| {
        deltas.iter().find_map(|d| match d {
            Delta::SetAdmin(view) => Some(view.picks.fixture_ids.clone()),
            _ => None,
        })
    };

    let on = provider.handle(ProviderCommand::ToggleDailyPick {
        date,
        fixture_id: 77,
    });
    assert_eq!(picks(&on), Some(vec![77]));
    let off = provider.handle(ProviderCommand::ToggleDailyPick {
        date,
        fixture_id: 77,
    });
    assert_eq!(picks(&off), Some(Vec::new()));
}

#[test]
fn non_admin_pins_are_refused() {
    let mut provider = provider(Session::user("alice", "Alice"));
    let deltas = provider.handle(ProviderCommand::TogglePin {
        fixture_id: 9,
        label: "Iraq v Jordan".to_string(),
    });
    assert!(logs(&deltas).iter().any(|l| l.starts_with("[WARN] Pin not saved")));
    assert!(
        deltas
            .iter()
            .any(|d| matches!(d, Delta::SetAdmin(view) if view.pinned.is_empty()))
    );
}
