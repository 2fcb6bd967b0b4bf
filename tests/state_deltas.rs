use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use pitchside::errors::{ErrorChannel, ErrorSink, Operation, StoreError};
use pitchside::football_api::{Fixture, TeamRef};
use pitchside::navigation::{Screen, ScreenParams};
use pitchside::predictions::Prediction;
use pitchside::state::{AppState, Delta, InputMode, SEARCH_DEBOUNCE, SearchResults, apply_delta};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 5, d).expect("valid date")
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 25, hour, 0, 0).unwrap()
}

fn fixture(id: u32, kickoff: Option<DateTime<Utc>>, league: &str) -> Fixture {
    Fixture {
        id,
        kickoff,
        status: "NS".to_string(),
        elapsed: None,
        league_id: 1,
        league_name: league.to_string(),
        round: String::new(),
        home: TeamRef {
            id: id * 10,
            name: format!("Home {id}"),
            logo: String::new(),
        },
        away: TeamRef {
            id: id * 10 + 1,
            name: format!("Away {id}"),
            logo: String::new(),
        },
        home_goals: None,
        away_goals: None,
    }
}

fn prediction(fixture_id: u32, score: (u8, u8)) -> Prediction {
    Prediction {
        user_id: "alice".to_string(),
        fixture_id,
        home_goals: score.0,
        away_goals: score.1,
        points: None,
        display_name: None,
        timestamp: 0,
    }
}

#[test]
fn fixtures_are_sorted_by_kickoff_then_league() {
    let mut state = AppState::new(day(25));
    state.fixtures_loading = true;
    apply_delta(
        &mut state,
        Delta::SetFixtures {
            date: day(25),
            fixtures: vec![
                fixture(3, Some(at(19)), "Serie A"),
                fixture(2, Some(at(15)), "Premier League"),
                fixture(1, Some(at(15)), "La Liga"),
            ],
        },
    );
    let ids: Vec<u32> = state.fixtures.iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(!state.fixtures_loading);
}

#[test]
fn fixtures_for_a_day_already_left_are_dropped() {
    let mut state = AppState::new(day(25));
    state.fixtures_date = day(26);
    apply_delta(
        &mut state,
        Delta::SetFixtures {
            date: day(25),
            fixtures: vec![fixture(1, Some(at(15)), "La Liga")],
        },
    );
    assert!(state.fixtures.is_empty());
}

#[test]
fn refresh_keeps_the_selected_fixture() {
    let mut state = AppState::new(day(25));
    let list = vec![
        fixture(1, Some(at(12)), "A"),
        fixture(2, Some(at(15)), "A"),
        fixture(3, Some(at(19)), "A"),
    ];
    apply_delta(
        &mut state,
        Delta::SetFixtures {
            date: day(25),
            fixtures: list.clone(),
        },
    );
    state.select_next(3);
    state.select_next(3);
    assert_eq!(state.selected_fixture().map(|f| f.id), Some(3));

    let mut refreshed = list;
    refreshed.insert(0, fixture(9, Some(at(10)), "A"));
    apply_delta(
        &mut state,
        Delta::SetFixtures {
            date: day(25),
            fixtures: refreshed,
        },
    );
    assert_eq!(state.selected_fixture().map(|f| f.id), Some(3));
}

#[test]
fn stale_search_results_are_ignored() {
    let t0 = Instant::now();
    let mut state = AppState::new(day(25));
    state.set_search_query("barc", t0);
    assert_eq!(state.poll_search(t0), None);
    assert_eq!(
        state.poll_search(t0 + SEARCH_DEBOUNCE),
        Some("barc".to_string())
    );

    state.set_search_query("barcelona", t0 + Duration::from_secs(1));
    apply_delta(
        &mut state,
        Delta::SetSearch(SearchResults {
            query: "barc".to_string(),
            teams: vec![TeamRef {
                id: 529,
                name: "Barcelona".to_string(),
                logo: String::new(),
            }],
            ..SearchResults::default()
        }),
    );
    assert!(state.search_results.is_empty());
}

#[test]
fn short_queries_clear_results_and_never_fire() {
    let t0 = Instant::now();
    let mut state = AppState::new(day(25));
    state.search_results.query = "real".to_string();
    state.search_results.teams.push(TeamRef::default());

    state.set_search_query("re", t0);
    assert!(state.search_results.is_empty());
    assert_eq!(state.poll_search(t0 + Duration::from_secs(5)), None);
}

#[test]
fn stored_predictions_replace_untouched_inputs_only() {
    let t0 = Instant::now();
    let mut state = AppState::new(day(25));
    state.prediction_input(1);
    state.prediction_input(2).set_home("4", t0);

    apply_delta(
        &mut state,
        Delta::SetPredictions(vec![prediction(1, (2, 0)), prediction(2, (1, 1))]),
    );
    assert!(!state.prediction_inputs.contains_key(&1));
    assert_eq!(state.prediction_input(1).home, "2");
    assert_eq!(state.prediction_input(2).home, "4", "dirty input survives");
}

#[test]
fn settled_inputs_become_submissions_with_kickoff() {
    let t0 = Instant::now();
    let mut state = AppState::new(day(25));
    apply_delta(
        &mut state,
        Delta::SetFixtures {
            date: day(25),
            fixtures: vec![fixture(1, Some(at(15)), "A"), fixture(2, None, "A")],
        },
    );
    for id in [1, 2] {
        let input = state.prediction_input(id);
        input.set_home("1", t0);
        input.set_away("0", t0);
    }

    let ready = state.ready_predictions(t0 + Duration::from_secs(2));
    assert_eq!(ready, vec![(1, at(15), (1, 0))]);
    assert!(
        state
            .logs
            .back()
            .is_some_and(|l| l.contains("No kickoff time for fixture 2"))
    );
}

#[test]
fn saved_prediction_is_logged_and_stored() {
    let mut state = AppState::new(day(25));
    apply_delta(&mut state, Delta::PredictionSaved(prediction(7, (3, 1))));
    assert_eq!(state.predictions.get(&7).map(|p| p.home_goals), Some(3));
    assert_eq!(
        state.logs.back().map(String::as_str),
        Some("[INFO] Prediction saved: 3-1")
    );
}

#[test]
fn console_keeps_the_latest_two_hundred_lines() {
    let mut state = AppState::new(day(25));
    for i in 0..250 {
        apply_delta(&mut state, Delta::Log(format!("[INFO] line {i}")));
    }
    assert_eq!(state.logs.len(), 200);
    assert_eq!(state.logs.front().map(String::as_str), Some("[INFO] line 50"));
}

#[test]
fn store_errors_are_drained_into_the_console() {
    let mut state = AppState::new(day(25));
    let (channel, rx) = ErrorChannel::new();
    channel.report(StoreError::PermissionDenied {
        path: "leaderboard/alice".to_string(),
        operation: Operation::Set,
        payload: None,
    });
    state.drain_errors(&rx);
    assert_eq!(
        state.logs.back().map(String::as_str),
        Some("[WARN] Not allowed: leaderboard/alice")
    );
}

#[test]
fn changing_screens_resets_selection_and_input() {
    let t0 = Instant::now();
    let mut state = AppState::new(day(25));
    state.selected = 4;
    state.input_mode = InputMode::Search;
    state.navigate(Screen::Matches, ScreenParams::new(), t0);
    assert_eq!(state.selected, 4, "same tab keeps its selection");

    state.navigate(Screen::Leaderboard, ScreenParams::new(), t0);
    assert_eq!(state.selected, 0);
    assert_eq!(state.input_mode, InputMode::Normal);
    assert_eq!(state.screen(), Screen::Leaderboard);
}
