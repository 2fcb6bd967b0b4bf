use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use pitchside::docstore::{Db, DocumentStore, SqliteStore};
use pitchside::football_api::{parse_fixtures_json, parse_odds_json, parse_standings_json};
use pitchside::leaderboard::{FinalScore, recompute_points};
use pitchside::navigation::{Navigator, Screen, params};
use pitchside::predictions::{score_prediction, submit_prediction};
use pitchside::proxy::{cache_policy, parse_query};
use pitchside::rules::Session;
use pitchside::state::{AppState, Delta, apply_delta};

fn bench_fixtures_parse(c: &mut Criterion) {
    c.bench_function("fixtures_parse", |b| {
        b.iter(|| {
            let rows = parse_fixtures_json(black_box(FIXTURES_JSON)).unwrap();
            black_box(rows.len());
        })
    });
}

fn bench_standings_parse(c: &mut Criterion) {
    c.bench_function("standings_parse", |b| {
        b.iter(|| {
            let rows = parse_standings_json(black_box(STANDINGS_JSON)).unwrap();
            black_box(rows.len());
        })
    });
}

fn bench_odds_parse(c: &mut Criterion) {
    c.bench_function("odds_parse", |b| {
        b.iter(|| {
            let odds = parse_odds_json(black_box(ODDS_JSON)).unwrap();
            black_box(odds.map(|o| o.markets.len()));
        })
    });
}

fn bench_fixtures_delta(c: &mut Criterion) {
    let base = parse_fixtures_json(FIXTURES_JSON).expect("valid fixture json");
    let date = Utc
        .with_ymd_and_hms(2025, 5, 25, 0, 0, 0)
        .unwrap()
        .date_naive();
    // A busy match day: a few hundred fixtures in scrambled order.
    let fixtures: Vec<_> = (0..300u32)
        .flat_map(|i| {
            base.iter().cloned().map(move |mut f| {
                f.id = f.id * 1000 + i;
                f.kickoff = f
                    .kickoff
                    .map(|k| k + ChronoDuration::minutes(i64::from((i * 37) % 600)));
                f
            })
        })
        .collect();

    c.bench_function("fixtures_delta_apply", |b| {
        b.iter(|| {
            let mut state = AppState::new(date);
            apply_delta(
                &mut state,
                Delta::SetFixtures {
                    date,
                    fixtures: black_box(fixtures.clone()),
                },
            );
            black_box(state.fixtures.len());
        })
    });
}

fn bench_navigation(c: &mut Criterion) {
    c.bench_function("navigation_push_pop", |b| {
        b.iter(|| {
            let t0 = Instant::now();
            let mut nav = Navigator::new(Screen::Matches);
            for i in 0..50u32 {
                nav.navigate(Screen::MatchDetail, params([("fixture", i.to_string())]), t0);
                nav.navigate(Screen::Comments, params([("fixture", i.to_string())]), t0);
            }
            for step in 0..100u64 {
                let now = t0 + Duration::from_secs(step + 1);
                nav.go_back(now);
                nav.tick(now + Duration::from_secs(1));
            }
            black_box(nav.len());
        })
    });
}

fn bench_cache_policy(c: &mut Criterion) {
    let queries = [
        ("fixtures", "date=2025-05-25&timezone=Asia/Baghdad"),
        ("fixtures", "id=1208021"),
        ("odds", "fixture=1208021&bookmaker=8"),
        ("standings", "league=39&season=2024"),
        ("players/profiles", "search=ronaldo"),
    ];
    c.bench_function("proxy_cache_policy", |b| {
        b.iter(|| {
            for (route, raw) in queries {
                let params = parse_query(black_box(raw));
                black_box(cache_policy(route, &params));
            }
        })
    });
}

fn bench_scoring(c: &mut Criterion) {
    c.bench_function("score_prediction_grid", |b| {
        b.iter(|| {
            let mut total = 0u32;
            for h in 0..8u8 {
                for a in 0..8u8 {
                    total += score_prediction(black_box((h, a)), black_box((2, 1)));
                }
            }
            black_box(total);
        })
    });
}

fn bench_recompute(c: &mut Criterion) {
    let store: Arc<dyn DocumentStore> =
        Arc::new(SqliteStore::open_in_memory().expect("in-memory store"));
    let kickoff = Utc.with_ymd_and_hms(2025, 5, 25, 15, 0, 0).unwrap();
    let before = kickoff - ChronoDuration::hours(1);
    for u in 0..100u32 {
        let db = Db::new(
            Arc::clone(&store),
            Session::user(format!("user{u}"), format!("User {u}")),
        );
        for fixture in 1..=5u32 {
            let score = ((u % 4) as u8, ((u + fixture) % 3) as u8);
            submit_prediction(&db, fixture, kickoff, score, before).expect("submit");
        }
    }
    let admin = Db::new(store, Session::admin("bench", "Bench"));
    let mut flip = 0u8;

    c.bench_function("recompute_points_500", |b| {
        b.iter(|| {
            // Alternate results so every run has points to move.
            flip ^= 1;
            let results: Vec<FinalScore> = (1..=5u32)
                .map(|fixture_id| FinalScore {
                    fixture_id,
                    home_goals: 2,
                    away_goals: flip,
                })
                .collect();
            let report = recompute_points(&admin, black_box(&results)).unwrap();
            black_box(report.predictions_updated);
        })
    });
}

criterion_group!(
    perf,
    bench_fixtures_parse,
    bench_standings_parse,
    bench_odds_parse,
    bench_fixtures_delta,
    bench_navigation,
    bench_cache_policy,
    bench_scoring,
    bench_recompute
);
criterion_main!(perf);

static FIXTURES_JSON: &str = include_str!("../tests/fixtures/fixtures_by_date.json");
static STANDINGS_JSON: &str = include_str!("../tests/fixtures/standings.json");
static ODDS_JSON: &str = include_str!("../tests/fixtures/odds.json");
