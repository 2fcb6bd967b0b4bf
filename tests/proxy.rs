use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use warp::http::StatusCode;

use pitchside::config::ProxyConfig;
use pitchside::proxy::{
    CachePolicy, EDGE_CACHE_ENTRIES, ProxyState, Upstream, cache_policy, parse_query, routes,
};

#[derive(Clone, Default)]
struct FakeUpstream {
    calls: Arc<AtomicUsize>,
    urls: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl FakeUpstream {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn urls(&self) -> Vec<String> {
        self.urls.lock().expect("urls").clone()
    }
}

impl Upstream for FakeUpstream {
    fn fetch(&self, url: String) -> impl Future<Output = Result<String>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().expect("urls").push(url.clone());
        let result = if self.fail {
            Err(anyhow!("connection refused"))
        } else if url.starts_with("https://history.test") {
            Ok(json!([{"odd": "2.10", "at": 1}]).to_string())
        } else {
            Ok(json!({"get": url, "response": []}).to_string())
        };
        async move { result }
    }
}

fn config(history: Option<&str>) -> ProxyConfig {
    ProxyConfig {
        api_base: "https://api.test".to_string(),
        api_key: Some("secret".to_string()),
        odds_history_base: history.map(str::to_string),
        port: 0,
    }
}

fn header<'a>(response: &'a warp::http::Response<warp::hyper::body::Bytes>, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[test]
fn date_listings_are_never_cached() {
    let params = parse_query("date=2025-05-25&timezone=UTC");
    let policy = cache_policy("fixtures", &params);
    assert_eq!(policy, CachePolicy::NoStore);
    assert_eq!(policy.header_value(), "no-store");
    assert!(!policy.header_value().contains("revalidate"));
    assert!(policy.ttl().is_none());
}

#[test]
fn live_routes_get_a_short_window_and_the_rest_an_hour() {
    assert_eq!(
        cache_policy("fixtures", &parse_query("id=55")),
        CachePolicy::Revalidate(60)
    );
    assert_eq!(
        cache_policy("odds", &parse_query("fixture=55")),
        CachePolicy::Revalidate(60)
    );
    let standings = cache_policy("standings", &parse_query("league=39&season=2024"));
    assert_eq!(standings, CachePolicy::Revalidate(3600));
    assert_eq!(
        standings.header_value(),
        "public, s-maxage=3600, stale-while-revalidate=3600"
    );
}

#[tokio::test]
async fn fixtures_by_date_always_reach_upstream() {
    let upstream = FakeUpstream::default();
    let state = Arc::new(ProxyState::new(upstream.clone(), &config(None)));
    let api = routes(Arc::clone(&state));

    for _ in 0..2 {
        let response = warp::test::request()
            .path("/api/football/fixtures?date=2025-05-25")
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "cache-control"), "no-store");
        assert_eq!(header(&response, "x-cache"), "MISS");
    }
    assert_eq!(upstream.calls(), 2);
    assert_eq!(state.cached_entries().await, 0);
    assert_eq!(
        upstream.urls()[0],
        "https://api.test/fixtures?date=2025-05-25"
    );
}

#[tokio::test]
async fn cacheable_routes_are_served_from_the_edge_cache() {
    let upstream = FakeUpstream::default();
    let state = Arc::new(ProxyState::new(upstream.clone(), &config(None)));
    let api = routes(state);

    let first = warp::test::request()
        .path("/api/football/standings?league=39&season=2024")
        .reply(&api)
        .await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header(&first, "x-cache"), "MISS");
    assert_eq!(header(&first, "content-type"), "application/json");
    assert!(header(&first, "cache-control").contains("s-maxage=3600"));

    let second = warp::test::request()
        .path("/api/football/standings?league=39&season=2024")
        .reply(&api)
        .await;
    assert_eq!(header(&second, "x-cache"), "HIT");
    assert_eq!(second.body(), first.body());
    assert_eq!(upstream.calls(), 1);

    // A different query is a different cache entry.
    warp::test::request()
        .path("/api/football/standings?league=140&season=2024")
        .reply(&api)
        .await;
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test]
async fn odds_carry_history_when_configured() {
    let upstream = FakeUpstream::default();
    let state = Arc::new(ProxyState::new(
        upstream.clone(),
        &config(Some("https://history.test/odds")),
    ));
    let api = routes(state);

    let response = warp::test::request()
        .path("/api/football/odds?fixture=1035")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(response.body()).expect("json body");
    assert_eq!(body["history"][0]["odd"], json!("2.10"));
    assert!(
        upstream
            .urls()
            .contains(&"https://history.test/odds?fixture=1035&bookmaker=8&bet=1".to_string())
    );
}

#[tokio::test]
async fn odds_history_is_null_without_a_source() {
    let upstream = FakeUpstream::default();
    let state = Arc::new(ProxyState::new(upstream.clone(), &config(None)));
    let api = routes(state);

    let response = warp::test::request()
        .path("/api/football/odds?fixture=1035&bookmaker=6")
        .reply(&api)
        .await;
    let body: Value = serde_json::from_slice(response.body()).expect("json body");
    assert!(body.get("history").is_some_and(Value::is_null));
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn upstream_failure_is_a_bad_gateway() {
    let upstream = FakeUpstream::failing();
    let state = Arc::new(ProxyState::new(upstream.clone(), &config(None)));
    let api = routes(Arc::clone(&state));

    let response = warp::test::request()
        .path("/api/football/teams?league=39&season=2024")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(header(&response, "cache-control"), "no-store");
    let body: Value = serde_json::from_slice(response.body()).expect("json body");
    assert_eq!(body["route"], json!("teams"));
    assert_eq!(state.cached_entries().await, 0);
}

#[tokio::test]
async fn empty_route_is_not_found_and_health_answers() {
    let upstream = FakeUpstream::default();
    let api = routes(Arc::new(ProxyState::new(upstream.clone(), &config(None))));

    let missing = warp::test::request()
        .path("/api/football/")
        .reply(&api)
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(upstream.calls(), 0);

    let health = warp::test::request().path("/api/health").reply(&api).await;
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(health.body().as_ref(), b"OK");
}

#[tokio::test]
async fn edge_cache_stays_bounded_under_distinct_queries() {
    let upstream = FakeUpstream::default();
    let state = Arc::new(ProxyState::new(upstream.clone(), &config(None)));
    let api = routes(Arc::clone(&state));

    for i in 0..EDGE_CACHE_ENTRIES + 50 {
        let response = warp::test::request()
            .path(&format!("/api/football/teams?search=x{i}"))
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(state.cached_entries().await, EDGE_CACHE_ENTRIES);

    // The newest query is still a hit.
    let last = format!("/api/football/teams?search=x{}", EDGE_CACHE_ENTRIES + 49);
    let response = warp::test::request().path(&last).reply(&api).await;
    assert_eq!(header(&response, "x-cache"), "HIT");
}
