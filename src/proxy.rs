use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use warp::http::StatusCode;
use warp::path::Tail;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::config::ProxyConfig;
use crate::football_api::API_KEY_HEADER;
use crate::session_cache::TtlCache;

pub const LIVE_TTL_SECS: u64 = 60;
pub const DEFAULT_TTL_SECS: u64 = 3600;
pub const DEFAULT_BOOKMAKER: u32 = 8;
pub const DEFAULT_BET: u32 = 1;
/// Distinct upstream URLs the edge cache holds at once.
pub const EDGE_CACHE_ENTRIES: usize = 2048;

/// Edge caching for one proxied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Never cached anywhere; always fetched fresh.
    NoStore,
    /// Cached for `n` seconds and served stale while revalidating for as long.
    Revalidate(u64),
}

impl CachePolicy {
    pub fn header_value(self) -> String {
        match self {
            CachePolicy::NoStore => "no-store".to_string(),
            CachePolicy::Revalidate(secs) => {
                format!("public, s-maxage={secs}, stale-while-revalidate={secs}")
            }
        }
    }

    pub fn ttl(self) -> Option<Duration> {
        match self {
            CachePolicy::NoStore => None,
            CachePolicy::Revalidate(secs) => Some(Duration::from_secs(secs)),
        }
    }
}

/// Date listings change minute to minute during match days, so they bypass
/// every cache. Other fixture lookups and odds get a short window.
pub fn cache_policy(route: &str, params: &[(String, String)]) -> CachePolicy {
    let head = route.trim_matches('/').split('/').next().unwrap_or_default();
    match head {
        "fixtures" if params.iter().any(|(k, _)| k == "date") => CachePolicy::NoStore,
        "fixtures" | "odds" => CachePolicy::Revalidate(LIVE_TTL_SECS),
        _ => CachePolicy::Revalidate(DEFAULT_TTL_SECS),
    }
}

pub fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Where proxied requests go. Implementations return the body of a 2xx
/// response and an error for anything else.
pub trait Upstream: Send + Sync + 'static {
    fn fetch(&self, url: String) -> impl Future<Output = Result<String>> + Send;
}

pub struct ReqwestUpstream {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl ReqwestUpstream {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("pitchside-proxy/0.1")
            .build()
            .context("build upstream client")?;
        Ok(Self { client, api_key })
    }
}

impl Upstream for ReqwestUpstream {
    fn fetch(&self, url: String) -> impl Future<Output = Result<String>> + Send {
        let mut request = self.client.get(&url);
        if let Some(key) = self.api_key.as_deref() {
            request = request.header(API_KEY_HEADER, key);
        }
        async move {
            let response = request
                .send()
                .await
                .with_context(|| format!("request failed for {url}"))?;
            let status = response.status();
            let body = response.text().await.context("read upstream body")?;
            if !status.is_success() {
                return Err(anyhow!("upstream returned {status} for {url}"));
            }
            Ok(body)
        }
    }
}

pub struct ProxyState<U> {
    upstream: U,
    api_base: String,
    odds_history_base: Option<String>,
    cache: RwLock<TtlCache<String>>,
}

impl<U: Upstream> ProxyState<U> {
    pub fn new(upstream: U, config: &ProxyConfig) -> Self {
        Self {
            upstream,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            odds_history_base: config.odds_history_base.clone(),
            cache: RwLock::new(
                TtlCache::new(Duration::from_secs(DEFAULT_TTL_SECS))
                    .with_max_entries(EDGE_CACHE_ENTRIES),
            ),
        }
    }

    pub async fn cached_entries(&self) -> usize {
        self.cache.read().await.len()
    }

    fn upstream_url(&self, route: &str, raw_query: &str) -> String {
        let route = route.trim_matches('/');
        if raw_query.is_empty() {
            format!("{}/{route}", self.api_base)
        } else {
            format!("{}/{route}?{raw_query}", self.api_base)
        }
    }

    /// Historical odds for the request's fixture, or `Value::Null` on any failure.
    async fn odds_history(&self, params: &[(String, String)]) -> Value {
        let (Some(base), Some(fixture)) = (
            self.odds_history_base.as_deref(),
            param(params, "fixture").filter(|f| !f.is_empty()),
        ) else {
            return Value::Null;
        };
        let bookmaker = param(params, "bookmaker")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_BOOKMAKER);
        let bet = param(params, "bet")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_BET);
        let url = format!("{base}?fixture={fixture}&bookmaker={bookmaker}&bet={bet}");
        match self.upstream.fetch(url).await {
            Ok(body) => serde_json::from_str(&body).unwrap_or(Value::Null),
            Err(err) => {
                tracing::warn!(fixture, error = %err, "odds history unavailable");
                Value::Null
            }
        }
    }
}

/// `GET /api/football/{route...}` and `GET /api/health`.
pub fn routes<U: Upstream>(
    state: Arc<ProxyState<U>>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let football = warp::path!("api" / "football" / ..)
        .and(warp::get())
        .and(warp::path::tail())
        .and(
            warp::query::raw()
                .or(warp::any().map(String::new))
                .unify(),
        )
        .and(with_state(state))
        .and_then(handle_football);

    let health = warp::path!("api" / "health")
        .and(warp::get())
        .map(|| warp::reply::with_status("OK", StatusCode::OK));

    football.or(health)
}

fn with_state<U: Upstream>(
    state: Arc<ProxyState<U>>,
) -> impl Filter<Extract = (Arc<ProxyState<U>>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&state))
}

async fn handle_football<U: Upstream>(
    tail: Tail,
    raw_query: String,
    state: Arc<ProxyState<U>>,
) -> Result<Response, Rejection> {
    let route = tail.as_str().trim_matches('/').to_string();
    if route.is_empty() {
        return Ok(json_reply(
            json!({"error": "missing route"}).to_string(),
            StatusCode::NOT_FOUND,
            CachePolicy::NoStore,
            None,
        ));
    }

    let params = parse_query(&raw_query);
    let policy = cache_policy(&route, &params);
    let url = state.upstream_url(&route, &raw_query);

    if policy.ttl().is_some()
        && let Some(body) = state.cache.write().await.get(&url)
    {
        tracing::debug!(%route, "edge cache hit");
        return Ok(json_reply(body, StatusCode::OK, policy, Some("HIT")));
    }

    let body = match state.upstream.fetch(url.clone()).await {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(%route, error = %err, "upstream fetch failed");
            let payload = json!({"error": "upstream request failed", "route": route});
            return Ok(json_reply(
                payload.to_string(),
                StatusCode::BAD_GATEWAY,
                CachePolicy::NoStore,
                None,
            ));
        }
    };

    let body = if route == "odds" {
        attach_history(&body, state.odds_history(&params).await)
    } else {
        body
    };

    if let Some(ttl) = policy.ttl() {
        state
            .cache
            .write()
            .await
            .set_with_ttl(url, body.clone(), ttl);
    }
    Ok(json_reply(body, StatusCode::OK, policy, Some("MISS")))
}

fn attach_history(body: &str, history: Value) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(mut map)) => {
            map.insert("history".to_string(), history);
            Value::Object(map).to_string()
        }
        _ => body.to_string(),
    }
}

fn json_reply(body: String, status: StatusCode, policy: CachePolicy, cache: Option<&str>) -> Response {
    let reply = warp::reply::with_header(body, "content-type", "application/json");
    let reply = warp::reply::with_header(reply, "cache-control", policy.header_value());
    let mut response = warp::reply::with_status(reply, status).into_response();
    if let Some(cache) = cache
        && let Ok(value) = warp::http::HeaderValue::from_str(cache)
    {
        response.headers_mut().insert("x-cache", value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_keep_order_and_bare_keys() {
        let pairs = parse_query("date=2025-01-01&live&timezone=UTC");
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[1], ("live".to_string(), String::new()));
        assert_eq!(param(&pairs, "timezone"), Some("UTC"));
    }

    #[test]
    fn history_is_attached_only_to_object_bodies() {
        let merged = attach_history(r#"{"response":[]}"#, json!([1, 2]));
        let value: Value = serde_json::from_str(&merged).expect("json");
        assert_eq!(value["history"], json!([1, 2]));
        assert_eq!(attach_history("[]", Value::Null), "[]");
    }
}
