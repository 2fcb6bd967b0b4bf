use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:8787/api/football";
pub const DEFAULT_API_BASE: &str = "https://v3.football.api-sports.io";
pub const DEFAULT_PROXY_PORT: u16 = 8787;

/// Terminal client settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub proxy_url: String,
    pub db_path: Option<PathBuf>,
    pub user_id: Option<String>,
    pub display_name: String,
    pub fixtures_refresh: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let proxy_url = opt_env("PITCHSIDE_PROXY_URL")
            .unwrap_or_else(|| DEFAULT_PROXY_URL.to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();
        let db_path = opt_env("PITCHSIDE_DB_PATH").map(PathBuf::from);
        let user_id = opt_env("PITCHSIDE_USER_ID").map(|s| s.trim().to_string());
        let display_name = opt_env("PITCHSIDE_DISPLAY_NAME")
            .map(|s| s.trim().to_string())
            .or_else(|| user_id.clone())
            .unwrap_or_else(|| "Guest".to_string());
        let refresh_secs = env::var("PITCHSIDE_REFRESH_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60)
            .clamp(15, 900);

        Self {
            proxy_url,
            db_path,
            user_id,
            display_name,
            fixtures_refresh: Duration::from_secs(refresh_secs),
        }
    }
}

/// Proxy settings; the binary lets flags override these.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub odds_history_base: Option<String>,
    pub port: u16,
}

impl ProxyConfig {
    pub fn from_env() -> Self {
        let api_base = opt_env("FOOTBALL_API_BASE")
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();
        let api_key = opt_env("FOOTBALL_API_KEY").map(|s| s.trim().to_string());
        let odds_history_base =
            opt_env("ODDS_HISTORY_BASE").map(|s| s.trim().trim_end_matches('/').to_string());
        let port = env::var("PROXY_PORT")
            .ok()
            .and_then(|v| v.trim().parse::<u16>().ok())
            .filter(|p| *p != 0)
            .unwrap_or(DEFAULT_PROXY_PORT);

        Self {
            api_base,
            api_key,
            odds_history_base,
            port,
        }
    }
}

/// Loads `.env.local` first so it wins over `.env`.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

fn opt_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|val| !val.trim().is_empty())
}
