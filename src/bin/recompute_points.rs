use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pitchside::config::{AppConfig, ProxyConfig, load_dotenv};
use pitchside::docstore::{Db, SqliteStore};
use pitchside::football_api::FootballApi;
use pitchside::leaderboard::{FinalScore, daily_picks, recompute_points};
use pitchside::rules::Session;

#[derive(Parser)]
#[command(name = "recompute_points")]
#[command(about = "Score predictions for one day's finished fixtures and refresh the leaderboard")]
struct Args {
    /// Day to score, `YYYY-MM-DD` (defaults to today, UTC).
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// Document store path.
    #[arg(long, env = "PITCHSIDE_DB_PATH")]
    db: Option<PathBuf>,

    /// Only score the fixtures picked for that day's global predictions.
    #[arg(long)]
    daily_only: bool,

    /// Go through the proxy instead of calling the API directly.
    #[arg(long)]
    via_proxy: bool,
}

fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let date = args.date.unwrap_or_else(|| Utc::now().date_naive());
    let day = date.format("%Y-%m-%d").to_string();

    let api = if args.via_proxy {
        FootballApi::new(AppConfig::from_env().proxy_url)
    } else {
        let proxy = ProxyConfig::from_env();
        let key = proxy
            .api_key
            .ok_or_else(|| anyhow!("FOOTBALL_API_KEY is required without --via-proxy"))?;
        FootballApi::direct(proxy.api_base, key)
    };

    let db_path = args
        .db
        .or_else(SqliteStore::default_path)
        .context("unable to resolve document store path")?;
    let store = SqliteStore::open(&db_path)?;
    let db = Db::new(Arc::new(store), Session::admin("recompute", "Recompute job"));

    let fixtures = api
        .fixtures_by_date(date)
        .with_context(|| format!("fetch fixtures for {day}"))?;
    let picks = if args.daily_only {
        Some(daily_picks(&db, &day)?.fixture_ids)
    } else {
        None
    };
    let results: Vec<FinalScore> = fixtures
        .iter()
        .filter(|f| picks.as_ref().is_none_or(|ids| ids.contains(&f.id)))
        .filter_map(|f| f.final_score())
        .collect();

    println!("Recompute {day}");
    println!("DB: {}", db_path.display());
    println!(
        "Fixtures: {} listed, {} finished{}",
        fixtures.len(),
        results.len(),
        if args.daily_only { " (daily picks only)" } else { "" }
    );

    let report = recompute_points(&db, &results)?;
    println!("Predictions checked: {}", report.predictions_checked);
    println!("Predictions updated: {}", report.predictions_updated);
    println!("Leaderboard rows written: {}", report.leaderboard_updated);
    Ok(())
}
