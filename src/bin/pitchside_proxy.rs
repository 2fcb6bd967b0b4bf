use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use warp::Filter;

use pitchside::config::{ProxyConfig, load_dotenv};
use pitchside::proxy::{ProxyState, ReqwestUpstream, routes};

#[derive(Parser)]
#[command(name = "pitchside_proxy")]
#[command(about = "Caching proxy in front of the sports-data API")]
struct Args {
    #[arg(short, long, env = "PROXY_PORT")]
    port: Option<u16>,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "FOOTBALL_API_BASE")]
    api_base: Option<String>,

    #[arg(long, env = "ODDS_HISTORY_BASE")]
    odds_history_base: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = ProxyConfig::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(base) = args.api_base {
        config.api_base = base.trim_end_matches('/').to_string();
    }
    if let Some(base) = args.odds_history_base {
        config.odds_history_base = Some(base.trim_end_matches('/').to_string());
    }
    if config.api_key.is_none() {
        warn!("FOOTBALL_API_KEY is not set; upstream calls will be rejected");
    }

    let upstream = ReqwestUpstream::new(config.api_key.clone())?;
    let state = Arc::new(ProxyState::new(upstream, &config));

    let addr: SocketAddr = format!("{}:{}", args.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", args.host, config.port))?;
    info!(%addr, upstream = %config.api_base, "proxy listening");

    let (_, server) = warp::serve(routes(state).with(warp::log("pitchside_proxy")))
        .bind_with_graceful_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        });
    server.await;
    Ok(())
}
