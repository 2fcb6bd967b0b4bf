use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;

const REQUEST_TIMEOUT_SECS: u64 = 15;
const CLIENT_USER_AGENT: &str = "pitchside/0.1";

static CLIENT: OnceCell<Client> = OnceCell::new();

/// Shared blocking client used by the terminal provider thread.
pub fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(CLIENT_USER_AGENT)
            .build()
            .context("failed to build http client")
    })
}
