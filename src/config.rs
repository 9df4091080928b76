use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_TMDB_BASE: &str = "https://api.themoviedb.org/3";
pub const DEFAULT_REGIONAL_LANGUAGE: &str = "hi";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3147";

/// Runtime settings, read from the environment (a `.env` file is honoured by `main`).
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub regional_language: String,
    pub timeout: Duration,
    pub bind_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("TMDB_API_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .context("TMDB_API_KEY not set")?;
        let base_url = non_empty_var("TMDB_BASE_URL")
            .unwrap_or_else(|| DEFAULT_TMDB_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        let regional_language = non_empty_var("REGIONAL_LANGUAGE")
            .unwrap_or_else(|| DEFAULT_REGIONAL_LANGUAGE.to_string());
        let timeout_secs = match non_empty_var("TMDB_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("TMDB_TIMEOUT_SECS is not a number: {}", raw))?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        let bind_raw = non_empty_var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse()
            .with_context(|| format!("BIND_ADDR is not a socket address: {}", bind_raw))?;

        Ok(Self {
            api_key,
            base_url,
            regional_language,
            timeout: Duration::from_secs(timeout_secs.max(1)),
            bind_addr,
        })
    }

    /// Settings pointing at an arbitrary catalog base, used by the probe and tests.
    pub fn with_base(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            regional_language: DEFAULT_REGIONAL_LANGUAGE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}
