// src/config.rs
//! Startup configuration.
//!
//! Layering, later wins: built-in defaults, an optional TOML file
//! (`$APP_CONFIG_PATH` or `config/app.toml`), then environment variables.
//! A missing API key is not an error here; the adapter reports it per call.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::aggregate::PartialFailurePolicy;

const ENV_CONFIG_PATH: &str = "APP_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

pub const DEFAULT_COINGECKO_URL: &str = "https://api.coingecko.com/api/v3";
pub const DEFAULT_OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5";
pub const DEFAULT_NEWS_API_URL: &str = "https://newsapi.org/v2";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub crypto: UpstreamConfig,
    pub weather: UpstreamConfig,
    pub news: UpstreamConfig,
    pub aggregation: AggregationConfig,
    pub storage: StorageConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub policy: PartialFailurePolicy,
    pub upstream_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
    /// Reverse proxies in front of the server; `0` keys on the socket peer.
    pub trusted_proxies: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            policy: PartialFailurePolicy::default(),
            upstream_timeout_secs: crate::sources::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: "data/aggregated.db".to_string(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window_secs: 60,
            trusted_proxies: 0,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let upstream = |url: &str| UpstreamConfig {
            base_url: url.to_string(),
            api_key: None,
        };
        Self {
            server: ServerConfig::default(),
            crypto: upstream(DEFAULT_COINGECKO_URL),
            weather: upstream(DEFAULT_OPENWEATHER_URL),
            news: upstream(DEFAULT_NEWS_API_URL),
            aggregation: AggregationConfig::default(),
            storage: StorageConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StorageBackend::Sqlite),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(anyhow!("unknown storage backend '{other}'")),
        }
    }
}

impl AppConfig {
    /// Load from the process environment (and the TOML file if present).
    pub fn load() -> Result<Self> {
        let file = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
                }
                Some(read_file(&pb)?)
            }
            Err(_) => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Some(read_file(default)?)
                } else {
                    None
                }
            }
        };
        Self::from_sources(file.as_deref(), |k| std::env::var(k).ok())
    }

    /// Build from optional TOML text and an env-style lookup.
    pub fn from_sources<F>(toml_text: Option<&str>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match toml_text {
            Some(s) => toml::from_str::<AppConfig>(s).context("parsing config toml")?,
            None => AppConfig::default(),
        };
        cfg.fill_blank_urls();
        cfg.apply_env(lookup)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.aggregation.upstream_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    // A TOML `[crypto]` table that only sets the key still gets the default URL.
    fn fill_blank_urls(&mut self) {
        for (upstream, default) in [
            (&mut self.crypto, DEFAULT_COINGECKO_URL),
            (&mut self.weather, DEFAULT_OPENWEATHER_URL),
            (&mut self.news, DEFAULT_NEWS_API_URL),
        ] {
            if upstream.base_url.trim().is_empty() {
                upstream.base_url = default.to_string();
            }
        }
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        if let Some(v) = parse_var(&get, "PORT")? {
            self.server.port = v;
        }

        if let Some(v) = get("COINGECKO_API_URL") {
            self.crypto.base_url = v;
        }
        if let Some(v) = get("COINGECKO_API_KEY") {
            self.crypto.api_key = Some(v);
        }
        if let Some(v) = get("OPENWEATHER_API_URL") {
            self.weather.base_url = v;
        }
        if let Some(v) = get("OPENWEATHER_API_KEY") {
            self.weather.api_key = Some(v);
        }
        if let Some(v) = get("NEWS_API_URL") {
            self.news.base_url = v;
        }
        if let Some(v) = get("NEWS_API_KEY") {
            self.news.api_key = Some(v);
        }

        if let Some(v) = parse_var(&get, "UPSTREAM_TIMEOUT_SECS")? {
            self.aggregation.upstream_timeout_secs = v;
        }
        if let Some(v) = parse_var(&get, "PARTIAL_FAILURE_POLICY")? {
            self.aggregation.policy = v;
        }

        if let Some(v) = parse_var(&get, "STORAGE_BACKEND")? {
            self.storage.backend = v;
        }
        if let Some(v) = get("DATABASE_PATH") {
            self.storage.path = v;
        }

        if let Some(v) = parse_var(&get, "RATE_LIMIT_MAX_REQUESTS")? {
            self.rate_limit.max_requests = v;
        }
        if let Some(v) = parse_var(&get, "RATE_LIMIT_WINDOW_SECS")? {
            self.rate_limit.window_secs = v;
        }
        if let Some(v) = parse_var(&get, "RATE_LIMIT_TRUSTED_PROXIES")? {
            self.rate_limit.trusted_proxies = v;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (name, upstream) in [
            ("crypto", &self.crypto),
            ("weather", &self.weather),
            ("news", &self.news),
        ] {
            anyhow::ensure!(
                upstream.base_url.starts_with("http://") || upstream.base_url.starts_with("https://"),
                "{name}.base_url must be an http(s) URL, got '{}'",
                upstream.base_url
            );
        }
        anyhow::ensure!(
            self.aggregation.upstream_timeout_secs > 0,
            "aggregation.upstream_timeout_secs must be > 0"
        );
        anyhow::ensure!(
            self.rate_limit.max_requests > 0,
            "rate_limit.max_requests must be > 0"
        );
        anyhow::ensure!(
            self.rate_limit.window_secs > 0,
            "rate_limit.window_secs must be > 0"
        );
        anyhow::ensure!(
            self.storage.backend == StorageBackend::Memory || !self.storage.path.is_empty(),
            "storage.path must be non-empty for the sqlite backend"
        );
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading config from {}", path.display()))
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("invalid {key}='{raw}': {e}")),
    }
}
