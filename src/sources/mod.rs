// src/sources/mod.rs
pub mod crypto;
pub mod news;
pub mod types;
pub mod weather;

use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;

pub use crypto::CoinGeckoSource;
pub use news::NewsApiSource;
pub use types::{CryptoData, CryptoQuery, NewsData, WeatherData};
pub use weather::OpenWeatherSource;

/// Fixed per-call upstream timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a source could not produce a record. Every variant is the
/// "unavailable" signal for one adapter; the aggregation join decides
/// whether it is fatal.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("{adapter} API key is not configured")]
    MissingCredential { adapter: &'static str },

    #[error("{adapter} request timed out")]
    Timeout { adapter: &'static str },

    #[error("{adapter} request failed: {reason}")]
    Transport {
        adapter: &'static str,
        reason: String,
    },

    #[error("{adapter} upstream returned HTTP {status}")]
    Status { adapter: &'static str, status: u16 },

    #[error("{adapter} payload could not be normalized: {reason}")]
    Malformed {
        adapter: &'static str,
        reason: String,
    },
}

impl SourceError {
    pub fn adapter(&self) -> &'static str {
        match self {
            SourceError::MissingCredential { adapter }
            | SourceError::Timeout { adapter }
            | SourceError::Transport { adapter, .. }
            | SourceError::Status { adapter, .. }
            | SourceError::Malformed { adapter, .. } => adapter,
        }
    }

    pub(crate) fn malformed(adapter: &'static str, reason: impl Into<String>) -> Self {
        SourceError::Malformed {
            adapter,
            reason: reason.into(),
        }
    }

    /// Classify a reqwest failure. The URL is stripped because query strings
    /// carry API keys.
    pub(crate) fn from_reqwest(adapter: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return SourceError::Timeout { adapter };
        }
        if let Some(status) = err.status() {
            return SourceError::Status {
                adapter,
                status: status.as_u16(),
            };
        }
        if err.is_decode() {
            return SourceError::malformed(adapter, err.without_url().to_string());
        }
        SourceError::Transport {
            adapter,
            reason: err.without_url().to_string(),
        }
    }
}

/// One upstream API normalized into a canonical record.
///
/// `Ok(None)` means the upstream answered a well-formed query with zero
/// matches. Each call performs exactly one upstream request.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    type Query: ?Sized + Sync;
    type Record: Send;

    async fn fetch(&self, query: &Self::Query) -> Result<Option<Self::Record>, SourceError>;
    fn name(&self) -> &'static str;
}

/// Build the HTTP client an adapter owns.
pub fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("multi-api-aggregator/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(timeout.min(Duration::from_secs(4)))
        .timeout(timeout)
        .build()
        .context("building upstream http client")
}

/// GET `url` with `query` and decode a JSON body. Non-2xx is an error.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    adapter: &'static str,
    url: &str,
    query: &[(&str, String)],
) -> Result<T, SourceError> {
    let resp = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| SourceError::from_reqwest(adapter, e))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            adapter,
            status: status.as_u16(),
        });
    }

    resp.json::<T>()
        .await
        .map_err(|e| SourceError::from_reqwest(adapter, e))
}

/// Join a configured base URL and an endpoint path without doubling slashes.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Treat a blank configured key the same as a missing one.
pub(crate) fn require_key<'a>(
    adapter: &'static str,
    key: Option<&'a str>,
) -> Result<&'a str, SourceError> {
    match key.map(str::trim) {
        Some(k) if !k.is_empty() => Ok(k),
        _ => Err(SourceError::MissingCredential { adapter }),
    }
}
