// src/aggregate.rs
//! Multi-source aggregation join.
//!
//! All three adapters are dispatched together and every one of them settles
//! before reduction starts; a failing source never cancels its siblings.
//! Settlements are reduced in a fixed order (crypto, weather, news) under a
//! named [`PartialFailurePolicy`], an all-absent composite is rejected, and a
//! successful composite is appended to the snapshot sink exactly once.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::snapshot::{Snapshot, SnapshotSink, StorageError};
use crate::sources::crypto::DEFAULT_RANGE_LIMIT;
use crate::sources::{CryptoData, CryptoQuery, NewsData, SourceAdapter, SourceError, WeatherData};

pub const DEFAULT_CRYPTO: &str = "bitcoin";
pub const DEFAULT_CITY: &str = "Hanoi";
pub const DEFAULT_NEWS_QUERY: &str = "technology";

pub type DynCryptoSource = Arc<dyn SourceAdapter<Query = CryptoQuery, Record = CryptoData>>;
pub type DynWeatherSource = Arc<dyn SourceAdapter<Query = str, Record = WeatherData>>;
pub type DynNewsSource = Arc<dyn SourceAdapter<Query = str, Record = NewsData>>;

/// Resolved filters for one aggregation call.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationRequest {
    pub crypto: String,
    pub city: String,
    pub news_query: String,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub crypto_limit: Option<u32>,
}

impl Default for AggregationRequest {
    fn default() -> Self {
        Self {
            crypto: DEFAULT_CRYPTO.to_string(),
            city: DEFAULT_CITY.to_string(),
            news_query: DEFAULT_NEWS_QUERY.to_string(),
            min_price: None,
            max_price: None,
            crypto_limit: None,
        }
    }
}

impl AggregationRequest {
    /// Any price bound or explicit limit selects the range scan; the coin id
    /// is then ignored.
    pub fn crypto_query(&self) -> CryptoQuery {
        if self.min_price.is_some() || self.max_price.is_some() || self.crypto_limit.is_some() {
            CryptoQuery::PriceRange {
                min_price: self.min_price,
                max_price: self.max_price,
                limit: self.crypto_limit.unwrap_or(DEFAULT_RANGE_LIMIT),
            }
        } else {
            CryptoQuery::ById(self.crypto.clone())
        }
    }
}

/// Composite of the three sources. Never all-absent once returned by
/// [`Aggregator::aggregate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub crypto: Option<CryptoData>,
    pub weather: Option<WeatherData>,
    pub latest_news: Option<NewsData>,
}

impl AggregationResult {
    pub fn is_empty(&self) -> bool {
        self.crypto.is_none() && self.weather.is_none() && self.latest_news.is_none()
    }
}

/// What a single source failure does to the whole call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialFailurePolicy {
    /// A failed source becomes an absent field; the rest is still served.
    #[default]
    ServePartial,
    /// The first failed source (in crypto, weather, news order) fails the call.
    FailAll,
}

impl PartialFailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartialFailurePolicy::ServePartial => "serve_partial",
            PartialFailurePolicy::FailAll => "fail_all",
        }
    }
}

impl FromStr for PartialFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "serve_partial" | "partial" => Ok(PartialFailurePolicy::ServePartial),
            "fail_all" => Ok(PartialFailurePolicy::FailAll),
            other => Err(format!(
                "unknown partial failure policy '{other}' (expected serve_partial or fail_all)"
            )),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("{} data unavailable", .0.adapter())]
    SourceUnavailable(#[source] SourceError),

    #[error("No data available from any service")]
    NoDataAvailable,

    #[error("snapshot storage unavailable")]
    StorageUnavailable(#[from] StorageError),
}

impl AggregateError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AggregateError::SourceUnavailable(_) => "source_unavailable",
            AggregateError::NoDataAvailable => "no_data",
            AggregateError::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}

pub struct Aggregator {
    crypto: DynCryptoSource,
    weather: DynWeatherSource,
    news: DynNewsSource,
    sink: Arc<dyn SnapshotSink>,
    policy: PartialFailurePolicy,
}

impl Aggregator {
    pub fn new(
        crypto: DynCryptoSource,
        weather: DynWeatherSource,
        news: DynNewsSource,
        sink: Arc<dyn SnapshotSink>,
        policy: PartialFailurePolicy,
    ) -> Self {
        Self {
            crypto,
            weather,
            news,
            sink,
            policy,
        }
    }

    pub fn policy(&self) -> PartialFailurePolicy {
        self.policy
    }

    /// Query all sources, reduce, persist one snapshot, return the composite.
    #[instrument(skip_all, fields(policy = self.policy.as_str(), city = %request.city, news_query = %request.news_query))]
    pub async fn aggregate(
        &self,
        request: &AggregationRequest,
    ) -> Result<AggregationResult, AggregateError> {
        let started = Instant::now();
        counter!("aggregation_requests_total").increment(1);

        let outcome = self.run(request).await;

        histogram!("aggregation_duration_ms").record(started.elapsed().as_secs_f64() * 1_000.0);
        match &outcome {
            Ok(result) => info!(
                crypto = result.crypto.is_some(),
                weather = result.weather.is_some(),
                news = result.latest_news.is_some(),
                "aggregation served"
            ),
            Err(e) => {
                counter!("aggregation_failures_total", "reason" => e.kind()).increment(1);
                warn!(error = %e, "aggregation failed");
            }
        }
        outcome
    }

    async fn run(&self, request: &AggregationRequest) -> Result<AggregationResult, AggregateError> {
        let crypto_query = request.crypto_query();

        // Settle-all: join! polls every future to completion before returning.
        let (crypto, weather, news) = tokio::join!(
            self.crypto.fetch(&crypto_query),
            self.weather.fetch(request.city.as_str()),
            self.news.fetch(request.news_query.as_str()),
        );

        // Every failure is logged and counted; `?` then picks the first one.
        let crypto = self.settle(self.crypto.name(), crypto);
        let weather = self.settle(self.weather.name(), weather);
        let news = self.settle(self.news.name(), news);
        let result = AggregationResult {
            crypto: crypto?,
            weather: weather?,
            latest_news: news?,
        };

        if result.is_empty() {
            return Err(AggregateError::NoDataAvailable);
        }

        let snapshot = Snapshot::new(result);
        let ack = self.sink.append(&snapshot).await?;
        counter!("snapshots_written_total").increment(1);
        tracing::debug!(snapshot_id = ack.id, sink = self.sink.name(), "snapshot appended");

        Ok(snapshot.result)
    }

    fn settle<T>(
        &self,
        source: &'static str,
        outcome: Result<Option<T>, SourceError>,
    ) -> Result<Option<T>, AggregateError> {
        match outcome {
            Ok(Some(value)) => Ok(Some(value)),
            Ok(None) => {
                tracing::debug!(source, "source returned no match");
                Ok(None)
            }
            Err(e) => {
                counter!("source_errors_total", "source" => e.adapter()).increment(1);
                warn!(source, error = %e, "source unavailable");
                match self.policy {
                    PartialFailurePolicy::ServePartial => Ok(None),
                    PartialFailurePolicy::FailAll => Err(AggregateError::SourceUnavailable(e)),
                }
            }
        }
    }
}
