// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregate;
pub mod api;
pub mod config;
pub mod filters;
pub mod metrics;
pub mod rate_limit;
pub mod snapshot;
pub mod sources;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tracing::info;

use crate::aggregate::Aggregator;
use crate::config::{AppConfig, StorageBackend};
use crate::rate_limit::FixedWindowLimiter;
use crate::snapshot::{MemorySnapshotStore, SnapshotSink, SqliteSnapshotStore};
use crate::sources::{CoinGeckoSource, NewsApiSource, OpenWeatherSource};

pub use crate::aggregate::{AggregateError, AggregationRequest, AggregationResult};
pub use crate::api::router;

/// Open the configured snapshot store.
pub async fn build_sink(config: &AppConfig) -> anyhow::Result<Arc<dyn SnapshotSink>> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemorySnapshotStore::new())),
        StorageBackend::Sqlite => {
            let store = SqliteSnapshotStore::connect(&config.storage.path)
                .await
                .with_context(|| format!("opening snapshot db {}", config.storage.path))?;
            store.init().await.context("initializing snapshot schema")?;
            Ok(Arc::new(store))
        }
    }
}

/// Wire the three upstream adapters and the sink into a join.
pub fn build_aggregator(
    config: &AppConfig,
    sink: Arc<dyn SnapshotSink>,
) -> anyhow::Result<Aggregator> {
    let timeout = config.upstream_timeout();
    Ok(Aggregator::new(
        Arc::new(CoinGeckoSource::new(&config.crypto, timeout)?),
        Arc::new(OpenWeatherSource::new(&config.weather, timeout)?),
        Arc::new(NewsApiSource::new(&config.news, timeout)?),
        sink,
        config.aggregation.policy,
    ))
}

/// Build the full application router from configuration.
pub async fn app(config: &AppConfig) -> anyhow::Result<Router> {
    let metrics = metrics::Metrics::init()?;
    let sink = build_sink(config).await?;
    let aggregator = build_aggregator(config, sink)?;
    let limiter = FixedWindowLimiter::new(
        config.rate_limit.max_requests,
        Duration::from_secs(config.rate_limit.window_secs),
    )
    .with_trusted_proxies(config.rate_limit.trusted_proxies);

    info!(
        policy = aggregator.policy().as_str(),
        storage = ?config.storage.backend,
        rate_limit = config.rate_limit.max_requests,
        rate_window_secs = config.rate_limit.window_secs,
        trusted_proxies = config.rate_limit.trusted_proxies,
        crypto_key = config.crypto.api_key.is_some(),
        weather_key = config.weather.api_key.is_some(),
        news_key = config.news.api_key.is_some(),
        "application wired"
    );

    let state = api::AppState::new(Arc::new(aggregator), Arc::new(limiter));
    Ok(api::router(state).merge(metrics.router()))
}
