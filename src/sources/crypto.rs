// src/sources/crypto.rs
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::UpstreamConfig;
use crate::sources::types::{CryptoData, CryptoQuery};
use crate::sources::{endpoint, get_json, http_client, require_key, SourceAdapter, SourceError};

const ADAPTER: &str = "crypto";

/// Page size used by the range mode when no limit is given.
pub const DEFAULT_RANGE_LIMIT: u32 = 10;
/// CoinGecko caps `per_page` at 250; we never ask for more than this.
const MAX_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
struct MarketEntry {
    #[serde(default)]
    id: Option<String>,
    symbol: String,
    name: String,
    current_price: Option<f64>,
    market_cap: Option<f64>,
}

impl MarketEntry {
    /// `None` when the entry has no price to compare or report.
    fn normalize(self) -> Option<CryptoData> {
        let price = self.current_price.filter(|p| p.is_finite())?;
        Some(CryptoData {
            name: self.name,
            symbol: self.symbol.to_uppercase(),
            price,
            market_cap: self.market_cap.unwrap_or(0.0),
        })
    }
}

/// Number of entries requested for a range scan: twice the limit, capped.
pub fn range_page_size(limit: u32) -> u32 {
    limit.max(1).saturating_mul(2).min(MAX_PAGE)
}

/// First entry, in page order, whose price lies inside the optional bounds.
/// Page order is market-cap descending, so this is the largest qualifying
/// coin rather than the cheapest one.
pub fn first_in_range(
    entries: impl IntoIterator<Item = CryptoData>,
    min_price: Option<f64>,
    max_price: Option<f64>,
) -> Option<CryptoData> {
    entries.into_iter().find(|c| {
        min_price.map_or(true, |min| c.price >= min) && max_price.map_or(true, |max| c.price <= max)
    })
}

/// CoinGecko `/coins/markets` adapter.
pub struct CoinGeckoSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoSource {
    pub fn new(upstream: &UpstreamConfig, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: upstream.base_url.clone(),
            api_key: upstream.api_key.clone(),
        })
    }

    /// Swap the HTTP client (tests use one that bypasses system proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    async fn markets(&self, extra: Vec<(&str, String)>) -> Result<Vec<MarketEntry>, SourceError> {
        let key = require_key(ADAPTER, self.api_key.as_deref())?;
        let mut query = vec![
            ("vs_currency", "usd".to_string()),
            ("order", "market_cap_desc".to_string()),
            ("page", "1".to_string()),
            ("sparkline", "false".to_string()),
            ("locale", "en".to_string()),
            ("x_cg_demo_api_key", key.to_string()),
        ];
        query.extend(extra);

        get_json(
            &self.http,
            ADAPTER,
            &endpoint(&self.base_url, "coins/markets"),
            &query,
        )
        .await
    }

    async fn by_id(&self, coin_id: &str) -> Result<Option<CryptoData>, SourceError> {
        let entries = self
            .markets(vec![
                ("ids", coin_id.to_string()),
                ("per_page", "1".to_string()),
            ])
            .await?;

        let Some(entry) = entries.into_iter().next() else {
            return Ok(None);
        };
        let id = entry.id.clone().unwrap_or_default();
        entry
            .normalize()
            .map(Some)
            .ok_or_else(|| SourceError::malformed(ADAPTER, format!("entry '{id}' has no price")))
    }

    async fn by_price_range(
        &self,
        min_price: Option<f64>,
        max_price: Option<f64>,
        limit: u32,
    ) -> Result<Option<CryptoData>, SourceError> {
        let entries = self
            .markets(vec![("per_page", range_page_size(limit).to_string())])
            .await?;

        Ok(first_in_range(
            entries.into_iter().filter_map(MarketEntry::normalize),
            min_price,
            max_price,
        ))
    }
}

#[async_trait]
impl SourceAdapter for CoinGeckoSource {
    type Query = CryptoQuery;
    type Record = CryptoData;

    async fn fetch(&self, query: &CryptoQuery) -> Result<Option<CryptoData>, SourceError> {
        match query {
            CryptoQuery::ById(id) => self.by_id(id).await,
            CryptoQuery::PriceRange {
                min_price,
                max_price,
                limit,
            } => self.by_price_range(*min_price, *max_price, *limit).await,
        }
    }

    fn name(&self) -> &'static str {
        ADAPTER
    }
}
