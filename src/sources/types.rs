// src/sources/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized market entry for one coin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoData {
    pub name: String,
    pub symbol: String, // upper-case ticker, e.g. "BTC"
    pub price: f64,     // USD
    pub market_cap: f64,
}

/// Current conditions for one city, temperature in whole degrees Celsius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherData {
    pub city: String,
    pub temperature: i32,
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<f64>,
}

/// Most recent article for a free-text query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsData {
    pub title: String,
    pub source: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    /// The query string the article was fetched for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Crypto lookup mode. The range mode returns the first entry of a
/// market-cap ordered page whose price falls inside the bounds.
#[derive(Debug, Clone, PartialEq)]
pub enum CryptoQuery {
    ById(String),
    PriceRange {
        min_price: Option<f64>,
        max_price: Option<f64>,
        limit: u32,
    },
}
