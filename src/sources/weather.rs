// src/sources/weather.rs
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::UpstreamConfig;
use crate::sources::types::WeatherData;
use crate::sources::{endpoint, get_json, http_client, require_key, SourceAdapter, SourceError};

const ADAPTER: &str = "weather";
const UNKNOWN_CONDITION: &str = "Unknown";

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    name: String,
    main: MainBlock,
    #[serde(default)]
    weather: Vec<Condition>,
    #[serde(default)]
    wind: Option<Wind>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    #[serde(default)]
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Condition {
    main: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Wind {
    speed: Option<f64>,
}

/// Round to whole degrees, halves going up (21.5 -> 22, -2.5 -> -2).
pub fn round_half_up(celsius: f64) -> i32 {
    (celsius + 0.5).floor() as i32
}

impl CurrentWeather {
    fn normalize(self) -> WeatherData {
        let condition = self
            .weather
            .into_iter()
            .next()
            .and_then(|c| c.main)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_CONDITION.to_string());

        WeatherData {
            city: self.name,
            temperature: round_half_up(self.main.temp),
            condition,
            humidity: self.main.humidity,
            wind_speed: self.wind.and_then(|w| w.speed),
        }
    }
}

/// OpenWeather current-conditions adapter (metric units).
pub struct OpenWeatherSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenWeatherSource {
    pub fn new(upstream: &UpstreamConfig, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: upstream.base_url.clone(),
            api_key: upstream.api_key.clone(),
        })
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }
}

#[async_trait]
impl SourceAdapter for OpenWeatherSource {
    type Query = str;
    type Record = WeatherData;

    async fn fetch(&self, city: &str) -> Result<Option<WeatherData>, SourceError> {
        let key = require_key(ADAPTER, self.api_key.as_deref())?;
        let query = [
            ("q", city.to_string()),
            ("appid", key.to_string()),
            ("units", "metric".to_string()),
        ];

        // A JSON `null` body carries no conditions; that is "no data", not an error.
        let body: Option<CurrentWeather> = get_json(
            &self.http,
            ADAPTER,
            &endpoint(&self.base_url, "weather"),
            &query,
        )
        .await?;

        Ok(body.map(CurrentWeather::normalize))
    }

    fn name(&self) -> &'static str {
        ADAPTER
    }
}
