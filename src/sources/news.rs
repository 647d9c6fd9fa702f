// src/sources/news.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::UpstreamConfig;
use crate::sources::types::NewsData;
use crate::sources::{endpoint, get_json, http_client, require_key, SourceAdapter, SourceError};

const ADAPTER: &str = "news";

#[derive(Debug, Deserialize)]
struct Everything {
    // Required; a body without `articles` is malformed.
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    #[serde(default)]
    source: Option<ArticleSource>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    name: Option<String>,
}

/// Parse an upstream timestamp into an absolute UTC instant.
pub fn parse_published_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl Article {
    fn normalize(self, query: &str) -> Result<NewsData, SourceError> {
        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SourceError::malformed(ADAPTER, "article has no title"))?;
        let url = self
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| SourceError::malformed(ADAPTER, "article has no url"))?;
        let raw_ts = self.published_at.unwrap_or_default();
        let published_at = parse_published_at(&raw_ts).ok_or_else(|| {
            SourceError::malformed(ADAPTER, format!("unparseable publishedAt '{raw_ts}'"))
        })?;

        Ok(NewsData {
            title,
            source: self
                .source
                .and_then(|s| s.name)
                .unwrap_or_else(|| "Unknown".to_string()),
            url,
            description: self.description,
            published_at,
            category: Some(query.to_string()),
        })
    }
}

/// NewsAPI `/everything` adapter; returns the single most recent article.
pub struct NewsApiSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl NewsApiSource {
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
impl SourceAdapter for NewsApiSource {
    type Query = str;
    type Record = NewsData;

    async fn fetch(&self, query: &str) -> Result<Option<NewsData>, SourceError> {
        let key = require_key(ADAPTER, self.api_key.as_deref())?;
        let params = [
            ("q", query.to_string()),
            ("sortBy", "publishedAt".to_string()),
            ("pageSize", "1".to_string()),
            ("language", "en".to_string()),
            ("apiKey", key.to_string()),
        ];

        let body: Everything = get_json(
            &self.http,
            ADAPTER,
            &endpoint(&self.base_url, "everything"),
            &params,
        )
        .await?;

        match body.articles.into_iter().next() {
            Some(article) => article.normalize(query).map(Some),
            None => Ok(None),
        }
    }

    fn name(&self) -> &'static str {
        ADAPTER
    }
}
