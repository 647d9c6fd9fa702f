// Shared test helpers: stub sources, failing sink, in-process upstream.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::{TimeZone, Utc};

use multi_api_aggregator::aggregate::{Aggregator, PartialFailurePolicy};
use multi_api_aggregator::snapshot::{Snapshot, SnapshotAck, SnapshotSink, StorageError};
use multi_api_aggregator::sources::{
    CryptoData, CryptoQuery, NewsData, SourceAdapter, SourceError, WeatherData,
};

/// What a stub source answers with.
#[derive(Clone)]
pub enum Outcome<R> {
    Value(R),
    Absent,
    Fail,
}

pub struct Stub<R> {
    name: &'static str,
    outcome: Outcome<R>,
    delay: Duration,
    calls: AtomicUsize,
    finished: AtomicBool,
    last_query: Mutex<Option<String>>,
}

impl<R: Clone + Send + Sync> Stub<R> {
    pub fn new(name: &'static str, outcome: Outcome<R>) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcome,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
            last_query: Mutex::new(None),
        })
    }

    pub fn delayed(name: &'static str, outcome: Outcome<R>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcome,
            delay,
            calls: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
            last_query: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// True once a call ran to the end (was not dropped mid-flight).
    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<String> {
        self.last_query.lock().unwrap().clone()
    }

    async fn respond(&self, query: String) -> Result<Option<R>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some(query);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.finished.store(true, Ordering::SeqCst);
        match &self.outcome {
            Outcome::Value(v) => Ok(Some(v.clone())),
            Outcome::Absent => Ok(None),
            Outcome::Fail => Err(SourceError::Transport {
                adapter: self.name,
                reason: "stubbed outage".into(),
            }),
        }
    }
}

#[async_trait]
impl SourceAdapter for Stub<CryptoData> {
    type Query = CryptoQuery;
    type Record = CryptoData;

    async fn fetch(&self, query: &CryptoQuery) -> Result<Option<CryptoData>, SourceError> {
        self.respond(format!("{query:?}")).await
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

#[async_trait]
impl SourceAdapter for Stub<WeatherData> {
    type Query = str;
    type Record = WeatherData;

    async fn fetch(&self, city: &str) -> Result<Option<WeatherData>, SourceError> {
        self.respond(city.to_string()).await
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

#[async_trait]
impl SourceAdapter for Stub<NewsData> {
    type Query = str;
    type Record = NewsData;

    async fn fetch(&self, query: &str) -> Result<Option<NewsData>, SourceError> {
        self.respond(query.to_string()).await
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Sink that refuses every write.
#[derive(Default)]
pub struct FailingSink {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl SnapshotSink for FailingSink {
    async fn append(&self, _snapshot: &Snapshot) -> Result<SnapshotAck, StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Unavailable("disk full".into()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

pub fn bitcoin() -> CryptoData {
    CryptoData {
        name: "Bitcoin".into(),
        symbol: "BTC".into(),
        price: 50_000.0,
        market_cap: 1e12,
    }
}

pub fn hanoi() -> WeatherData {
    WeatherData {
        city: "Hanoi".into(),
        temperature: 31,
        condition: "Clouds".into(),
        humidity: Some(70.0),
        wind_speed: Some(3.1),
    }
}

pub fn headline() -> NewsData {
    NewsData {
        title: "New chip announced".into(),
        source: "Wire".into(),
        url: "https://news.example/chip".into(),
        description: None,
        published_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        category: Some("technology".into()),
    }
}

pub struct Harness {
    pub crypto: Arc<Stub<CryptoData>>,
    pub weather: Arc<Stub<WeatherData>>,
    pub news: Arc<Stub<NewsData>>,
}

impl Harness {
    pub fn new(
        crypto: Outcome<CryptoData>,
        weather: Outcome<WeatherData>,
        news: Outcome<NewsData>,
    ) -> Self {
        Self {
            crypto: Stub::new("crypto", crypto),
            weather: Stub::new("weather", weather),
            news: Stub::new("news", news),
        }
    }

    pub fn healthy() -> Self {
        Self::new(
            Outcome::Value(bitcoin()),
            Outcome::Value(hanoi()),
            Outcome::Value(headline()),
        )
    }

    pub fn aggregator(&self, sink: Arc<dyn SnapshotSink>, policy: PartialFailurePolicy) -> Aggregator {
        Aggregator::new(
            self.crypto.clone(),
            self.weather.clone(),
            self.news.clone(),
            sink,
            policy,
        )
    }

    pub fn total_calls(&self) -> usize {
        self.crypto.calls() + self.weather.calls() + self.news.calls()
    }
}

/// Serve `app` on an ephemeral local port; returns its base URL.
pub async fn spawn_upstream(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind upstream");
    let addr = listener.local_addr().expect("upstream addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("upstream server");
    });
    format!("http://{addr}")
}

/// HTTP client for talking to the local upstream, ignoring proxy env vars.
pub fn local_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(timeout)
        .build()
        .expect("test client")
}
