// tests/sources_http.rs
//
// Adapters against an in-process upstream (axum on 127.0.0.1:0).
// Each canned upstream records the query strings it received.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use common::{local_client, spawn_upstream};
use multi_api_aggregator::config::UpstreamConfig;
use multi_api_aggregator::sources::{
    CoinGeckoSource, CryptoQuery, NewsApiSource, OpenWeatherSource, SourceAdapter, SourceError,
};

type Seen = Arc<Mutex<Vec<HashMap<String, String>>>>;

async fn canned(path: &'static str, status: StatusCode, body: Value) -> (String, Seen) {
    let seen: Seen = Arc::default();
    let recorder = seen.clone();
    let app = Router::new().route(
        path,
        get(move |Query(q): Query<HashMap<String, String>>| {
            let recorder = recorder.clone();
            let body = body.clone();
            async move {
                recorder.lock().unwrap().push(q);
                (status, Json(body))
            }
        }),
    );
    (spawn_upstream(app).await, seen)
}

fn upstream(base_url: &str, key: Option<&str>) -> UpstreamConfig {
    UpstreamConfig {
        base_url: base_url.to_string(),
        api_key: key.map(str::to_string),
    }
}

fn coingecko(base: &str, key: Option<&str>) -> CoinGeckoSource {
    CoinGeckoSource::new(&upstream(base, key), Duration::from_secs(10))
        .unwrap()
        .with_client(local_client(Duration::from_secs(10)))
}

fn openweather(base: &str) -> OpenWeatherSource {
    OpenWeatherSource::new(&upstream(base, Some("test-key")), Duration::from_secs(10))
        .unwrap()
        .with_client(local_client(Duration::from_secs(10)))
}

fn newsapi(base: &str) -> NewsApiSource {
    NewsApiSource::new(&upstream(base, Some("test-key")), Duration::from_secs(10))
        .unwrap()
        .with_client(local_client(Duration::from_secs(10)))
}

fn market(symbol: &str, price: f64, cap: f64) -> Value {
    json!({
        "id": symbol.to_lowercase(),
        "symbol": symbol.to_lowercase(),
        "name": format!("{symbol} coin"),
        "current_price": price,
        "market_cap": cap,
    })
}

// ---- crypto ----

#[tokio::test]
async fn crypto_by_id_normalizes_the_single_entry() {
    let (base, seen) = canned(
        "/coins/markets",
        StatusCode::OK,
        json!([{
            "id": "bitcoin", "symbol": "btc", "name": "Bitcoin",
            "current_price": 50000, "market_cap": 1e12
        }]),
    )
    .await;

    let out = coingecko(&base, Some("test-key"))
        .fetch(&CryptoQuery::ById("bitcoin".into()))
        .await
        .unwrap()
        .expect("one entry");

    assert_eq!(out.name, "Bitcoin");
    assert_eq!(out.symbol, "BTC");
    assert_eq!(out.price, 50000.0);
    assert_eq!(out.market_cap, 1e12);

    let seen = seen.lock().unwrap();
    let q = &seen[0];
    assert_eq!(q["ids"], "bitcoin");
    assert_eq!(q["per_page"], "1");
    assert_eq!(q["vs_currency"], "usd");
    assert_eq!(q["order"], "market_cap_desc");
    assert_eq!(q["x_cg_demo_api_key"], "test-key");
}

#[tokio::test]
async fn crypto_by_id_with_no_match_is_absent() {
    let (base, _) = canned("/coins/markets", StatusCode::OK, json!([])).await;
    let out = coingecko(&base, Some("k"))
        .fetch(&CryptoQuery::ById("no-such-coin".into()))
        .await
        .unwrap();
    assert!(out.is_none());
}

#[tokio::test]
async fn crypto_range_returns_first_match_in_page_order() {
    // Market-cap ordered page; 180 comes before the cheaper 120 and 150.
    let page = json!([
        market("BTC", 60000.0, 1.2e12),
        market("ETH", 3000.0, 3.6e11),
        market("BNB", 600.0, 9.0e10),
        market("SOL", 250.0, 8.0e10),
        market("LTC", 180.0, 7.0e10),
        market("AVAX", 150.0, 6.0e10),
        market("LINK", 120.0, 5.0e10),
        market("ADA", 1.0, 4.0e10),
        market("DOGE", 0.5, 3.0e10),
        market("XMR", 190.0, 2.0e10),
    ]);
    let (base, seen) = canned("/coins/markets", StatusCode::OK, page).await;

    let out = coingecko(&base, Some("k"))
        .fetch(&CryptoQuery::PriceRange {
            min_price: Some(100.0),
            max_price: Some(200.0),
            limit: 5,
        })
        .await
        .unwrap()
        .expect("a qualifying entry");

    assert_eq!(out.symbol, "LTC");
    assert_eq!(out.price, 180.0);

    let seen = seen.lock().unwrap();
    let q = &seen[0];
    assert_eq!(q["per_page"], "10");
    assert!(!q.contains_key("ids"));
}

#[tokio::test]
async fn crypto_range_without_match_is_absent() {
    let page = json!([market("BTC", 60000.0, 1e12), market("ETH", 3000.0, 1e11)]);
    let (base, _) = canned("/coins/markets", StatusCode::OK, page).await;

    let out = coingecko(&base, Some("k"))
        .fetch(&CryptoQuery::PriceRange {
            min_price: Some(100.0),
            max_price: Some(200.0),
            limit: 10,
        })
        .await
        .unwrap();
    assert!(out.is_none());
}

#[tokio::test]
async fn crypto_without_key_fails_before_calling_upstream() {
    let (base, seen) = canned("/coins/markets", StatusCode::OK, json!([])).await;

    let err = coingecko(&base, None)
        .fetch(&CryptoQuery::ById("bitcoin".into()))
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::MissingCredential { adapter: "crypto" }));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn crypto_http_error_is_unavailable() {
    let (base, _) = canned(
        "/coins/markets",
        StatusCode::TOO_MANY_REQUESTS,
        json!({"status": {"error_code": 429}}),
    )
    .await;

    let err = coingecko(&base, Some("k"))
        .fetch(&CryptoQuery::ById("bitcoin".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::Status { status: 429, .. }), "{err:?}");
}

#[tokio::test]
async fn crypto_unexpected_shape_is_malformed() {
    let (base, _) = canned("/coins/markets", StatusCode::OK, json!({"oops": true})).await;

    let err = coingecko(&base, Some("k"))
        .fetch(&CryptoQuery::ById("bitcoin".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::Malformed { adapter: "crypto", .. }), "{err:?}");
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let app = Router::new().route(
        "/coins/markets",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!([]))
        }),
    );
    let base = spawn_upstream(app).await;

    let src = CoinGeckoSource::new(&upstream(&base, Some("k")), Duration::from_millis(200))
        .unwrap()
        .with_client(local_client(Duration::from_millis(200)));
    let err = src
        .fetch(&CryptoQuery::ById("bitcoin".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::Timeout { adapter: "crypto" }), "{err:?}");
}

#[tokio::test]
async fn unreachable_upstream_is_a_transport_error_without_the_key() {
    // Bind then drop to get a port nobody listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = coingecko(&base, Some("super-secret"))
        .fetch(&CryptoQuery::ById("bitcoin".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::Transport { .. }), "{err:?}");
    assert!(!err.to_string().contains("super-secret"), "{err}");
}

// ---- weather ----

#[tokio::test]
async fn weather_rounds_half_up_and_picks_first_condition() {
    let (base, seen) = canned(
        "/weather",
        StatusCode::OK,
        json!({
            "name": "Hanoi",
            "main": {"temp": 21.6, "humidity": 80},
            "weather": [{"main": "Rain", "description": "light rain"}, {"main": "Mist"}],
            "wind": {"speed": 2.5}
        }),
    )
    .await;

    let out = openweather(&base).fetch("Hanoi").await.unwrap().unwrap();

    assert_eq!(out.city, "Hanoi");
    assert_eq!(out.temperature, 22);
    assert_eq!(out.condition, "Rain");
    assert_eq!(out.humidity, Some(80.0));
    assert_eq!(out.wind_speed, Some(2.5));

    let seen = seen.lock().unwrap();
    let q = &seen[0];
    assert_eq!(q["q"], "Hanoi");
    assert_eq!(q["units"], "metric");
    assert_eq!(q["appid"], "test-key");
}

#[tokio::test]
async fn weather_without_conditions_is_unknown() {
    let (base, _) = canned(
        "/weather",
        StatusCode::OK,
        json!({"name": "London", "main": {"temp": 9.5}, "weather": [], "wind": {"speed": 4.0}}),
    )
    .await;

    let out = openweather(&base).fetch("London").await.unwrap().unwrap();
    assert_eq!(out.condition, "Unknown");
    assert_eq!(out.temperature, 10);
}

#[tokio::test]
async fn weather_null_body_is_absent() {
    let (base, _) = canned("/weather", StatusCode::OK, Value::Null).await;
    assert!(openweather(&base).fetch("Atlantis").await.unwrap().is_none());
}

#[tokio::test]
async fn weather_not_found_is_unavailable() {
    let (base, _) = canned(
        "/weather",
        StatusCode::NOT_FOUND,
        json!({"cod": "404", "message": "city not found"}),
    )
    .await;
    let err = openweather(&base).fetch("Atlantis").await.unwrap_err();
    assert!(matches!(err, SourceError::Status { adapter: "weather", status: 404 }));
}

// ---- news ----

#[tokio::test]
async fn news_with_zero_articles_is_absent() {
    let (base, _) = canned(
        "/everything",
        StatusCode::OK,
        json!({"status": "ok", "totalResults": 0, "articles": []}),
    )
    .await;
    assert!(newsapi(&base).fetch("zzzz").await.unwrap().is_none());
}

#[tokio::test]
async fn news_error_body_with_ok_status_is_malformed() {
    let (base, _) = canned(
        "/everything",
        StatusCode::OK,
        json!({"status": "error", "code": "apiKeyInvalid", "message": "Your API key is invalid."}),
    )
    .await;
    let err = newsapi(&base).fetch("technology").await.unwrap_err();
    assert!(matches!(err, SourceError::Malformed { adapter: "news", .. }), "{err:?}");
}

#[tokio::test]
async fn news_article_is_tagged_with_the_query() {
    let (base, seen) = canned(
        "/everything",
        StatusCode::OK,
        json!({
            "status": "ok",
            "totalResults": 1,
            "articles": [{
                "source": {"id": null, "name": "The Verge"},
                "title": "New GPU ships",
                "description": "Faster than before",
                "url": "https://news.example/gpu",
                "publishedAt": "2024-05-01T10:00:00Z"
            }]
        }),
    )
    .await;

    let out = newsapi(&base).fetch("technology").await.unwrap().unwrap();

    assert_eq!(out.title, "New GPU ships");
    assert_eq!(out.source, "The Verge");
    assert_eq!(out.description.as_deref(), Some("Faster than before"));
    assert_eq!(out.category.as_deref(), Some("technology"));
    assert_eq!(
        out.published_at,
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    );

    let seen = seen.lock().unwrap();
    let q = &seen[0];
    assert_eq!(q["q"], "technology");
    assert_eq!(q["pageSize"], "1");
    assert_eq!(q["sortBy"], "publishedAt");
    assert_eq!(q["apiKey"], "test-key");
}

#[tokio::test]
async fn news_with_bad_timestamp_is_malformed() {
    let (base, _) = canned(
        "/everything",
        StatusCode::OK,
        json!({"articles": [{
            "source": {"name": "X"}, "title": "t", "url": "https://x/1", "publishedAt": "last tuesday"
        }]}),
    )
    .await;
    let err = newsapi(&base).fetch("q").await.unwrap_err();
    assert!(matches!(err, SourceError::Malformed { adapter: "news", .. }), "{err:?}");
}
